use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use biokb_loader::app::{App, read_input};
use biokb_loader::config::ConfigLoader;
use biokb_loader::error::BiokbError;
use biokb_loader::matcher::reconcile_extracts;
use biokb_loader::output::JsonOutput;
use biokb_loader::schema;
use biokb_loader::store::SqliteStore;

#[derive(Parser)]
#[command(name = "biokb")]
#[command(about = "Loader for a relational bio knowledge base (UniProt, RefSeq, KEGG and friends)")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Merge-upsert a tab-separated file into a knowledge-base table")]
    Upsert(UpsertArgs),
    #[command(
        name = "match-ids",
        about = "Reconcile UniProt/RefSeq/KEGG identifier extracts into mapping rows"
    )]
    MatchIds(MatchIdsArgs),
    #[command(about = "List the known tables and their columns")]
    Tables,
}

#[derive(Args)]
struct UpsertArgs {
    /// Target table name from the schema registry.
    table: String,

    /// File containing the rows, or '-' for stdin (the default).
    file: Option<String>,

    /// Per-invocation values for the table's attached columns, applied to
    /// every row (e.g. condition name and replicate number).
    attached: Vec<String>,

    #[arg(long)]
    db: Option<String>,

    #[arg(long)]
    config: Option<String>,
}

#[derive(Args)]
struct MatchIdsArgs {
    /// UniProt-derived identifier extract.
    uniprot: String,

    /// RefSeq-derived identifier extract.
    refseq: String,

    /// KEGG-derived identifier extract.
    kegg: String,

    /// Load the mapping rows into the store instead of printing TSV.
    #[arg(long)]
    load: bool,

    #[arg(long)]
    db: Option<String>,

    #[arg(long)]
    config: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(biokb) = report.downcast_ref::<BiokbError>() {
            return ExitCode::from(map_exit_code(biokb));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BiokbError) -> u8 {
    match error {
        BiokbError::StoreConnection { .. } | BiokbError::Store(_) => 3,
        BiokbError::ConfigRead(_)
        | BiokbError::ConfigParse(_)
        | BiokbError::UnknownTable(_)
        | BiokbError::InputRead(_)
        | BiokbError::AttachedValues { .. }
        | BiokbError::AttachedValue { .. } => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upsert(args) => run_upsert(args),
        Commands::MatchIds(args) => run_match_ids(args),
        Commands::Tables => run_tables(),
    }
}

fn run_upsert(args: UpsertArgs) -> miette::Result<()> {
    let body = read_input(args.file.as_deref()).into_diagnostic()?;
    let db_path = ConfigLoader::resolve(args.db.as_deref(), args.config.as_deref())
        .into_diagnostic()?;
    let store = SqliteStore::open(&db_path).into_diagnostic()?;
    let app = App::new(store);

    let report = app
        .upsert(&args.table, &body, &args.attached)
        .into_diagnostic()?;
    JsonOutput::print_upsert(&report).into_diagnostic()?;
    Ok(())
}

fn run_match_ids(args: MatchIdsArgs) -> miette::Result<()> {
    let uniprot = read_input(Some(args.uniprot.as_str())).into_diagnostic()?;
    let refseq = read_input(Some(args.refseq.as_str())).into_diagnostic()?;
    let kegg = read_input(Some(args.kegg.as_str())).into_diagnostic()?;

    let result = reconcile_extracts(&uniprot, &refseq, &kegg);

    if args.load {
        let db_path = ConfigLoader::resolve(args.db.as_deref(), args.config.as_deref())
            .into_diagnostic()?;
        let store = SqliteStore::open(&db_path).into_diagnostic()?;
        let app = App::new(store);
        let report = app.load_id_map(&result.rows).into_diagnostic()?;
        JsonOutput::print_upsert(&report).into_diagnostic()?;
        return Ok(());
    }

    for row in &result.rows {
        println!("{row}");
    }
    Ok(())
}

fn run_tables() -> miette::Result<()> {
    for table in schema::TABLES {
        let columns: Vec<&str> = table.columns().map(|column| column.name).collect();
        println!("{}\t{}", table.name, columns.join(","));
    }
    Ok(())
}
