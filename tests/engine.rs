use biokb_loader::engine::{MergeEngine, derive_key};
use biokb_loader::row::{TableRow, Value};
use biokb_loader::schema::{TABLE_UNIPROT, TABLE_UNIPROT_KEYWORD};
use biokb_loader::store::{RelationalStore, SqliteStore};

fn uniprot_row(accession: &str, locus_tags: &[&str]) -> TableRow {
    let mut row = TableRow::new();
    row.insert("uniprot_accession".to_string(), Value::text(accession));
    if !locus_tags.is_empty() {
        row.insert(
            "locus_tag".to_string(),
            Value::Array(locus_tags.iter().map(|tag| tag.to_string()).collect()),
        );
    }
    row
}

fn stored_row(store: &SqliteStore, row: &TableRow) -> TableRow {
    let key = derive_key(&TABLE_UNIPROT, row).unwrap();
    let mut stored = None;
    store
        .with_row(&TABLE_UNIPROT, &key, &mut |existing| {
            stored = existing.cloned();
            biokb_loader::store::RowWrite::Keep
        })
        .unwrap();
    stored.unwrap()
}

#[test]
fn sqlite_upsert_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("kb.sqlite")).unwrap();
    let store = SqliteStore::open(&path).unwrap();
    store.ensure_table(&TABLE_UNIPROT).unwrap();
    let engine = MergeEngine::new(&store);

    let rows = vec![uniprot_row("P69905", &["Smlt0001", "Smlt0002"])];

    let first = engine.upsert(&TABLE_UNIPROT, rows.clone()).unwrap();
    assert_eq!(first.inserted, 1);
    let after_first = stored_row(&store, &rows[0]);

    let second = engine.upsert(&TABLE_UNIPROT, rows.clone()).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.merged, 1);
    assert_eq!(stored_row(&store, &rows[0]), after_first);
}

#[test]
fn sqlite_arrays_union_like_the_worked_example() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.ensure_table(&TABLE_UNIPROT).unwrap();
    let engine = MergeEngine::new(&store);

    engine
        .upsert(&TABLE_UNIPROT, vec![uniprot_row("P69905", &["x", "y"])])
        .unwrap();
    engine
        .upsert(&TABLE_UNIPROT, vec![uniprot_row("P69905", &["y", "z"])])
        .unwrap();

    let stored = stored_row(&store, &uniprot_row("P69905", &[]));
    assert_eq!(
        stored["locus_tag"],
        Value::Array(vec!["x".to_string(), "y".to_string(), "z".to_string()])
    );
}

#[test]
fn sqlite_foreign_key_violation_skips_the_row() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.ensure_table(&TABLE_UNIPROT).unwrap();
    store.ensure_table(&TABLE_UNIPROT_KEYWORD).unwrap();
    let engine = MergeEngine::new(&store);

    engine
        .upsert(&TABLE_UNIPROT, vec![uniprot_row("P69905", &[])])
        .unwrap();

    let mut orphan = TableRow::new();
    orphan.insert("uniprot_accession".to_string(), Value::text("Q00001"));
    orphan.insert("keyword".to_string(), Value::text("Orphan"));
    let mut link = TableRow::new();
    link.insert("uniprot_accession".to_string(), Value::text("P69905"));
    link.insert("keyword".to_string(), Value::text("Oxygen transport"));

    let summary = engine
        .upsert(&TABLE_UNIPROT_KEYWORD, vec![orphan, link])
        .unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.inserted, 1);
}

#[test]
fn sqlite_association_reupsert_is_a_noop() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.ensure_table(&TABLE_UNIPROT).unwrap();
    store.ensure_table(&TABLE_UNIPROT_KEYWORD).unwrap();
    let engine = MergeEngine::new(&store);

    engine
        .upsert(&TABLE_UNIPROT, vec![uniprot_row("P69905", &[])])
        .unwrap();

    let mut link = TableRow::new();
    link.insert("uniprot_accession".to_string(), Value::text("P69905"));
    link.insert("keyword".to_string(), Value::text("Oxygen transport"));

    let first = engine
        .upsert(&TABLE_UNIPROT_KEYWORD, vec![link.clone()])
        .unwrap();
    assert_eq!(first.inserted, 1);
    let second = engine.upsert(&TABLE_UNIPROT_KEYWORD, vec![link]).unwrap();
    assert_eq!(second.merged, 1);
    assert_eq!(second.inserted, 0);
}
