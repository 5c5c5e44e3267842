use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum BiokbError {
    #[error("invalid UniProt accession: {0}")]
    InvalidUniprotAccession(String),

    #[error("invalid KEGG accession: {0}")]
    InvalidKeggAccession(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("malformed input line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("row is missing key column {column} for table {table}")]
    MissingKey { table: String, column: String },

    #[error("referential integrity violation in table {table}: {message}")]
    ReferentialIntegrity { table: String, message: String },

    #[error("ambiguous identifier match for {namespace}: {message}")]
    AmbiguousMatch { namespace: String, message: String },

    #[error("failed to connect to store at {target}: {message}")]
    StoreConnection { target: String, message: String },

    #[error("store operation failed: {0}")]
    Store(String),

    #[error("table {table} expects {expected} attached value(s), found {found}")]
    AttachedValues {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid attached value for {column} in table {table}: {value}")]
    AttachedValue {
        table: String,
        column: String,
        value: String,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read input {0}")]
    InputRead(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
