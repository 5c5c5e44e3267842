use std::fs;
use std::io::Read;

use serde::Serialize;

use crate::domain::{MappingRow, Namespace};
use crate::engine::MergeEngine;
use crate::error::BiokbError;
use crate::row::{TableRow, Value, parse_attached, parse_tsv};
use crate::schema::{self, TABLE_ID_MAPPER, TableSchema};
use crate::store::RelationalStore;

#[derive(Debug, Clone, Serialize)]
pub struct UpsertReport {
    pub table: String,
    pub inserted: usize,
    pub merged: usize,
    pub skipped: usize,
    pub finished_at: String,
}

/// Reads a row source: a file path, or standard input for `-`/nothing.
pub fn read_input(file: Option<&str>) -> Result<String, BiokbError> {
    match file {
        Some("-") | None => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .map_err(|err| BiokbError::InputRead(format!("stdin: {err}")))?;
            Ok(body)
        }
        Some(path) => {
            fs::read_to_string(path).map_err(|err| BiokbError::InputRead(format!("{path}: {err}")))
        }
    }
}

pub struct App<S: RelationalStore> {
    store: S,
}

impl<S: RelationalStore> App<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Parses a tab-separated body and merge-upserts it into `table_name`.
    /// `attached` supplies the table's per-invocation column values, one per
    /// declared attached column, applied identically to every parsed row.
    pub fn upsert(
        &self,
        table_name: &str,
        body: &str,
        attached: &[String],
    ) -> Result<UpsertReport, BiokbError> {
        let table = schema::lookup(table_name)?;
        let attached_values = parse_attached_values(table, attached)?;

        self.ensure_with_parents(table)?;

        let parsed = parse_tsv(table, body);
        let rows = parsed.rows.into_iter().map(|mut row| {
            for (name, value) in &attached_values {
                row.insert(name.clone(), value.clone());
            }
            row
        });

        let engine = MergeEngine::new(&self.store);
        let summary = engine.upsert(table, rows)?;
        Ok(UpsertReport {
            table: summary.table,
            inserted: summary.inserted,
            merged: summary.merged,
            skipped: summary.skipped + parsed.skipped_lines,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Replaces the identifier mapping table with the given rows. The
    /// mapping table is regenerated from current inputs on every matcher
    /// run rather than appended to.
    pub fn load_id_map(&self, rows: &[MappingRow]) -> Result<UpsertReport, BiokbError> {
        self.store.ensure_table(&TABLE_ID_MAPPER)?;
        self.store.clear_table(&TABLE_ID_MAPPER)?;

        let engine = MergeEngine::new(&self.store);
        let summary = engine.upsert(
            &TABLE_ID_MAPPER,
            rows.iter().map(mapping_row_to_table_row),
        )?;
        Ok(UpsertReport {
            table: summary.table,
            inserted: summary.inserted,
            merged: summary.merged,
            skipped: summary.skipped,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn ensure_with_parents(&self, table: &TableSchema) -> Result<(), BiokbError> {
        for fk in table.foreign_keys {
            self.store.ensure_table(schema::lookup(fk.parent_table)?)?;
        }
        self.store.ensure_table(table)
    }
}

fn mapping_row_to_table_row(row: &MappingRow) -> TableRow {
    let mut table_row = TableRow::new();
    for namespace in Namespace::ALL {
        let value = match row.get(namespace) {
            Some(text) => Value::text(text),
            None => Value::Null,
        };
        table_row.insert(namespace.as_str().to_string(), value);
    }
    table_row
}

fn parse_attached_values(
    table: &TableSchema,
    attached: &[String],
) -> Result<Vec<(String, Value)>, BiokbError> {
    if attached.len() != table.attached_columns.len() {
        return Err(BiokbError::AttachedValues {
            table: table.name.to_string(),
            expected: table.attached_columns.len(),
            found: attached.len(),
        });
    }

    table
        .attached_columns
        .iter()
        .zip(attached)
        .map(|(column, raw)| {
            parse_attached(column, raw)
                .map(|value| (column.name.to_string(), value))
                .ok_or_else(|| BiokbError::AttachedValue {
                    table: table.name.to_string(),
                    column: column.name.to_string(),
                    value: raw.clone(),
                })
        })
        .collect()
}
