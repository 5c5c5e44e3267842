use serde::Serialize;
use tracing::{info, warn};

use crate::error::BiokbError;
use crate::row::{KeyValue, RowKey, TableRow, Value};
use crate::schema::TableSchema;
use crate::store::{RelationalStore, RowAction, RowWrite};

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpsertSummary {
    pub table: String,
    pub inserted: usize,
    pub merged: usize,
    pub skipped: usize,
}

/// Applies idempotent read-merge-write upserts against a relational store.
/// Every row is its own atomic transaction; row-scoped failures are
/// counted and skipped, never fatal to the batch. Cross-table ordering
/// (parents before referencing tables) is the caller's responsibility.
pub struct MergeEngine<'a, S: RelationalStore> {
    store: &'a S,
}

impl<'a, S: RelationalStore> MergeEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn upsert(
        &self,
        table: &TableSchema,
        rows: impl IntoIterator<Item = TableRow>,
    ) -> Result<UpsertSummary, BiokbError> {
        let mut summary = UpsertSummary {
            table: table.name.to_string(),
            ..UpsertSummary::default()
        };

        for row in rows {
            match self.upsert_row(table, row) {
                Ok(RowAction::Inserted) => summary.inserted += 1,
                Ok(RowAction::Merged) => summary.merged += 1,
                Err(err @ (BiokbError::MissingKey { .. }
                | BiokbError::ReferentialIntegrity { .. })) => {
                    warn!(table = table.name, error = %err, "skipping row");
                    summary.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            table = table.name,
            inserted = summary.inserted,
            merged = summary.merged,
            skipped = summary.skipped,
            "upsert finished"
        );
        Ok(summary)
    }

    fn upsert_row(&self, table: &TableSchema, row: TableRow) -> Result<RowAction, BiokbError> {
        let key = derive_key(table, &row)?;
        self.store.with_row(table, &key, &mut |existing| {
            match existing {
                None => RowWrite::Put(insert_shape(table, &row)),
                // Association tables have nothing to merge beyond the key.
                Some(_) if table.is_association() => RowWrite::Keep,
                Some(stored) => RowWrite::Put(merge_rows(table, stored, &row)),
            }
        })
    }
}

/// The key tuple in declared key-column order. Null or absent components
/// reject the row unless the table allows null keys.
pub fn derive_key(table: &TableSchema, row: &TableRow) -> Result<RowKey, BiokbError> {
    let mut key = Vec::with_capacity(table.key_columns.len());
    for column in table.key_columns {
        let value = row.get(*column).unwrap_or(&Value::Null);
        let component = KeyValue::from_value(value).filter(|component| {
            table.allow_null_keys || !matches!(component, KeyValue::Null)
        });
        match component {
            Some(component) => key.push(component),
            None => {
                return Err(BiokbError::MissingKey {
                    table: table.name.to_string(),
                    column: (*column).to_string(),
                });
            }
        }
    }
    Ok(RowKey(key))
}

/// First write for a key: supplied scalars as-is, missing scalars null,
/// missing array columns as empty sequences.
fn insert_shape(table: &TableSchema, incoming: &TableRow) -> TableRow {
    let mut row = TableRow::new();
    for column in table.columns() {
        let value = match incoming.get(column.name) {
            Some(Value::Array(items)) => Value::Array(dedup_preserving_order(items)),
            Some(value) => value.clone(),
            None if table.is_array(column.name) => Value::Array(Vec::new()),
            None => Value::Null,
        };
        row.insert(column.name.to_string(), value);
    }
    row
}

/// Merge for an existing key: scalars present in the incoming row win,
/// arrays grow by set union (stored order first, then unseen incoming
/// elements), absent columns stay untouched.
fn merge_rows(table: &TableSchema, stored: &TableRow, incoming: &TableRow) -> TableRow {
    let mut merged = stored.clone();
    for (name, value) in incoming {
        if table.is_key(name) {
            continue;
        }
        if table.is_array(name) {
            let incoming_items = match value {
                Value::Array(items) => items.as_slice(),
                _ => continue,
            };
            let mut items = match merged.get(name) {
                Some(Value::Array(existing)) => existing.clone(),
                _ => Vec::new(),
            };
            for item in incoming_items {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
            merged.insert(name.clone(), Value::Array(items));
        } else {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

fn dedup_preserving_order(items: &[String]) -> Vec<String> {
    let mut deduped = Vec::with_capacity(items.len());
    for item in items {
        if !deduped.contains(item) {
            deduped.push(item.clone());
        }
    }
    deduped
}
