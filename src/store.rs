use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use camino::Utf8Path;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, TransactionBehavior};

use crate::error::BiokbError;
use crate::row::{KeyValue, RowKey, TableRow, Value};
use crate::schema::{ColumnKind, TableSchema};

/// Busy timeout for lock contention between concurrent workers.
const BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Inserted,
    Merged,
}

/// Outcome of the per-key merge closure.
pub enum RowWrite {
    /// Insert or replace the stored row with this one.
    Put(TableRow),
    /// Leave the stored row untouched.
    Keep,
}

/// The contract the merge-upsert engine needs from a relational store:
/// point lookup by key tuple, a per-key lock scope in which read, merge and
/// write happen atomically, and table creation. Two concurrent calls for
/// the same key must serialize so the second sees the first's committed
/// write.
pub trait RelationalStore: Send + Sync {
    fn ensure_table(&self, table: &TableSchema) -> Result<(), BiokbError>;

    fn clear_table(&self, table: &TableSchema) -> Result<(), BiokbError>;

    /// Acquires a lock scope for `key`, reads the stored row, applies
    /// `merge`, writes the result and releases the scope, as one atomic
    /// transaction. Declared foreign-key violations surface as
    /// [`BiokbError::ReferentialIntegrity`].
    fn with_row(
        &self,
        table: &TableSchema,
        key: &RowKey,
        merge: &mut dyn FnMut(Option<&TableRow>) -> RowWrite,
    ) -> Result<RowAction, BiokbError>;
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    target: String,
}

impl SqliteStore {
    pub fn open(path: &Utf8Path) -> Result<Self, BiokbError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| BiokbError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path()).map_err(|err| {
            BiokbError::StoreConnection {
                target: path.to_string(),
                message: err.to_string(),
            }
        })?;
        Self::configure(conn, path.to_string())
    }

    pub fn open_in_memory() -> Result<Self, BiokbError> {
        let conn =
            Connection::open_in_memory().map_err(|err| BiokbError::StoreConnection {
                target: ":memory:".to_string(),
                message: err.to_string(),
            })?;
        Self::configure(conn, ":memory:".to_string())
    }

    fn configure(conn: Connection, target: String) -> Result<Self, BiokbError> {
        let setup = || -> Result<(), rusqlite::Error> {
            conn.execute_batch("PRAGMA journal_mode = wal;")?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
            Ok(())
        };
        setup().map_err(|err| BiokbError::StoreConnection {
            target: target.clone(),
            message: err.to_string(),
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
            target,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, BiokbError> {
        self.conn
            .lock()
            .map_err(|_| BiokbError::Store(format!("poisoned connection lock for {}", self.target)))
    }
}

impl RelationalStore for SqliteStore {
    fn ensure_table(&self, table: &TableSchema) -> Result<(), BiokbError> {
        let conn = self.lock()?;
        conn.execute(&create_table_sql(table), [])
            .map_err(|err| BiokbError::Store(err.to_string()))?;
        Ok(())
    }

    fn clear_table(&self, table: &TableSchema) -> Result<(), BiokbError> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {}", table.name), [])
            .map_err(|err| BiokbError::Store(err.to_string()))?;
        Ok(())
    }

    fn with_row(
        &self,
        table: &TableSchema,
        key: &RowKey,
        merge: &mut dyn FnMut(Option<&TableRow>) -> RowWrite,
    ) -> Result<RowAction, BiokbError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| BiokbError::Store(err.to_string()))?;

        let existing = select_row(&tx, table, key)?;
        let action = if existing.is_some() {
            RowAction::Merged
        } else {
            RowAction::Inserted
        };

        if let RowWrite::Put(row) = merge(existing.as_ref()) {
            // A plain INSERT or UPDATE, never REPLACE: replacing deletes the
            // old row first, which would trip foreign keys of child rows.
            match action {
                RowAction::Inserted => insert_row(&tx, table, &row)?,
                RowAction::Merged => update_row(&tx, table, key, &row)?,
            }
        }

        tx.commit()
            .map_err(|err| BiokbError::Store(err.to_string()))?;
        Ok(action)
    }
}

fn create_table_sql(table: &TableSchema) -> String {
    let mut parts: Vec<String> = table
        .columns()
        .map(|column| format!("{} {}", column.name, sql_type(column.kind)))
        .collect();
    if !table.allow_null_keys {
        parts.push(format!("PRIMARY KEY ({})", table.key_columns.join(", ")));
    }
    for fk in table.foreign_keys {
        parts.push(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            fk.column, fk.parent_table, fk.parent_column
        ));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.name,
        parts.join(", ")
    )
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Text | ColumnKind::TextArray => "TEXT",
        ColumnKind::Integer => "INTEGER",
        ColumnKind::Real => "REAL",
    }
}

fn select_row(
    conn: &Connection,
    table: &TableSchema,
    key: &RowKey,
) -> Result<Option<TableRow>, BiokbError> {
    let columns: Vec<&str> = table.columns().map(|column| column.name).collect();
    // `IS` instead of `=` so null key components compare equal.
    let clauses: Vec<String> = table
        .key_columns
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{name} IS ?{}", i + 1))
        .collect();
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        columns.join(", "),
        table.name,
        clauses.join(" AND ")
    );

    let params: Vec<SqlValue> = key.0.iter().map(key_to_sql).collect();
    let mut statement = conn
        .prepare(&sql)
        .map_err(|err| BiokbError::Store(err.to_string()))?;
    let mut rows = statement
        .query(rusqlite::params_from_iter(params))
        .map_err(|err| BiokbError::Store(err.to_string()))?;

    let Some(sql_row) = rows
        .next()
        .map_err(|err| BiokbError::Store(err.to_string()))?
    else {
        return Ok(None);
    };

    let mut row = TableRow::new();
    for (index, column) in table.columns().enumerate() {
        let raw: SqlValue = sql_row
            .get(index)
            .map_err(|err| BiokbError::Store(err.to_string()))?;
        row.insert(column.name.to_string(), decode_value(column.kind, raw)?);
    }
    Ok(Some(row))
}

fn insert_row(conn: &Connection, table: &TableSchema, row: &TableRow) -> Result<(), BiokbError> {
    let columns: Vec<&str> = table.columns().map(|column| column.name).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders.join(", ")
    );

    let params: Result<Vec<SqlValue>, BiokbError> = table
        .columns()
        .map(|column| encode_value(row.get(column.name).unwrap_or(&Value::Null)))
        .collect();

    conn.execute(&sql, rusqlite::params_from_iter(params?))
        .map_err(|err| write_error(table, err))?;
    Ok(())
}

fn update_row(
    conn: &Connection,
    table: &TableSchema,
    key: &RowKey,
    row: &TableRow,
) -> Result<(), BiokbError> {
    let payload: Vec<&str> = table
        .columns()
        .map(|column| column.name)
        .filter(|name| !table.is_key(name))
        .collect();
    if payload.is_empty() {
        return Ok(());
    }

    let assignments: Vec<String> = payload
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{name} = ?{}", i + 1))
        .collect();
    let clauses: Vec<String> = table
        .key_columns
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{name} IS ?{}", payload.len() + i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table.name,
        assignments.join(", "),
        clauses.join(" AND ")
    );

    let mut params = Vec::with_capacity(payload.len() + key.0.len());
    for name in &payload {
        params.push(encode_value(row.get(*name).unwrap_or(&Value::Null))?);
    }
    params.extend(key.0.iter().map(key_to_sql));

    conn.execute(&sql, rusqlite::params_from_iter(params))
        .map_err(|err| write_error(table, err))?;
    Ok(())
}

fn write_error(table: &TableSchema, err: rusqlite::Error) -> BiokbError {
    if is_fk_violation(&err) {
        BiokbError::ReferentialIntegrity {
            table: table.name.to_string(),
            message: err.to_string(),
        }
    } else {
        BiokbError::Store(err.to_string())
    }
}

fn is_fk_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

fn key_to_sql(key: &KeyValue) -> SqlValue {
    match key {
        KeyValue::Null => SqlValue::Null,
        KeyValue::Text(text) => SqlValue::Text(text.clone()),
        KeyValue::Integer(number) => SqlValue::Integer(*number),
    }
}

fn encode_value(value: &Value) -> Result<SqlValue, BiokbError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Text(text) => SqlValue::Text(text.clone()),
        Value::Integer(number) => SqlValue::Integer(*number),
        Value::Real(number) => SqlValue::Real(*number),
        Value::Array(items) => SqlValue::Text(
            serde_json::to_string(items).map_err(|err| BiokbError::Store(err.to_string()))?,
        ),
    })
}

fn decode_value(kind: ColumnKind, raw: SqlValue) -> Result<Value, BiokbError> {
    Ok(match (kind, raw) {
        (_, SqlValue::Null) => Value::Null,
        (ColumnKind::TextArray, SqlValue::Text(text)) => Value::Array(
            serde_json::from_str(&text).map_err(|err| BiokbError::Store(err.to_string()))?,
        ),
        (ColumnKind::Text, SqlValue::Text(text)) => Value::Text(text),
        (ColumnKind::Integer, SqlValue::Integer(number)) => Value::Integer(number),
        (ColumnKind::Real, SqlValue::Real(number)) => Value::Real(number),
        (ColumnKind::Real, SqlValue::Integer(number)) => Value::Real(number as f64),
        (kind, raw) => {
            return Err(BiokbError::Store(format!(
                "unexpected stored value {raw:?} for column kind {kind:?}"
            )));
        }
    })
}

/// In-memory store used by tests and dry runs. The single lock makes every
/// key-scope trivially serialized; declared foreign keys are checked
/// against the parent table's current rows.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, HashMap<RowKey, TableRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(&self, table: &TableSchema, key: &RowKey) -> Option<TableRow> {
        let tables = self.tables.lock().ok()?;
        tables.get(table.name)?.get(key).cloned()
    }

    pub fn row_count(&self, table: &TableSchema) -> usize {
        self.tables
            .lock()
            .map(|tables| tables.get(table.name).map(HashMap::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl RelationalStore for MemoryStore {
    fn ensure_table(&self, table: &TableSchema) -> Result<(), BiokbError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| BiokbError::Store("poisoned table lock".to_string()))?;
        tables.entry(table.name.to_string()).or_default();
        Ok(())
    }

    fn clear_table(&self, table: &TableSchema) -> Result<(), BiokbError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| BiokbError::Store("poisoned table lock".to_string()))?;
        tables.insert(table.name.to_string(), HashMap::new());
        Ok(())
    }

    fn with_row(
        &self,
        table: &TableSchema,
        key: &RowKey,
        merge: &mut dyn FnMut(Option<&TableRow>) -> RowWrite,
    ) -> Result<RowAction, BiokbError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| BiokbError::Store("poisoned table lock".to_string()))?;

        let existing = tables
            .get(table.name)
            .and_then(|rows| rows.get(key))
            .cloned();
        let action = if existing.is_some() {
            RowAction::Merged
        } else {
            RowAction::Inserted
        };

        if let RowWrite::Put(row) = merge(existing.as_ref()) {
            check_foreign_keys(&tables, table, &row)?;
            tables
                .entry(table.name.to_string())
                .or_default()
                .insert(key.clone(), row);
        }
        Ok(action)
    }
}

fn check_foreign_keys(
    tables: &HashMap<String, HashMap<RowKey, TableRow>>,
    table: &TableSchema,
    row: &TableRow,
) -> Result<(), BiokbError> {
    for fk in table.foreign_keys {
        let Some(value) = row.get(fk.column).filter(|value| !value.is_null()) else {
            continue;
        };
        let parent_has_value = tables
            .get(fk.parent_table)
            .map(|rows| {
                rows.values()
                    .any(|parent| parent.get(fk.parent_column) == Some(value))
            })
            .unwrap_or(false);
        if !parent_has_value {
            return Err(BiokbError::ReferentialIntegrity {
                table: table.name.to_string(),
                message: format!(
                    "{}={value:?} has no parent row in {}.{}",
                    fk.column, fk.parent_table, fk.parent_column
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TABLE_EXPERIMENTAL_CONDITION, TABLE_ID_MAPPER, TABLE_UNIPROT};

    fn key_of(values: &[Option<&str>]) -> RowKey {
        RowKey(
            values
                .iter()
                .map(|value| match value {
                    Some(text) => KeyValue::Text(text.to_string()),
                    None => KeyValue::Null,
                })
                .collect(),
        )
    }

    #[test]
    fn create_table_sql_shapes() {
        let sql = create_table_sql(&TABLE_UNIPROT);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS uniprot ("));
        assert!(sql.contains("PRIMARY KEY (uniprot_accession)"));

        // Null-keyed mapping table carries no primary key clause; the
        // engine's key lookup provides tuple uniqueness.
        let sql = create_table_sql(&TABLE_ID_MAPPER);
        assert!(!sql.contains("PRIMARY KEY"));
    }

    #[test]
    fn sqlite_round_trip_with_null_key_components() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_table(&TABLE_ID_MAPPER).unwrap();

        let key = key_of(&[Some("P69905"), None, Some("Smlt0001"), None, None]);
        let mut row = TableRow::new();
        row.insert("uniprot_accession".to_string(), Value::text("P69905"));
        row.insert("locus_tag".to_string(), Value::text("Smlt0001"));

        let action = store
            .with_row(&TABLE_ID_MAPPER, &key, &mut |existing| {
                assert!(existing.is_none());
                RowWrite::Put(row.clone())
            })
            .unwrap();
        assert_eq!(action, RowAction::Inserted);

        // Same tuple again: the null components must match via IS.
        let action = store
            .with_row(&TABLE_ID_MAPPER, &key, &mut |existing| {
                assert!(existing.is_some());
                RowWrite::Keep
            })
            .unwrap();
        assert_eq!(action, RowAction::Merged);
    }

    #[test]
    fn sqlite_array_columns_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_table(&TABLE_UNIPROT).unwrap();

        let key = key_of(&[Some("P69905")]);
        let mut row = TableRow::new();
        row.insert("uniprot_accession".to_string(), Value::text("P69905"));
        row.insert(
            "locus_tag".to_string(),
            Value::Array(vec!["Smlt0001".to_string(), "Smlt0002".to_string()]),
        );

        store
            .with_row(&TABLE_UNIPROT, &key, &mut |_| RowWrite::Put(row.clone()))
            .unwrap();

        let mut stored = None;
        store
            .with_row(&TABLE_UNIPROT, &key, &mut |existing| {
                stored = existing.cloned();
                RowWrite::Keep
            })
            .unwrap();
        let stored = stored.unwrap();
        assert_eq!(
            stored["locus_tag"],
            Value::Array(vec!["Smlt0001".to_string(), "Smlt0002".to_string()])
        );
        assert_eq!(stored["sequence"], Value::Null);
    }

    #[test]
    fn memory_store_checks_declared_references() {
        let store = MemoryStore::new();
        store.ensure_table(&TABLE_EXPERIMENTAL_CONDITION).unwrap();

        let table = crate::schema::TABLE_TRANSCRIPTOMICS_COUNTS;
        let key = RowKey(vec![
            KeyValue::Text("SMLT_RS00005".to_string()),
            KeyValue::Text("control".to_string()),
            KeyValue::Integer(1),
        ]);
        let mut row = TableRow::new();
        row.insert("refseq_locus_tag".to_string(), Value::text("SMLT_RS00005"));
        row.insert("condition_name".to_string(), Value::text("control"));
        row.insert("replicate".to_string(), Value::Integer(1));
        row.insert("read_count".to_string(), Value::Integer(42));

        let err = store
            .with_row(&table, &key, &mut |_| RowWrite::Put(row.clone()))
            .unwrap_err();
        assert!(matches!(err, BiokbError::ReferentialIntegrity { .. }));
    }
}
