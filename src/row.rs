use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::error::BiokbError;
use crate::schema::{Column, ColumnKind, TableSchema};

pub const NULL_TOKEN: &str = "NULL";
pub const LIST_SEPARATOR: char = ';';

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Array(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn text(value: impl Into<String>) -> Value {
        Value::Text(value.into())
    }
}

/// One incoming or stored row: column name to value. Columns a caller did
/// not supply are simply absent from the map.
pub type TableRow = BTreeMap<String, Value>;

/// A key tuple value. Key columns are scalar; a null component is only
/// legal for tables that declare `allow_null_keys`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Null,
    Text(String),
    Integer(i64),
}

impl KeyValue {
    pub fn from_value(value: &Value) -> Option<KeyValue> {
        match value {
            Value::Null => Some(KeyValue::Null),
            Value::Text(text) => Some(KeyValue::Text(text.clone())),
            Value::Integer(number) => Some(KeyValue::Integer(*number)),
            Value::Real(_) | Value::Array(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            KeyValue::Null => Value::Null,
            KeyValue::Text(text) => Value::Text(text.clone()),
            KeyValue::Integer(number) => Value::Integer(*number),
        }
    }
}

/// The key tuple of one row, in the schema's declared key-column order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey(pub Vec<KeyValue>);

#[derive(Debug, Default)]
pub struct ParsedRows {
    pub rows: Vec<TableRow>,
    /// Lines dropped because they did not match the declared layout.
    pub skipped_lines: usize,
}

/// Parses a tab-separated body against the table's declared input layout.
/// Malformed lines and unparseable scalar values are recovered locally:
/// the line is skipped (or the value nulled) with a warning, never fatal.
pub fn parse_tsv(table: &TableSchema, body: &str) -> ParsedRows {
    let mut parsed = ParsedRows::default();

    for (index, line) in body.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != table.input_columns.len() {
            let err = BiokbError::Parse {
                line: index + 1,
                message: format!(
                    "expected {} columns for table {}, found {}",
                    table.input_columns.len(),
                    table.name,
                    fields.len()
                ),
            };
            warn!(error = %err, "skipping line");
            parsed.skipped_lines += 1;
            continue;
        }

        let mut row = TableRow::new();
        for (column, field) in table.input_columns.iter().zip(fields) {
            row.insert(column.name.to_string(), parse_field(table, column, field));
        }
        parsed.rows.push(row);
    }

    parsed
}

fn parse_field(table: &TableSchema, column: &Column, field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed == NULL_TOKEN {
        return Value::Null;
    }

    match column.kind {
        ColumnKind::Text => Value::Text(trimmed.to_string()),
        ColumnKind::Integer => match trimmed.parse::<i64>() {
            Ok(number) => Value::Integer(number),
            Err(_) => {
                warn!(
                    table = table.name,
                    column = column.name,
                    value = trimmed,
                    "failed to parse integer, storing null"
                );
                Value::Null
            }
        },
        ColumnKind::Real => match parse_real(trimmed) {
            Some(number) => Value::Real(number),
            None => {
                warn!(
                    table = table.name,
                    column = column.name,
                    value = trimmed,
                    "failed to parse real, storing null"
                );
                Value::Null
            }
        },
        ColumnKind::TextArray => {
            let items: Vec<String> = trimmed
                .split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|item| !item.is_empty() && *item != NULL_TOKEN)
                .map(str::to_string)
                .collect();
            if items.is_empty() {
                Value::Null
            } else {
                Value::Array(items)
            }
        }
    }
}

fn parse_real(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .or_else(|_| value.replace(',', ".").parse::<f64>())
        .ok()
}

/// Parses one per-invocation attached value with the declared column kind.
/// Attached values come from command arguments, so a parse failure is a
/// caller error rather than a skippable line.
pub fn parse_attached(column: &Column, value: &str) -> Option<Value> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == NULL_TOKEN {
        return Some(Value::Null);
    }
    match column.kind {
        ColumnKind::Text => Some(Value::Text(trimmed.to_string())),
        ColumnKind::Integer => trimmed.parse::<i64>().ok().map(Value::Integer),
        ColumnKind::Real => parse_real(trimmed).map(Value::Real),
        ColumnKind::TextArray => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{TABLE_REFSEQ, TABLE_STRING_INTERACTIONS, TABLE_TRANSCRIPTOMICS_COUNTS};

    #[test]
    fn parse_nulls_and_lists() {
        let body = "SMLT_RS00005\tSmlt0001;Smlt0002\tWP_01.1\t+\t10\t250\tMKL\n";
        let parsed = parse_tsv(&TABLE_REFSEQ, body);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.skipped_lines, 0);

        let row = &parsed.rows[0];
        assert_eq!(row["refseq_locus_tag"], Value::text("SMLT_RS00005"));
        assert_eq!(
            row["locus_tag"],
            Value::Array(vec!["Smlt0001".to_string(), "Smlt0002".to_string()])
        );
        assert_eq!(row["start_position"], Value::Integer(10));
    }

    #[test]
    fn null_tokens_and_empty_lists_become_null() {
        let body = "SMLT_RS00005\tNULL\tNULL;NULL\t\tNULL\t20\tM\n";
        let parsed = parse_tsv(&TABLE_REFSEQ, body);
        let row = &parsed.rows[0];
        assert_eq!(row["locus_tag"], Value::Null);
        assert_eq!(row["refseq_protein_id"], Value::Null);
        assert_eq!(row["strand_location"], Value::Null);
        assert_eq!(row["start_position"], Value::Null);
        assert_eq!(row["end_position"], Value::Integer(20));
    }

    #[test]
    fn bad_column_count_skips_the_line() {
        let body = "only\ttwo\nSMLT_RS00005\tNULL\tNULL\t+\t1\t2\tM\n";
        let parsed = parse_tsv(&TABLE_REFSEQ, body);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.skipped_lines, 1);
    }

    #[test]
    fn unparseable_number_becomes_null() {
        let body = "SMLT_RS00005\tNULL\tNULL\t+\tabc\t2\tM\n";
        let parsed = parse_tsv(&TABLE_REFSEQ, body);
        assert_eq!(parsed.rows[0]["start_position"], Value::Null);
    }

    #[test]
    fn comma_decimal_fallback() {
        let body = "pA\tpB\t0,5\t0\t0\t0\t0\t0\t0\t0\t0\t0\t0\t0\t0\t950.0\n";
        let parsed = parse_tsv(&TABLE_STRING_INTERACTIONS, body);
        assert_eq!(parsed.rows[0]["neighborhood"], Value::Real(0.5));
        assert_eq!(parsed.rows[0]["combined_score"], Value::Real(950.0));
    }

    #[test]
    fn attached_value_parsing() {
        let replicate = TABLE_TRANSCRIPTOMICS_COUNTS
            .column("replicate")
            .unwrap();
        assert_eq!(parse_attached(replicate, "2"), Some(Value::Integer(2)));
        assert_eq!(parse_attached(replicate, "two"), None);
    }

    #[test]
    fn key_value_round_trip() {
        let key = KeyValue::from_value(&Value::text("Smlt0001")).unwrap();
        assert_eq!(key.to_value(), Value::text("Smlt0001"));
        assert!(KeyValue::from_value(&Value::Array(vec![])).is_none());
    }
}
