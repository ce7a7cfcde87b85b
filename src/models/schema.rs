//! Schema introspection data models.

use crate::models::query::{QueryResult, ResultValue, Row};
use serde::{Deserialize, Serialize};

/// Column names of a schema introspection result, in output order.
pub const SCHEMA_COLUMNS: [&str; 4] = ["name", "type", "nullable", "default"];

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRequest {
    pub database: String,
    pub table_name: String,
    /// Restrict the lookup to one schema (PostgreSQL/MySQL) or attached
    /// database (SQLite).
    pub schema: Option<String>,
    pub timeout_secs: Option<u32>,
}

/// One column of an introspected table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type in the engine's own vocabulary.
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    /// Default expression text; `None` when the column has no default.
    pub default: Option<String>,
}

impl ColumnDescriptor {
    fn into_row(self) -> Row {
        let default = match self.default {
            Some(text) => ResultValue::Text(text),
            None => ResultValue::Null,
        };
        let values = [
            ResultValue::Text(self.name),
            ResultValue::Text(self.data_type),
            ResultValue::Bool(self.nullable),
            default,
        ];
        SCHEMA_COLUMNS
            .iter()
            .zip(values)
            .map(|(column, value)| (column.to_string(), value.into()))
            .collect()
    }
}

/// Shape column descriptors like any other query result.
pub fn describe_result(columns: Vec<ColumnDescriptor>) -> QueryResult {
    let rows = columns.into_iter().map(ColumnDescriptor::into_row).collect();
    QueryResult::new(SCHEMA_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
}
