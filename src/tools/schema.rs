//! Schema introspection tool.
//!
//! This module implements `schema_tool`: describe a table's columns.

use crate::error::DbResult;
use crate::models::SchemaRequest;
use crate::tools::arguments::Arguments;
use schemars::JsonSchema;
use serde::Deserialize;

pub const DESCRIPTION: &str = "Describe the columns of a table, in declaration order, as rows of \
     {name, type, nullable, default}. A table that does not exist returns zero rows.";

/// Input for the schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SchemaInput {
    /// Name of the target database. May be omitted when the server manages a single database.
    #[serde(default)]
    pub database: Option<String>,
    /// Table to describe
    pub table_name: String,
    /// Schema to look in (PostgreSQL/MySQL schema, SQLite attached database). Defaults to every schema on PostgreSQL and the current database on MySQL/SQLite.
    #[serde(default)]
    pub schema: Option<String>,
    /// Deadline in seconds (1-300). Defaults to the server's query timeout.
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

pub fn parse(args: &Arguments<'_>) -> DbResult<SchemaRequest> {
    Ok(SchemaRequest {
        database: args.database()?,
        table_name: args.required_str("table_name")?,
        schema: args.optional_str("schema")?,
        timeout_secs: args.timeout_secs()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Command;
    use serde_json::json;

    #[test]
    fn test_parse_schema() {
        let fields = json!({"database": "main", "table_name": "users", "schema": "public"});
        let fields = fields.as_object().unwrap();
        let request = parse(&Arguments::new(Command::Schema, fields, None)).unwrap();
        assert_eq!(request.table_name, "users");
        assert_eq!(request.schema.as_deref(), Some("public"));
    }

    #[test]
    fn test_parse_schema_requires_table_name() {
        let fields = json!({"database": "main"});
        let fields = fields.as_object().unwrap();
        let err = parse(&Arguments::new(Command::Schema, fields, None)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema_tool: invalid argument 'table_name': is required"
        );
    }
}
