//! Query tool.
//!
//! This module implements `query_tool`: run a statement and return every row
//! it produces, with columns in cursor order.

use crate::error::DbResult;
use crate::models::QueryRequest;
use crate::tools::arguments::{Arguments, ScalarArgument};
use schemars::JsonSchema;
use serde::Deserialize;

pub const DESCRIPTION: &str = "Run a SQL query against a database and return all rows as \
     {columns, rows, rowCount}. NULL stays null and binary values are returned as UTF-8 text.";

/// Input for the query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// Name of the target database. May be omitted when the server manages a single database.
    #[serde(default)]
    pub database: Option<String>,
    /// SQL query to run
    pub statement: String,
    /// Positional values for the query's placeholders (string, number, boolean or null)
    pub arguments: Vec<ScalarArgument>,
    /// Deadline in seconds (1-300). Defaults to the server's query timeout.
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

pub fn parse(args: &Arguments<'_>) -> DbResult<QueryRequest> {
    Ok(QueryRequest {
        database: args.database()?,
        statement: args.required_str("statement")?,
        arguments: args.scalar_arguments()?,
        timeout_secs: args.timeout_secs()?,
    })
}
