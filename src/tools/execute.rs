//! Statement execution tool.
//!
//! This module implements `execute_tool`: one statement (or a
//! semicolon-separated batch without arguments) run for its affected-row
//! count.

use crate::error::DbResult;
use crate::models::ExecuteRequest;
use crate::tools::arguments::{Arguments, ScalarArgument};
use schemars::JsonSchema;
use serde::Deserialize;

pub const DESCRIPTION: &str = "Execute a SQL statement (INSERT, UPDATE, DELETE, DDL) against a \
     database and return the number of affected rows. Values are bound positionally to the \
     statement's placeholders ($1, ? or ?1 depending on the database).";

/// Input for the execute tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteInput {
    /// Name of the target database. May be omitted when the server manages a single database.
    #[serde(default)]
    pub database: Option<String>,
    /// SQL statement to execute. Several statements separated by ';' are allowed when arguments is empty.
    pub statement: String,
    /// Positional values for the statement's placeholders (string, number, boolean or null)
    pub arguments: Vec<ScalarArgument>,
    /// Deadline in seconds (1-300). Defaults to the server's query timeout.
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

pub fn parse(args: &Arguments<'_>) -> DbResult<ExecuteRequest> {
    Ok(ExecuteRequest {
        database: args.database()?,
        statement: args.required_str("statement")?,
        arguments: args.scalar_arguments()?,
        timeout_secs: args.timeout_secs()?,
    })
}
