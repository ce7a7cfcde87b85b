//! Transaction tool.
//!
//! This module implements `transaction_tool`: a batch of statements that
//! commit together or not at all. The transaction lives only for the one
//! call; nothing is held open between calls.

use crate::error::DbResult;
use crate::models::TransactionRequest;
use crate::tools::arguments::{Arguments, ScalarArgument};
use schemars::JsonSchema;
use serde::Deserialize;

pub const DESCRIPTION: &str = "Run several SQL statements in one transaction. Statements run in \
     order; the first failure rolls everything back. Returns one {statementIndex, rowsAffected} \
     entry per statement after commit. arguments must hold one list per statement.";

/// Input for the transaction tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TransactionInput {
    /// Name of the target database. May be omitted when the server manages a single database.
    #[serde(default)]
    pub database: Option<String>,
    /// Statements to run, in order
    pub statements: Vec<String>,
    /// One list of positional values per statement; use [] for a statement without placeholders
    pub arguments: Vec<Vec<ScalarArgument>>,
    /// Deadline in seconds (1-300) for the whole batch. Defaults to the server's query timeout.
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

pub fn parse(args: &Arguments<'_>) -> DbResult<TransactionRequest> {
    let database = args.database()?;
    let statements = args.statements()?;
    let arguments = args.nested_arguments(statements.len())?;
    Ok(TransactionRequest {
        database,
        statements,
        arguments,
        timeout_secs: args.timeout_secs()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::models::{Command, QueryParam};
    use serde_json::json;

    #[test]
    fn test_parse_transaction() {
        let fields = json!({
            "database": "main",
            "statements": ["INSERT INTO t VALUES (?)", "DELETE FROM t"],
            "arguments": [[1], []],
        });
        let fields = fields.as_object().unwrap();
        let request = parse(&Arguments::new(Command::Transaction, fields, None)).unwrap();
        assert_eq!(request.statements.len(), 2);
        assert_eq!(request.arguments, vec![vec![QueryParam::Int(1)], vec![]]);
    }

    #[test]
    fn test_parse_transaction_length_mismatch() {
        let fields = json!({
            "database": "main",
            "statements": ["INSERT INTO t VALUES (1)", "INSERT INTO t VALUES (2)"],
            "arguments": [[]],
        });
        let fields = fields.as_object().unwrap();
        let err = parse(&Arguments::new(Command::Transaction, fields, None)).unwrap_err();
        assert!(matches!(
            err,
            DbError::MalformedRequest { command: Command::Transaction, ref field, .. }
                if field == "arguments"
        ));
    }
}
