//! MCP tool implementations.
//!
//! This module contains the four database tools and the dispatcher that
//! routes a call to them:
//! - `execute`: run a statement for its affected-row count
//! - `query`: run a statement and return its rows
//! - `schema`: describe a table's columns
//! - `transaction`: run a batch of statements atomically
//! - `arguments`: field-level validation of the raw argument object

pub mod arguments;
pub mod execute;
pub mod query;
pub mod schema;
pub mod transaction;

pub use arguments::Arguments;
pub use execute::ExecuteInput;
pub use query::QueryInput;
pub use schema::SchemaInput;
pub use transaction::TransactionInput;

use crate::db::{CommandExecutor, ConnectionRegistry, DbPool};
use crate::error::{DbError, DbResult};
use crate::models::{Command, ExecuteResult, QueryResult, StatementOutcome};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Success payload of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Execute(ExecuteResult),
    Query(QueryResult),
    Schema(QueryResult),
    Transaction(Vec<StatementOutcome>),
}

/// Routes tool calls: extract arguments, resolve the database, execute.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ConnectionRegistry>,
    executor: CommandExecutor,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, executor: CommandExecutor) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Run one tool call. Arguments are fully validated before any
    /// connection is touched.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: Option<&Map<String, JsonValue>>,
        cancel: &CancellationToken,
    ) -> DbResult<ToolOutput> {
        let command =
            Command::from_tool_name(tool_name).ok_or_else(|| DbError::unknown_tool(tool_name))?;
        let empty = Map::new();
        let args = Arguments::new(
            command,
            arguments.unwrap_or(&empty),
            self.registry.default_database(),
        );

        debug!(tool = %command, "Dispatching tool call");
        let result = self.run(command, &args, cancel).await;
        if let Err(e) = &result {
            warn!(tool = %command, error = %e, "Tool call failed");
        }
        result
    }

    async fn run(
        &self,
        command: Command,
        args: &Arguments<'_>,
        cancel: &CancellationToken,
    ) -> DbResult<ToolOutput> {
        match command {
            Command::Execute => {
                let request = execute::parse(args)?;
                let pool = self.resolve(command, &request.database)?;
                let result = self.executor.execute(pool, &request, cancel).await?;
                Ok(ToolOutput::Execute(result))
            }
            Command::Query => {
                let request = query::parse(args)?;
                let pool = self.resolve(command, &request.database)?;
                let result = self.executor.query(pool, &request, cancel).await?;
                Ok(ToolOutput::Query(result))
            }
            Command::Schema => {
                let request = schema::parse(args)?;
                let pool = self.resolve(command, &request.database)?;
                let result = self.executor.describe_table(pool, &request, cancel).await?;
                Ok(ToolOutput::Schema(result))
            }
            Command::Transaction => {
                let request = transaction::parse(args)?;
                let pool = self.resolve(command, &request.database)?;
                let outcomes = self.executor.transaction(pool, &request, cancel).await?;
                Ok(ToolOutput::Transaction(outcomes))
            }
        }
    }

    fn resolve(&self, command: Command, database: &str) -> DbResult<&DbPool> {
        self.registry
            .resolve(database)
            .ok_or_else(|| DbError::database_not_found(command, database, self.registry.names()))
    }
}
