//! Error types for the SQL MCP server.
//!
//! Every error that reaches a caller names the command, the target database
//! and the underlying failure, so a client can diagnose it without access to
//! server-side logs.

use crate::models::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// A named database could not be configured, reached or pinged at startup.
    #[error("Configuration error for database '{database}': {message}")]
    Configuration {
        database: String,
        message: String,
        suggestion: String,
    },

    /// The argument bag of a tool call does not have the expected shape.
    #[error("{command}: invalid argument '{field}': {message}")]
    MalformedRequest {
        command: Command,
        field: String,
        message: String,
    },

    #[error("{command}: database '{database}' not found")]
    DatabaseNotFound {
        command: Command,
        database: String,
        available: Vec<String>,
    },

    /// Any failure reported by the database while running a command,
    /// including begin, commit, rollback, cancellation and deadline expiry.
    #[error(
        "{command} on database '{database}' failed: {message}{}",
        rollback_note(.rollback_error)
    )]
    Execution {
        command: Command,
        database: String,
        message: String,
        /// e.g., "23505" for a unique violation
        sql_state: Option<String>,
        suggestion: Option<String>,
        /// Set when the rollback that followed `message` also failed.
        rollback_error: Option<String>,
    },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn rollback_note(rollback_error: &Option<String>) -> String {
    match rollback_error {
        Some(e) => format!(" (rollback also failed: {})", e),
        None => String::new(),
    }
}

impl DbError {
    /// Create a configuration error with a helpful suggestion.
    pub fn configuration(
        database: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            database: database.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a malformed request error for one argument field.
    pub fn malformed(command: Command, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedRequest {
            command,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn database_not_found(
        command: Command,
        database: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Self::DatabaseNotFound {
            command,
            database: database.into(),
            available,
        }
    }

    /// Create an execution error from a plain message (cancellation, deadline).
    pub fn execution(command: Command, database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            command,
            database: database.into(),
            message: message.into(),
            sql_state: None,
            suggestion: None,
            rollback_error: None,
        }
    }

    /// Create an execution error from a driver error, prefixing its message
    /// with `context` when one is given.
    pub fn from_driver(
        command: Command,
        database: impl Into<String>,
        context: Option<&str>,
        err: &sqlx::Error,
    ) -> Self {
        let failure = DriverFailure::from(err);
        let message = match context {
            Some(context) => format!("{}: {}", context, failure.message),
            None => failure.message,
        };
        Self::Execution {
            command,
            database: database.into(),
            message,
            sql_state: failure.sql_state,
            suggestion: Some(failure.suggestion.to_string()),
            rollback_error: None,
        }
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Attach a failed rollback to an execution error without replacing its
    /// primary message. Other variants are returned unchanged.
    pub fn with_rollback_error(self, rollback: impl Into<String>) -> Self {
        match self {
            Self::Execution {
                command,
                database,
                message,
                sql_state,
                suggestion,
                ..
            } => Self::Execution {
                command,
                database,
                message,
                sql_state,
                suggestion,
                rollback_error: Some(rollback.into()),
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration { suggestion, .. } => Some(suggestion),
            Self::Execution { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }

    /// The command this error belongs to, when it came from a tool call.
    pub fn command(&self) -> Option<Command> {
        match self {
            Self::MalformedRequest { command, .. }
            | Self::DatabaseNotFound { command, .. }
            | Self::Execution { command, .. } => Some(*command),
            _ => None,
        }
    }
}

/// Message, SQLSTATE and remediation hint extracted from a driver error.
#[derive(Debug, Clone)]
pub struct DriverFailure {
    pub message: String,
    pub sql_state: Option<String>,
    pub suggestion: &'static str,
}

impl From<&sqlx::Error> for DriverFailure {
    fn from(err: &sqlx::Error) -> Self {
        let (message, sql_state, suggestion) = match err {
            sqlx::Error::Database(db_err) => (
                db_err.message().to_string(),
                db_err.code().map(|c| c.to_string()),
                "Check the SQL syntax, the referenced objects and the bound arguments",
            ),
            sqlx::Error::Configuration(msg) => (
                msg.to_string(),
                None,
                "Check the connection settings and credentials",
            ),
            sqlx::Error::PoolTimedOut => (
                "timed out waiting for a pooled connection".to_string(),
                None,
                "The database is busy; retry later",
            ),
            sqlx::Error::PoolClosed => (
                "connection pool is closed".to_string(),
                None,
                "The server is shutting down",
            ),
            sqlx::Error::Io(io_err) => (
                format!("I/O error: {}", io_err),
                None,
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => (
                format!("TLS error: {}", tls_err),
                None,
                "Verify the SSL mode and server certificates",
            ),
            sqlx::Error::Protocol(msg) => (
                format!("protocol error: {}", msg),
                None,
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => (
                format!("failed to decode column {}: {}", index, source),
                None,
                "Cast the column to a text type in the statement",
            ),
            sqlx::Error::Decode(source) => (
                format!("decode error: {}", source),
                None,
                "Cast the column to a text type in the statement",
            ),
            other => (
                other.to_string(),
                None,
                "Check the statement and the database server logs",
            ),
        };
        Self {
            message,
            sql_state,
            suggestion,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::MalformedRequest { .. } | DbError::UnknownTool { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), None)
            }

            DbError::DatabaseNotFound { available, .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                Some(serde_json::json!({
                    "available": available,
                    "suggestion": "Pass one of the available database names",
                })),
            ),

            // Statement errors carry a SQLSTATE and are the caller's to fix.
            DbError::Execution {
                sql_state: Some(code),
                suggestion,
                ..
            } => rmcp::ErrorData::invalid_params(
                format!("{} (SQLSTATE: {})", err, code),
                suggestion_data(suggestion.as_deref()),
            ),
            DbError::Execution { .. } | DbError::Configuration { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(err.suggestion()))
            }

            DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), None),
        }
    }
}
