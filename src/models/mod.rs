//! Data models for the SQL MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType, SslMode};
pub use query::{
    Command, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_QUERY_TIMEOUT_SECS, ExecuteRequest,
    ExecuteResult, MAX_QUERY_TIMEOUT_SECS, QueryParam, QueryRequest, QueryResult, ResultValue,
    Row, StatementOutcome, TransactionRequest,
};
pub use schema::{ColumnDescriptor, SchemaRequest, describe_result};
