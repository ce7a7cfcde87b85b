//! SQL MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools that run SQL
//! statements, queries, transactions and table introspection against a
//! registry of named databases (SQLite, PostgreSQL, MySQL).

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{DbError, DbResult};
pub use mcp::SqlToolService;
pub use tools::{ToolDispatcher, ToolOutput};
