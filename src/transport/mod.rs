//! Transport layer for the MCP server.
//!
//! Only stdio is provided: the server is launched as a child process by the
//! MCP client and speaks JSON-RPC over its standard streams.

pub mod stdio;

pub use stdio::{StdioTransport, wait_for_signal};

use crate::error::DbResult;
use std::future::Future;

/// Trait for MCP transport implementations.
///
/// Transports handle the low-level communication between the MCP server
/// and clients, abstracting away the protocol details.
pub trait Transport: Send + Sync {
    /// Serve until the client disconnects or the process is asked to stop,
    /// then close every database connection.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
