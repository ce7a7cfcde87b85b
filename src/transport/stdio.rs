//! Stdio transport for the MCP server.
//!
//! This transport uses standard input/output for communication,
//! which is the standard mode for CLI-based MCP integrations.

use crate::error::{DbError, DbResult};
use crate::mcp::SqlToolService;
use crate::tools::ToolDispatcher;
use crate::transport::Transport;
use rmcp::service::{RoleServer, RunningService};
use rmcp::transport::{IntoTransport, stdio};
use rmcp::ServiceExt;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Stdio transport implementation.
///
/// This transport reads JSON-RPC messages from stdin and writes
/// responses to stdout, following the MCP protocol specification.
pub struct StdioTransport {
    dispatcher: Arc<ToolDispatcher>,
}

impl StdioTransport {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Complete the MCP handshake on `transport`. The registry is closed
    /// before a failed handshake is reported.
    async fn start<T, E, A>(
        &self,
        transport: T,
    ) -> DbResult<RunningService<RoleServer, SqlToolService>>
    where
        T: IntoTransport<RoleServer, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let service = SqlToolService::new(self.dispatcher.clone());
        match service.serve(transport).await {
            Ok(running_service) => Ok(running_service),
            Err(e) => {
                self.dispatcher.registry().close_all().await;
                Err(DbError::internal(format!("Failed to start stdio transport: {}", e)))
            }
        }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let running_service = self.start(stdio()).await?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => info!("Client disconnected"),
                    Err(e) => warn!(error = %e, "Stdio transport error"),
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        self.dispatcher.registry().close_all().await;

        if shutdown_requested {
            // A pending stdin read cannot be interrupted, so leave directly.
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

/// Wait for SIGINT or SIGTERM. If a handler cannot be installed, that
/// signal is never reported.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CommandExecutor, ConnectionRegistry, RegistryMode};
    use crate::models::ConnectionConfig;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    async fn sqlite_transport(dir: &TempDir) -> StdioTransport {
        let path = dir.path().join("stdio.db");
        let build = ConnectionRegistry::connect(
            vec![ConnectionConfig::sqlite("stdio", path.to_string_lossy())],
            RegistryMode::Single,
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(build.registry), CommandExecutor::default());
        StdioTransport::new(Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn test_stdio_transport_creation() {
        let dir = TempDir::new().unwrap();
        let transport = sqlite_transport(&dir).await;
        assert_eq!(transport.name(), "stdio");
        transport.dispatcher.registry().close_all().await;
    }

    #[tokio::test]
    async fn test_failed_handshake_closes_registry() {
        let dir = TempDir::new().unwrap();
        let transport = sqlite_transport(&dir).await;

        // The client hangs up before sending `initialize`.
        let (client, server) = tokio::io::duplex(1024);
        drop(client);
        let result = transport.start(tokio::io::split(server)).await;
        assert!(result.is_err());

        let pool = transport.dispatcher.registry().resolve("stdio").unwrap();
        tokio_test::assert_err!(pool.ping().await);
    }
}
