//! SQL MCP Server - Main entry point.
//!
//! This server exposes four MCP tools (execute, query, schema, transaction)
//! over one or more named SQL databases (PostgreSQL, MySQL, SQLite).

use clap::Parser;
use sql_mcp_server::config::Config;
use sql_mcp_server::db::{CommandExecutor, ConnectionRegistry};
use sql_mcp_server::tools::ToolDispatcher;
use sql_mcp_server::transport::{StdioTransport, Transport, wait_for_signal};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Logs go to stderr; stdout carries the
/// protocol.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let config = Config::parse();
    init_tracing(&config);

    info!("Starting SQL MCP Server v{}", env!("CARGO_PKG_VERSION"));

    let (configs, mode) = match config.connection_plan() {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "Invalid database configuration");
            return Err(e.into());
        }
    };

    // Ctrl-C during startup aborts every pending connection attempt.
    let startup = CancellationToken::new();
    let startup_guard = startup.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        startup_guard.cancel();
    });

    let built = ConnectionRegistry::connect(
        configs,
        mode,
        config.connect_timeout_duration(),
        &startup,
    )
    .await;
    signal_task.abort();

    let build = match built {
        Ok(build) => build,
        Err(e) => {
            error!(error = %e, suggestion = e.suggestion().unwrap_or_default(), "Startup failed");
            return Err(e.into());
        }
    };
    if let Some(first) = build.first_failure() {
        warn!(
            failed = build.failures.len(),
            first_failure = %first,
            "Serving without some configured databases"
        );
    }

    let registry = Arc::new(build.registry);
    let executor = CommandExecutor::new(config.query_timeout_secs());
    let dispatcher = Arc::new(ToolDispatcher::new(registry, executor));

    let transport = StdioTransport::new(dispatcher);
    info!(transport = transport.name(), "Serving MCP");
    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
