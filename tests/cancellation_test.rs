//! Integration tests for cancellation and deadlines.
//!
//! A long-running recursive query is interrupted either by the caller's
//! cancellation token or by its deadline; the connection must stay usable.

use serde_json::json;
use sql_mcp_server::db::{CommandExecutor, ConnectionRegistry, RegistryMode};
use sql_mcp_server::models::ConnectionConfig;
use sql_mcp_server::{DbError, ToolDispatcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Rows counted by the slow query; far more than finish inside any test's
/// acquire timeout.
const SLOW_ROWS: u64 = 500_000_000;

/// Counts `rows` generated rows. SQLite computes the whole count before the
/// first row is returned, so the statement stays busy until it finishes or
/// is interrupted.
fn slow_query(rows: u64) -> String {
    format!(
        "WITH RECURSIVE counter(n) AS (\
            SELECT 1 UNION ALL SELECT n + 1 FROM counter WHERE n < {}\
        ) SELECT COUNT(*) AS total FROM counter",
        rows
    )
}

async fn follow_up_rows(dispatcher: &ToolDispatcher) -> serde_json::Value {
    let started = Instant::now();
    let args = json!({"statement": "SELECT 1 AS ok", "arguments": []});
    let output = dispatcher
        .dispatch("query_tool", args.as_object(), &CancellationToken::new())
        .await
        .unwrap();
    // The connection was freed by the interrupt, not by the pool giving up.
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    serde_json::to_value(output).unwrap()["rows"].clone()
}

async fn setup() -> (ToolDispatcher, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slow.db");
    let build = ConnectionRegistry::connect(
        vec![ConnectionConfig::sqlite("slow", path.to_string_lossy())],
        RegistryMode::Single,
        Duration::from_secs(5),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    let dispatcher = ToolDispatcher::new(Arc::new(build.registry), CommandExecutor::default());
    (dispatcher, dir)
}

#[tokio::test]
async fn test_cancel_mid_query_leaves_connection_usable() {
    let (dispatcher, _dir) = setup().await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let args = json!({"statement": slow_query(SLOW_ROWS), "arguments": []});
    let err = dispatcher
        .dispatch("query_tool", args.as_object(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Execution { .. }));
    assert!(err.to_string().contains("cancelled by client"), "{}", err);

    assert_eq!(follow_up_rows(&dispatcher).await, json!([{"ok": 1}]));
}

#[tokio::test]
async fn test_cancel_mid_execute_leaves_connection_usable() {
    let (dispatcher, _dir) = setup().await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let args = json!({
        "statement": format!("CREATE TABLE copied AS {}", slow_query(SLOW_ROWS)),
        "arguments": [],
    });
    let err = dispatcher
        .dispatch("execute_tool", args.as_object(), &cancel)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cancelled by client"), "{}", err);

    assert_eq!(follow_up_rows(&dispatcher).await, json!([{"ok": 1}]));
}

#[tokio::test]
async fn test_deadline_interrupts_query() {
    let (dispatcher, _dir) = setup().await;

    let args = json!({
        "statement": slow_query(SLOW_ROWS),
        "arguments": [],
        "timeout_secs": 1,
    });
    let err = dispatcher
        .dispatch("query_tool", args.as_object(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("deadline of 1s exceeded"), "{}", err);

    assert_eq!(follow_up_rows(&dispatcher).await, json!([{"ok": 1}]));
}

#[tokio::test]
async fn test_cancelled_transaction_commits_nothing() {
    let (dispatcher, _dir) = setup().await;

    let args = json!({
        "statement": "CREATE TABLE marks (n INTEGER)",
        "arguments": [],
    });
    dispatcher
        .dispatch("execute_tool", args.as_object(), &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let args = json!({
        "statements": ["INSERT INTO marks (n) VALUES (1)", slow_query(SLOW_ROWS)],
        "arguments": [[], []],
    });
    let err = dispatcher
        .dispatch("transaction_tool", args.as_object(), &cancel)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cancelled by client"), "{}", err);

    let args = json!({"statement": "SELECT COUNT(*) AS n FROM marks", "arguments": []});
    let output = dispatcher
        .dispatch("query_tool", args.as_object(), &CancellationToken::new())
        .await
        .unwrap();
    let value = serde_json::to_value(output).unwrap();
    assert_eq!(value["rows"], json!([{"n": 0}]));
}
