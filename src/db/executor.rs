//! Command execution.
//!
//! The four executors run one command against one resolved `DbPool`. Every
//! database round-trip goes through [`CommandScope::run`], which races it
//! against the caller's cancellation token and the command deadline.

use crate::db::pool::DbPool;
use crate::db::transaction::DbTransaction;
use crate::error::{DbError, DbResult};
use crate::models::{
    Command, DEFAULT_QUERY_TIMEOUT_SECS, ExecuteRequest, ExecuteResult, MAX_QUERY_TIMEOUT_SECS,
    QueryRequest, QueryResult, SchemaRequest, StatementOutcome, TransactionRequest,
    describe_result,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound for a rollback issued after a failed or cancelled statement.
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an interrupted round-trip may take to report that it stopped.
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Command name, target database, cancellation and deadline for one invocation.
pub struct CommandScope<'a> {
    command: Command,
    database: &'a str,
    cancel: &'a CancellationToken,
    interrupt: CancellationToken,
    timeout_secs: u32,
    deadline: Instant,
}

impl<'a> CommandScope<'a> {
    pub fn new(
        command: Command,
        database: &'a str,
        cancel: &'a CancellationToken,
        timeout_secs: u32,
    ) -> Self {
        Self {
            command,
            database,
            cancel,
            interrupt: cancel.child_token(),
            timeout_secs,
            deadline: Instant::now() + Duration::from_secs(timeout_secs.into()),
        }
    }

    /// Fires on client cancellation or when the deadline passes. Database
    /// operations stop their running statement when it does.
    pub fn interrupt(&self) -> &CancellationToken {
        &self.interrupt
    }

    /// Await one database round-trip. Cancellation wins over a result that
    /// becomes ready at the same time. On cancellation or deadline the
    /// interrupt fires and the round-trip gets a short grace period to stop,
    /// so its connection is idle again before the error is returned.
    pub async fn run<T, F>(&self, context: Option<&str>, operation: F) -> DbResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        tokio::pin!(operation);
        let reason = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => self.cancelled_reason(),
            outcome = timeout_at(self.deadline, &mut operation) => match outcome {
                Ok(result) => return self.driver_result(context, result),
                Err(_) => self.deadline_reason(),
            },
        };

        self.interrupt.cancel();
        if timeout(INTERRUPT_GRACE, operation).await.is_err() {
            warn!(database = %self.database, "Interrupted statement did not stop within the grace period");
        }
        Err(self.interrupted(context, &reason))
    }

    /// Await a round-trip that cannot be taken back once sent, such as
    /// COMMIT. Its own outcome is reported; cancellation and the deadline
    /// only bound how long the wait lasts.
    pub async fn settle<T, F>(&self, context: Option<&str>, operation: F) -> DbResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        tokio::pin!(operation);
        let reason = tokio::select! {
            biased;
            outcome = timeout_at(self.deadline, &mut operation) => match outcome {
                Ok(result) => return self.driver_result(context, result),
                Err(_) => self.deadline_reason(),
            },
            _ = self.cancel.cancelled() => self.cancelled_reason(),
        };

        match timeout(INTERRUPT_GRACE, operation).await {
            Ok(result) => self.driver_result(context, result),
            Err(_) => Err(self.interrupted(context, &format!("{}; outcome unknown", reason))),
        }
    }

    /// Fail if the invocation was cancelled or ran out of time.
    pub fn check(&self, context: Option<&str>) -> DbResult<()> {
        if self.cancel.is_cancelled() {
            return Err(self.interrupted(context, &self.cancelled_reason()));
        }
        if Instant::now() >= self.deadline {
            return Err(self.interrupted(context, &self.deadline_reason()));
        }
        Ok(())
    }

    fn driver_result<T>(&self, context: Option<&str>, result: Result<T, sqlx::Error>) -> DbResult<T> {
        result.map_err(|e| DbError::from_driver(self.command, self.database, context, &e))
    }

    fn cancelled_reason(&self) -> String {
        "cancelled by client".to_string()
    }

    fn deadline_reason(&self) -> String {
        format!("deadline of {}s exceeded", self.timeout_secs)
    }

    fn interrupted(&self, context: Option<&str>, reason: &str) -> DbError {
        let message = match context {
            Some(context) => format!("{}: {}", context, reason),
            None => reason.to_string(),
        };
        DbError::execution(self.command, self.database, message)
    }
}

/// Runs commands against resolved connection handles.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    default_timeout_secs: u32,
}

impl CommandExecutor {
    /// Create an executor whose commands default to `default_timeout_secs`.
    pub fn new(default_timeout_secs: u32) -> Self {
        Self {
            default_timeout_secs: default_timeout_secs.clamp(1, MAX_QUERY_TIMEOUT_SECS),
        }
    }

    fn scope<'a>(
        &self,
        command: Command,
        database: &'a str,
        requested_secs: Option<u32>,
        cancel: &'a CancellationToken,
    ) -> CommandScope<'a> {
        let secs = requested_secs
            .unwrap_or(self.default_timeout_secs)
            .clamp(1, MAX_QUERY_TIMEOUT_SECS);
        CommandScope::new(command, database, cancel, secs)
    }

    /// Run a single statement and return the affected-row count.
    pub async fn execute(
        &self,
        pool: &DbPool,
        request: &ExecuteRequest,
        cancel: &CancellationToken,
    ) -> DbResult<ExecuteResult> {
        let scope = self.scope(Command::Execute, &request.database, request.timeout_secs, cancel);
        debug!(database = %request.database, sql = %request.statement, "Executing statement");

        let rows_affected = scope
            .run(
                None,
                pool.execute(&request.statement, &request.arguments, scope.interrupt()),
            )
            .await?;

        info!(
            database = %request.database,
            rows_affected = rows_affected,
            "Statement executed"
        );
        Ok(ExecuteResult { rows_affected })
    }

    /// Run a query and return every row it produces.
    pub async fn query(
        &self,
        pool: &DbPool,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> DbResult<QueryResult> {
        let scope = self.scope(Command::Query, &request.database, request.timeout_secs, cancel);
        debug!(database = %request.database, sql = %request.statement, "Running query");

        let result = scope
            .run(
                None,
                pool.fetch_all(&request.statement, &request.arguments, scope.interrupt()),
            )
            .await?;

        info!(
            database = %request.database,
            row_count = result.row_count,
            "Query completed"
        );
        Ok(result)
    }

    /// Run every statement in one transaction; commit only if all succeed.
    pub async fn transaction(
        &self,
        pool: &DbPool,
        request: &TransactionRequest,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<StatementOutcome>> {
        let scope = self.scope(
            Command::Transaction,
            &request.database,
            request.timeout_secs,
            cancel,
        );

        let mut tx = scope
            .run(
                Some("failed to begin transaction"),
                DbTransaction::begin(pool, scope.interrupt()),
            )
            .await?;

        let mut outcomes = Vec::with_capacity(request.statements.len());
        for (index, (statement, arguments)) in
            request.statements.iter().zip(&request.arguments).enumerate()
        {
            debug!(database = %request.database, index, sql = %statement, "Executing statement in transaction");
            let context = format!("failed to execute statement {}", index);
            let outcome = scope
                .run(Some(&context), tx.execute(statement, arguments, scope.interrupt()))
                .await;
            match outcome {
                Ok(rows_affected) => outcomes.push(StatementOutcome {
                    statement_index: index,
                    rows_affected,
                }),
                Err(err) => return Err(abort(tx, err, &request.database).await),
            }
        }

        if let Err(err) = scope.check(Some("failed to commit transaction")) {
            return Err(abort(tx, err, &request.database).await);
        }
        scope
            .settle(Some("failed to commit transaction"), tx.commit())
            .await?;

        info!(
            database = %request.database,
            statements = outcomes.len(),
            "Transaction committed"
        );
        Ok(outcomes)
    }

    /// Describe a table's columns in declaration order.
    pub async fn describe_table(
        &self,
        pool: &DbPool,
        request: &SchemaRequest,
        cancel: &CancellationToken,
    ) -> DbResult<QueryResult> {
        let scope = self.scope(Command::Schema, &request.database, request.timeout_secs, cancel);

        let columns = scope
            .run(
                None,
                pool.describe_columns(
                    &request.table_name,
                    request.schema.as_deref(),
                    scope.interrupt(),
                ),
            )
            .await?;

        info!(
            database = %request.database,
            table = %request.table_name,
            columns = columns.len(),
            "Table described"
        );
        Ok(describe_result(columns))
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT_SECS)
    }
}

/// Roll back after a failed statement and return the statement error, with
/// any rollback failure attached as secondary context.
async fn abort(tx: DbTransaction, err: DbError, database: &str) -> DbError {
    match timeout(ROLLBACK_TIMEOUT, tx.rollback()).await {
        Ok(Ok(())) => {
            warn!(database = %database, error = %err, "Transaction rolled back");
            err
        }
        Ok(Err(rollback_err)) => {
            warn!(database = %database, error = %rollback_err, "Rollback failed");
            err.with_rollback_error(rollback_err.to_string())
        }
        Err(_) => {
            warn!(database = %database, "Rollback timed out");
            err.with_rollback_error(format!(
                "rollback did not finish within {}s",
                ROLLBACK_TIMEOUT.as_secs()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A round-trip that stops as soon as the scope's interrupt fires.
    fn until_interrupted(scope: &CommandScope<'_>) -> impl Future<Output = Result<(), sqlx::Error>> {
        let interrupt = scope.interrupt().clone();
        async move {
            interrupt.cancelled().await;
            Err(sqlx::Error::PoolClosed)
        }
    }

    #[tokio::test]
    async fn test_scope_passes_through_success() {
        let cancel = CancellationToken::new();
        let scope = CommandScope::new(Command::Query, "main", &cancel, 5);
        let value = scope.run(None, async { Ok::<_, sqlx::Error>(7) }).await;
        assert_eq!(tokio_test::assert_ok!(value), 7);
        assert!(!scope.interrupt().is_cancelled());
    }

    #[tokio::test]
    async fn test_scope_maps_driver_error_with_context() {
        let cancel = CancellationToken::new();
        let scope = CommandScope::new(Command::Transaction, "main", &cancel, 5);
        let err = scope
            .run(Some("failed to commit transaction"), async {
                Err::<(), _>(sqlx::Error::PoolClosed)
            })
            .await;
        let err = tokio_test::assert_err!(err);
        assert!(matches!(err, DbError::Execution { .. }));
        assert!(err.to_string().contains("failed to commit transaction"));
    }

    #[tokio::test]
    async fn test_scope_cancellation_interrupts_the_round_trip() {
        let cancel = CancellationToken::new();
        let scope = CommandScope::new(Command::Execute, "main", &cancel, 5);
        cancel.cancel();
        let err = scope.run(None, until_interrupted(&scope)).await.unwrap_err();
        assert!(err.to_string().contains("cancelled by client"));
        assert!(scope.interrupt().is_cancelled());
    }

    #[tokio::test]
    async fn test_scope_deadline_interrupts_the_round_trip() {
        let cancel = CancellationToken::new();
        let scope = CommandScope::new(Command::Query, "slow", &cancel, 1);
        let err = scope.run(None, until_interrupted(&scope)).await.unwrap_err();
        assert!(err.to_string().contains("deadline of 1s exceeded"));
        assert!(scope.interrupt().is_cancelled());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_settle_reports_outcome_after_cancellation() {
        let cancel = CancellationToken::new();
        let scope = CommandScope::new(Command::Transaction, "main", &cancel, 5);
        let trigger = cancel.clone();
        let committed = async move {
            trigger.cancel();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok::<_, sqlx::Error>(())
        };
        tokio_test::assert_ok!(scope.settle(Some("failed to commit transaction"), committed).await);
        assert!(scope.check(None).unwrap_err().to_string().contains("cancelled by client"));
    }

    #[test]
    fn test_executor_clamps_default_timeout() {
        assert_eq!(CommandExecutor::new(0).default_timeout_secs, 1);
        assert_eq!(CommandExecutor::new(10_000).default_timeout_secs, MAX_QUERY_TIMEOUT_SECS);
        assert_eq!(
            CommandExecutor::default().default_timeout_secs,
            DEFAULT_QUERY_TIMEOUT_SECS
        );
    }
}
