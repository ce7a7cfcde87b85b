//! Stopping statements that are already running.
//!
//! Dropping a driver future does not stop the server: PostgreSQL and MySQL
//! keep executing, and the SQLite worker keeps stepping the statement while
//! it holds the only connection. A [`Canceller`] is taken when a connection is
//! checked out for a command and stops that connection's current statement
//! when the command's interrupt token fires.

use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Executor, MySqlPool, PgPool};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// SQLite virtual machine instructions between two interrupt checks.
const SQLITE_PROGRESS_OPS: i32 = 1_000;

/// Stops the statement running on one checked-out connection.
#[derive(Debug, Clone)]
pub(crate) enum Canceller {
    /// `KILL QUERY` sent from another pooled connection.
    MySql { pool: MySqlPool, connection_id: i64 },
    /// `pg_cancel_backend` sent from another pooled connection.
    Postgres { pool: PgPool, pid: i32 },
    /// The connection's progress handler watches the interrupt token.
    SQLite,
}

impl Canceller {
    pub(crate) async fn mysql(
        pool: &MySqlPool,
        conn: &mut MySqlConnection,
    ) -> Result<Self, sqlx::Error> {
        let connection_id: i64 = sqlx::query_scalar("SELECT CAST(CONNECTION_ID() AS SIGNED)")
            .fetch_one(&mut *conn)
            .await?;
        Ok(Self::MySql {
            pool: pool.clone(),
            connection_id,
        })
    }

    pub(crate) async fn postgres(
        pool: &PgPool,
        conn: &mut PgConnection,
    ) -> Result<Self, sqlx::Error> {
        let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut *conn)
            .await?;
        Ok(Self::Postgres {
            pool: pool.clone(),
            pid,
        })
    }

    /// Install a progress handler that aborts the running statement once
    /// `interrupt` fires. Pair with [`disarm_sqlite`].
    pub(crate) async fn sqlite(
        conn: &mut SqliteConnection,
        interrupt: &CancellationToken,
    ) -> Result<Self, sqlx::Error> {
        let token = interrupt.clone();
        let mut fired = false;
        conn.lock_handle()
            .await?
            .set_progress_handler(SQLITE_PROGRESS_OPS, move || {
                // Fires once, so a handler left behind by a dropped command
                // cannot block the statements that follow it.
                if fired || !token.is_cancelled() {
                    return true;
                }
                fired = true;
                false
            });
        Ok(Self::SQLite)
    }

    /// Await `work`. If `interrupt` fires first, ask the server to stop the
    /// statement and keep waiting until the driver reports how it ended, so
    /// the connection goes back to its pool idle.
    pub(crate) async fn guard<T, F>(
        &self,
        interrupt: &CancellationToken,
        work: F,
    ) -> Result<T, sqlx::Error>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        tokio::pin!(work);
        tokio::select! {
            biased;
            result = &mut work => return result,
            _ = interrupt.cancelled() => {}
        }
        self.cancel().await;
        work.await
    }

    async fn cancel(&self) {
        let result = match self {
            Self::MySql {
                pool,
                connection_id,
            } => pool
                .execute(format!("KILL QUERY {}", connection_id).as_str())
                .await
                .map(|_| ()),
            Self::Postgres { pool, pid } => sqlx::query("SELECT pg_cancel_backend($1)")
                .bind(*pid)
                .execute(pool)
                .await
                .map(|_| ()),
            Self::SQLite => Ok(()),
        };
        match result {
            Ok(()) => debug!(target_connection = ?self.target(), "Interrupted running statement"),
            Err(e) => warn!(error = %e, "Failed to interrupt running statement"),
        }
    }

    fn target(&self) -> Option<i64> {
        match self {
            Self::MySql { connection_id, .. } => Some(*connection_id),
            Self::Postgres { pid, .. } => Some((*pid).into()),
            Self::SQLite => None,
        }
    }
}

/// Remove the progress handler installed by [`Canceller::sqlite`].
pub(crate) async fn disarm_sqlite(conn: &mut SqliteConnection) {
    match conn.lock_handle().await {
        Ok(mut handle) => handle.remove_progress_handler(),
        Err(e) => warn!(error = %e, "Failed to remove SQLite progress handler"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;
    use std::time::Duration;

    const SLOW_COUNT: &str = "WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM c \
                              WHERE n < 500000000) SELECT COUNT(*) FROM c";

    #[tokio::test]
    async fn test_sqlite_progress_handler_stops_statement() {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        let interrupt = CancellationToken::new();
        let canceller = Canceller::sqlite(&mut conn, &interrupt).await.unwrap();

        let trigger = interrupt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = canceller
            .guard(&interrupt, sqlx::query_scalar::<_, i64>(SLOW_COUNT).fetch_one(&mut conn))
            .await;
        tokio_test::assert_err!(result);
        assert!(started.elapsed() < Duration::from_secs(5));

        // The handler fired once; the connection runs statements again.
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&mut conn).await.unwrap();
        assert_eq!(one, 1);
        disarm_sqlite(&mut conn).await;
    }

    #[tokio::test]
    async fn test_guard_returns_finished_work() {
        let interrupt = CancellationToken::new();
        let value = Canceller::SQLite
            .guard(&interrupt, async { Ok::<_, sqlx::Error>(3) })
            .await;
        assert_eq!(tokio_test::assert_ok!(value), 3);
    }
}
