//! Database-specific transaction handle.
//!
//! A `DbTransaction` lives for exactly one `transaction_tool` invocation.
//! Dropping it without commit makes the driver roll it back when the
//! connection returns to its pool, so an interrupted invocation never leaves
//! a transaction open.

use crate::db::interrupt::{Canceller, disarm_sqlite};
use crate::db::pool::{DbPool, mysql_execute, postgres_execute, sqlite_execute};
use crate::models::QueryParam;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use tokio_util::sync::CancellationToken;

/// An open transaction plus the means to stop its running statement.
pub struct DbTransaction {
    tx: Tx,
    canceller: Canceller,
}

enum Tx {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Begin a transaction on a connection taken from `pool`. Statements run
    /// later are stopped on the server once `interrupt` fires.
    pub async fn begin(pool: &DbPool, interrupt: &CancellationToken) -> Result<Self, sqlx::Error> {
        impl_db_dispatch!(pool, {
            MySql(p) => {
                let mut tx = p.begin().await?;
                let canceller = Canceller::mysql(p, &mut tx).await?;
                Ok(Self { tx: Tx::MySql(tx), canceller })
            },
            Postgres(p) => {
                let mut tx = p.begin().await?;
                let canceller = Canceller::postgres(p, &mut tx).await?;
                Ok(Self { tx: Tx::Postgres(tx), canceller })
            },
            SQLite(p) => {
                let mut tx = p.begin().await?;
                let canceller = Canceller::sqlite(&mut tx, interrupt).await?;
                Ok(Self { tx: Tx::SQLite(tx), canceller })
            },
        })
    }

    /// Run one statement inside the transaction and report affected rows.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        interrupt: &CancellationToken,
    ) -> Result<u64, sqlx::Error> {
        let canceller = &self.canceller;
        match &mut self.tx {
            Tx::MySql(tx) => canceller.guard(interrupt, mysql_execute(&mut **tx, sql, params)).await,
            Tx::Postgres(tx) => {
                canceller.guard(interrupt, postgres_execute(&mut **tx, sql, params)).await
            }
            Tx::SQLite(tx) => canceller.guard(interrupt, sqlite_execute(&mut **tx, sql, params)).await,
        }
    }

    /// Commit the transaction.
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self.tx {
            Tx::MySql(tx) => tx.commit().await,
            Tx::Postgres(tx) => tx.commit().await,
            Tx::SQLite(mut tx) => {
                disarm_sqlite(&mut tx).await;
                tx.commit().await
            }
        }
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        match self.tx {
            Tx::MySql(tx) => tx.rollback().await,
            Tx::Postgres(tx) => tx.rollback().await,
            Tx::SQLite(mut tx) => {
                disarm_sqlite(&mut tx).await;
                tx.rollback().await
            }
        }
    }
}
