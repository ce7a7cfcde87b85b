//! Table introspection.
//!
//! One fixed query per backend, ordered by the engine's column position.
//! Rows pass through the same shaper as query results, so byte-typed
//! catalog columns come back as text.

use crate::db::interrupt::{Canceller, disarm_sqlite};
use crate::db::pool::DbPool;
use crate::db::types::ShapeRow;
use crate::models::{ColumnDescriptor, ResultValue};
use tokio_util::sync::CancellationToken;

mod queries {
    pub mod postgres {
        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type,
            is_nullable::text AS is_nullable,
            column_default::text AS column_default
        FROM information_schema.columns
        WHERE table_name::text = $1 AND ($2::text IS NULL OR table_schema::text = $2::text)
        ORDER BY ordinal_position
        "#;
    }

    pub mod mysql {
        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8mb4) AS COLUMN_NAME,
            CONVERT(DATA_TYPE USING utf8mb4) AS DATA_TYPE,
            CONVERT(IS_NULLABLE USING utf8mb4) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8mb4) AS COLUMN_DEFAULT
        FROM information_schema.columns
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
        "#;
    }

    pub mod sqlite {
        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT name, type, "notnull", dflt_value
        FROM pragma_table_info(?1)
        ORDER BY cid
        "#;

        pub const DESCRIBE_COLUMNS_IN_SCHEMA: &str = r#"
        SELECT name, type, "notnull", dflt_value
        FROM pragma_table_info(?1, ?2)
        ORDER BY cid
        "#;
    }
}

/// Read a catalog column as text through the result shaper.
fn text_at<R: ShapeRow>(row: &R, idx: usize) -> Result<Option<String>, sqlx::Error> {
    Ok(match row.shape_value(idx)? {
        ResultValue::Null => None,
        ResultValue::Text(s) => Some(s),
        ResultValue::Int(i) => Some(i.to_string()),
        ResultValue::Float(f) => Some(f.to_string()),
        ResultValue::Bool(b) => Some(b.to_string()),
    })
}

/// Build descriptors from `(name, type, nullability flag, default)` rows.
fn descriptors<R: ShapeRow>(
    rows: &[R],
    is_nullable: impl Fn(&str) -> bool,
) -> Result<Vec<ColumnDescriptor>, sqlx::Error> {
    rows.iter()
        .map(|row| {
            Ok(ColumnDescriptor {
                name: text_at(row, 0)?.unwrap_or_default(),
                data_type: text_at(row, 1)?.unwrap_or_default(),
                nullable: is_nullable(&text_at(row, 2)?.unwrap_or_default()),
                default: text_at(row, 3)?,
            })
        })
        .collect()
}

fn information_schema_nullable(flag: &str) -> bool {
    flag.eq_ignore_ascii_case("YES")
}

fn pragma_nullable(notnull: &str) -> bool {
    notnull == "0"
}

impl DbPool {
    /// Describe the columns of `table`, in declaration order. A table that
    /// does not exist yields an empty list.
    pub async fn describe_columns(
        &self,
        table: &str,
        schema: Option<&str>,
        interrupt: &CancellationToken,
    ) -> Result<Vec<ColumnDescriptor>, sqlx::Error> {
        impl_db_dispatch!(self, {
            MySql(p) => {
                let mut conn = p.acquire().await?;
                let canceller = Canceller::mysql(p, &mut conn).await?;
                let query = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
                    .bind(table)
                    .bind(schema)
                    .fetch_all(&mut *conn);
                let rows = canceller.guard(interrupt, query).await?;
                descriptors(&rows, information_schema_nullable)
            },
            Postgres(p) => {
                let mut conn = p.acquire().await?;
                let canceller = Canceller::postgres(p, &mut conn).await?;
                let query = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
                    .bind(table)
                    .bind(schema)
                    .fetch_all(&mut *conn);
                let rows = canceller.guard(interrupt, query).await?;
                descriptors(&rows, information_schema_nullable)
            },
            SQLite(p) => {
                let mut conn = p.acquire().await?;
                let canceller = Canceller::sqlite(&mut conn, interrupt).await?;
                let query = match schema {
                    Some(schema) => sqlx::query(queries::sqlite::DESCRIBE_COLUMNS_IN_SCHEMA)
                        .bind(table)
                        .bind(schema),
                    None => sqlx::query(queries::sqlite::DESCRIBE_COLUMNS).bind(table),
                };
                let rows = canceller.guard(interrupt, query.fetch_all(&mut *conn)).await;
                disarm_sqlite(&mut conn).await;
                descriptors(&rows?, pragma_nullable)
            },
        })
    }
}
