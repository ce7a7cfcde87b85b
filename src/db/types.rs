//! Result shaping: native column values to wire-safe values.
//!
//! # Architecture
//!
//! Shaping uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's type name into a logical category
//! 2. Database-specific decoders extract the value for that category
//!
//! SQLite is typed per value rather than per column, so its decoder looks at
//! the runtime storage class instead of the category.
//!
//! Every decoder yields a `ResultValue`: nulls stay null, raw bytes become
//! UTF-8 text, and engine-specific kinds (decimals, temporals, UUIDs, JSON)
//! become their canonical text. Decode failures are returned, never replaced
//! by a silent null.

use crate::models::{DatabaseType, QueryResult, ResultValue, Row as ShapedRow};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();
    let base = lower.trim_end_matches(" unsigned");

    // SQLite's NUMERIC affinity holds plain numbers
    if db == DatabaseType::SQLite && base == "numeric" {
        return TypeCategory::Float;
    }

    match base {
        "decimal" | "numeric" => TypeCategory::Decimal,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "int2" | "int4"
        | "int8" | "year" => TypeCategory::Integer,
        "bool" | "boolean" => TypeCategory::Boolean,
        "float" | "double" | "real" | "float4" | "float8" => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "timestamp" if db == DatabaseType::MySQL => TypeCategory::TimestampTz,
        "timestamp" | "datetime" => TypeCategory::Timestamp,
        "timestamptz" => TypeCategory::TimestampTz,
        "bytea" | "bit" => TypeCategory::Binary,
        other if other.contains("blob") || other.contains("binary") => TypeCategory::Binary,
        _ => TypeCategory::Unknown,
    }
}

fn lift<T>(value: Option<T>, f: impl FnOnce(T) -> ResultValue) -> ResultValue {
    value.map(f).unwrap_or(ResultValue::Null)
}

fn json_text(value: Option<JsonValue>) -> ResultValue {
    lift(value, |v| ResultValue::Text(v.to_string()))
}

// =============================================================================
// Row Shaping
// =============================================================================

/// Convert a driver row into an order-preserving column → value map.
pub trait ShapeRow: Row {
    /// Decode one column into a wire-safe value.
    fn shape_value(&self, idx: usize) -> Result<ResultValue, sqlx::Error>;

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn shape(&self) -> Result<ShapedRow, sqlx::Error> {
        let mut map = ShapedRow::new();
        for (idx, column) in self.columns().iter().enumerate() {
            map.insert(column.name().to_string(), self.shape_value(idx)?.into());
        }
        Ok(map)
    }
}

/// Shape a fully drained cursor. Column names come from the first row, so a
/// zero-row result has no columns.
pub fn shape_rows<R: ShapeRow>(rows: &[R]) -> Result<QueryResult, sqlx::Error> {
    let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
    let shaped = rows.iter().map(|r| r.shape()).collect::<Result<Vec<_>, _>>()?;
    Ok(QueryResult::new(columns, shaped))
}

impl ShapeRow for MySqlRow {
    fn shape_value(&self, idx: usize) -> Result<ResultValue, sqlx::Error> {
        let type_name = self.columns()[idx].type_info().name().to_uppercase();
        let category = categorize_type(&type_name, DatabaseType::MySQL);
        mysql::decode_column(self, idx, &type_name, category)
    }
}

impl ShapeRow for PgRow {
    fn shape_value(&self, idx: usize) -> Result<ResultValue, sqlx::Error> {
        let type_name = self.columns()[idx].type_info().name().to_uppercase();
        let category = categorize_type(&type_name, DatabaseType::PostgreSQL);
        postgres::decode_column(self, idx, &type_name, category)
    }
}

impl ShapeRow for SqliteRow {
    fn shape_value(&self, idx: usize) -> Result<ResultValue, sqlx::Error> {
        sqlite::decode_column(self, idx)
    }
}

// =============================================================================
// Database-specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> Result<ResultValue, sqlx::Error> {
        Ok(match category {
            TypeCategory::Integer => decode_integer(row, idx, type_name)?,
            TypeCategory::Boolean => lift(row.try_get::<Option<bool>, _>(idx)?, ResultValue::Bool),
            TypeCategory::Float if type_name == "FLOAT" => {
                lift(row.try_get::<Option<f32>, _>(idx)?, |v| ResultValue::Float(v.into()))
            }
            TypeCategory::Float => lift(row.try_get::<Option<f64>, _>(idx)?, ResultValue::Float),
            TypeCategory::Decimal => lift(row.try_get::<Option<BigDecimal>, _>(idx)?, ResultValue::text),
            TypeCategory::Json => json_text(row.try_get::<Option<JsonValue>, _>(idx)?),
            TypeCategory::Date => lift(row.try_get::<Option<NaiveDate>, _>(idx)?, ResultValue::text),
            TypeCategory::Time => lift(row.try_get::<Option<NaiveTime>, _>(idx)?, ResultValue::text),
            TypeCategory::Timestamp => {
                lift(row.try_get::<Option<NaiveDateTime>, _>(idx)?, ResultValue::text)
            }
            TypeCategory::TimestampTz => lift(row.try_get::<Option<DateTime<Utc>>, _>(idx)?, |v| {
                ResultValue::Text(v.to_rfc3339())
            }),
            // Text and binary columns both arrive as raw bytes
            TypeCategory::Binary | TypeCategory::Uuid | TypeCategory::Unknown => lift(
                row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)?,
                |v| ResultValue::from_bytes(&v),
            ),
        })
    }

    fn decode_integer(row: &MySqlRow, idx: usize, type_name: &str) -> Result<ResultValue, sqlx::Error> {
        if type_name == "YEAR" {
            return Ok(lift(row.try_get_unchecked::<Option<u16>, _>(idx)?, |v| {
                ResultValue::Int(v.into())
            }));
        }
        if type_name.ends_with("UNSIGNED") {
            return Ok(lift(row.try_get::<Option<u64>, _>(idx)?, ResultValue::from_unsigned));
        }
        Ok(lift(row.try_get::<Option<i64>, _>(idx)?, ResultValue::Int))
    }
}

mod postgres {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> Result<ResultValue, sqlx::Error> {
        Ok(match category {
            TypeCategory::Integer => match type_name {
                "INT2" => lift(row.try_get::<Option<i16>, _>(idx)?, |v| ResultValue::Int(v.into())),
                "INT4" => lift(row.try_get::<Option<i32>, _>(idx)?, |v| ResultValue::Int(v.into())),
                _ => lift(row.try_get::<Option<i64>, _>(idx)?, ResultValue::Int),
            },
            TypeCategory::Float if type_name == "FLOAT4" => {
                lift(row.try_get::<Option<f32>, _>(idx)?, |v| ResultValue::Float(v.into()))
            }
            TypeCategory::Float => lift(row.try_get::<Option<f64>, _>(idx)?, ResultValue::Float),
            TypeCategory::Boolean => lift(row.try_get::<Option<bool>, _>(idx)?, ResultValue::Bool),
            TypeCategory::Decimal => lift(row.try_get::<Option<BigDecimal>, _>(idx)?, ResultValue::text),
            TypeCategory::Binary => lift(row.try_get::<Option<Vec<u8>>, _>(idx)?, |v| {
                ResultValue::from_bytes(&v)
            }),
            TypeCategory::Json => json_text(row.try_get::<Option<JsonValue>, _>(idx)?),
            TypeCategory::Uuid => lift(row.try_get::<Option<uuid::Uuid>, _>(idx)?, ResultValue::text),
            TypeCategory::Date => lift(row.try_get::<Option<NaiveDate>, _>(idx)?, ResultValue::text),
            TypeCategory::Time => lift(row.try_get::<Option<NaiveTime>, _>(idx)?, ResultValue::text),
            TypeCategory::Timestamp => {
                lift(row.try_get::<Option<NaiveDateTime>, _>(idx)?, ResultValue::text)
            }
            TypeCategory::TimestampTz => lift(row.try_get::<Option<DateTime<Utc>>, _>(idx)?, |v| {
                ResultValue::Text(v.to_rfc3339())
            }),
            TypeCategory::Unknown => decode_text(row, idx)?,
        })
    }

    /// Text-like and engine-specific types (enums, intervals, network types).
    fn decode_text(row: &PgRow, idx: usize) -> Result<ResultValue, sqlx::Error> {
        match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(value) => Ok(lift(value, ResultValue::Text)),
            Err(_) => Ok(lift(row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)?, |v| {
                ResultValue::from_bytes(&v)
            })),
        }
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize) -> Result<ResultValue, sqlx::Error> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(ResultValue::Null);
        }
        let storage = raw.type_info().name().to_string();

        Ok(match storage.as_str() {
            "INTEGER" => {
                let value = row.try_get_unchecked::<i64, _>(idx)?;
                let declared = row.columns()[idx].type_info().name().to_lowercase();
                if categorize_type(&declared, DatabaseType::SQLite) == TypeCategory::Boolean {
                    ResultValue::Bool(value != 0)
                } else {
                    ResultValue::Int(value)
                }
            }
            "REAL" => ResultValue::Float(row.try_get_unchecked::<f64, _>(idx)?),
            "BLOB" => ResultValue::from_bytes(&row.try_get_unchecked::<Vec<u8>, _>(idx)?),
            _ => ResultValue::Text(row.try_get_unchecked::<String, _>(idx)?),
        })
    }
}
