//! Parameter binding utilities for database queries.
//!
//! Arguments are always bound positionally, never spliced into statement text.
//!
//! MySQL and SQLite convert loosely typed values on their own. PostgreSQL
//! reads every bound value in the binary form of the placeholder's type, so
//! a PostgreSQL statement is prepared first and each argument is converted
//! to the type the server inferred for its placeholder.

use crate::models::QueryParam;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgStatement, PgTypeInfo, PgTypeKind};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Either, MySql, Postgres, Sqlite, Statement, Type, TypeInfo};
use std::str::FromStr;
use uuid::Uuid;

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
    }
}

/// Build a MySQL query with every argument bound in order.
pub(crate) fn mysql_query<'q>(
    sql: &'q str,
    params: &'q [QueryParam],
) -> Query<'q, MySql, MySqlArguments> {
    params.iter().fold(sqlx::query(sql), bind_mysql_param)
}

/// Build a SQLite query with every argument bound in order.
pub(crate) fn sqlite_query<'q>(
    sql: &'q str,
    params: &'q [QueryParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(sqlx::query(sql), bind_sqlite_param)
}

/// Bind `params` to a prepared PostgreSQL statement, each converted to the
/// type of its placeholder.
pub(crate) fn postgres_statement_query<'s>(
    statement: &'s PgStatement<'_>,
    params: &[QueryParam],
) -> Result<Query<'s, Postgres, PgArguments>, sqlx::Error> {
    let types: &[PgTypeInfo] = match statement.parameters() {
        Some(Either::Left(types)) => types,
        _ => &[],
    };
    if types.len() != params.len() {
        return Err(sqlx::Error::Encode(
            format!(
                "statement has {} placeholder(s) but {} argument(s) were given",
                types.len(),
                params.len()
            )
            .into(),
        ));
    }

    params
        .iter()
        .zip(types)
        .enumerate()
        .try_fold(statement.query(), |query, (index, (param, type_info))| {
            let argument = PgArgument::coerce(param, type_info).map_err(|reason| {
                let message =
                    format!("argument {} ({}): {}", index + 1, param.type_name(), reason);
                sqlx::Error::Encode(message.into())
            })?;
            Ok(argument.bind_to(query))
        })
}

/// A scalar argument in the shape a PostgreSQL placeholder expects.
#[derive(Debug, Clone, PartialEq)]
enum PgArgument {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(BigDecimal),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(JsonValue),
    /// Text sent under the placeholder's own type.
    Text(String, PgTypeInfo),
}

impl PgArgument {
    fn coerce(param: &QueryParam, type_info: &PgTypeInfo) -> Result<Self, String> {
        if *param == QueryParam::Null {
            return Ok(Self::Null);
        }

        let mut target = type_info;
        while let PgTypeKind::Domain(base) = target.kind() {
            target = base;
        }
        if let PgTypeKind::Enum(_) = target.kind() {
            return Ok(Self::Text(text_of(param), type_info.clone()));
        }

        let name = target.name().to_ascii_uppercase();
        match name.as_str() {
            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
                Ok(Self::Text(text_of(param), type_info.clone()))
            }
            "BOOL" => boolean(param).map(Self::Bool),
            "INT2" => narrow(integer(param)?, &name).map(Self::Int2),
            "INT4" => narrow(integer(param)?, &name).map(Self::Int4),
            "INT8" => integer(param).map(Self::Int8),
            "FLOAT4" => float(param).map(|f| Self::Float4(f as f32)),
            "FLOAT8" => float(param).map(Self::Float8),
            "NUMERIC" => numeric(param).map(Self::Numeric),
            "DATE" => parse_with(param, parse_date).map(Self::Date),
            "TIME" => parse_with(param, parse_time).map(Self::Time),
            "TIMESTAMP" => parse_with(param, parse_timestamp).map(Self::Timestamp),
            "TIMESTAMPTZ" => parse_with(param, parse_timestamptz).map(Self::TimestampTz),
            "UUID" => parse_with(param, |s| Uuid::parse_str(s).ok()).map(Self::Uuid),
            "JSON" | "JSONB" => json(param).map(Self::Json),
            _ => Err(format!(
                "no conversion to a {} parameter; cast the placeholder in the statement, e.g. $1::text::{}",
                target.name(),
                target.name().to_ascii_lowercase()
            )),
        }
    }

    fn bind_to<'q>(self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments> {
        match self {
            Self::Null => query.bind(None::<String>),
            Self::Bool(v) => query.bind(v),
            Self::Int2(v) => query.bind(v),
            Self::Int4(v) => query.bind(v),
            Self::Int8(v) => query.bind(v),
            Self::Float4(v) => query.bind(v),
            Self::Float8(v) => query.bind(v),
            Self::Numeric(v) => query.bind(v),
            Self::Date(v) => query.bind(v),
            Self::Time(v) => query.bind(v),
            Self::Timestamp(v) => query.bind(v),
            Self::TimestampTz(v) => query.bind(v),
            Self::Uuid(v) => query.bind(v),
            Self::Json(v) => query.bind(v),
            Self::Text(value, type_info) => query.bind(PlaceholderText { value, type_info }),
        }
    }
}

/// Text encoded under the placeholder's type. The binary form of text-like
/// and enum types is the text itself.
struct PlaceholderText {
    value: String,
    type_info: PgTypeInfo,
}

impl Type<Postgres> for PlaceholderText {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }
}

impl Encode<'_, Postgres> for PlaceholderText {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <&str as Encode<Postgres>>::encode(self.value.as_str(), buf)
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(self.type_info.clone())
    }
}

fn text_of(param: &QueryParam) -> String {
    match param {
        QueryParam::Null => String::new(),
        QueryParam::Bool(b) => b.to_string(),
        QueryParam::Int(i) => i.to_string(),
        QueryParam::Float(f) => f.to_string(),
        QueryParam::String(s) => s.clone(),
    }
}

fn integer(param: &QueryParam) -> Result<i64, String> {
    match param {
        QueryParam::Int(i) => Ok(*i),
        QueryParam::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Ok(*f as i64),
        QueryParam::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not an integer", s)),
        _ => Err("expected an integer".to_string()),
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, type_name: &str) -> Result<T, String> {
    T::try_from(value).map_err(|_| format!("{} is out of range for {}", value, type_name))
}

fn float(param: &QueryParam) -> Result<f64, String> {
    match param {
        QueryParam::Int(i) => Ok(*i as f64),
        QueryParam::Float(f) => Ok(*f),
        QueryParam::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a number", s)),
        _ => Err("expected a number".to_string()),
    }
}

fn numeric(param: &QueryParam) -> Result<BigDecimal, String> {
    match param {
        QueryParam::Int(i) => Ok(BigDecimal::from(*i)),
        QueryParam::Float(f) => {
            BigDecimal::try_from(*f).map_err(|_| format!("{} is not a finite number", f))
        }
        QueryParam::String(s) => {
            BigDecimal::from_str(s.trim()).map_err(|_| format!("'{}' is not a number", s))
        }
        _ => Err("expected a number".to_string()),
    }
}

fn boolean(param: &QueryParam) -> Result<bool, String> {
    match param {
        QueryParam::Bool(b) => Ok(*b),
        QueryParam::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
            _ => Err(format!("'{}' is not a boolean", s)),
        },
        _ => Err("expected a boolean".to_string()),
    }
}

fn json(param: &QueryParam) -> Result<JsonValue, String> {
    match param {
        QueryParam::String(s) => {
            serde_json::from_str(s).map_err(|e| format!("invalid JSON document: {}", e))
        }
        QueryParam::Null => Ok(JsonValue::Null),
        QueryParam::Bool(b) => Ok(JsonValue::Bool(*b)),
        QueryParam::Int(i) => Ok(JsonValue::from(*i)),
        QueryParam::Float(f) => Ok(JsonValue::from(*f)),
    }
}

/// Temporal and UUID placeholders only accept their text form.
fn parse_with<T>(param: &QueryParam, parse: impl Fn(&str) -> Option<T>) -> Result<T, String> {
    match param {
        QueryParam::String(s) => parse(s.trim()).ok_or_else(|| format!("cannot parse '{}'", s)),
        _ => Err("expected a string".to_string()),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
    .or_else(|| parse_date(s).map(|date| date.and_time(NaiveTime::MIN)))
}

/// Offsets are honoured; a timestamp without one is read as UTC.
fn parse_timestamptz(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_timestamp(s).map(|naive| naive.and_utc()))
}
