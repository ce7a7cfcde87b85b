//! Command and result data models.
//!
//! Requests are produced by the parameter extractor in `tools`; results are
//! what the executors hand back to the protocol layer.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Default per-command deadline in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 30;

/// Maximum per-command deadline in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

/// Default deadline for opening and pinging one database at startup.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 10;

/// The four commands a caller can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Execute,
    Query,
    Schema,
    Transaction,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::Execute,
        Command::Query,
        Command::Schema,
        Command::Transaction,
    ];

    /// The tool name under which this command is published.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Execute => "execute_tool",
            Self::Query => "query_tool",
            Self::Schema => "schema_tool",
            Self::Transaction => "transaction_tool",
        }
    }

    pub fn from_tool_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tool_name() == name)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// A scalar argument bound positionally to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    String(String),
}

impl QueryParam {
    /// Convert a JSON scalar. Arrays and objects have no scalar form and
    /// yield `None`.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Self::Null),
            JsonValue::Bool(b) => Some(Self::Bool(*b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            JsonValue::String(s) => Some(Self::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }
}

/// A wire-safe column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ResultValue {
    /// Raw bytes are always surfaced as UTF-8 text.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Unsigned integers above `i64::MAX` keep their exact digits as text.
    pub fn from_unsigned(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => Self::Int(v),
            Err(_) => Self::Text(value.to_string()),
        }
    }

    pub fn text(value: impl fmt::Display) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<ResultValue> for JsonValue {
    fn from(value: ResultValue) -> Self {
        match value {
            ResultValue::Null => JsonValue::Null,
            ResultValue::Int(i) => JsonValue::from(i),
            // NaN and infinities have no JSON number form
            ResultValue::Float(f) => serde_json::Number::from_f64(f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            ResultValue::Bool(b) => JsonValue::Bool(b),
            ResultValue::Text(s) => JsonValue::String(s),
        }
    }
}

/// One result row; keys keep the cursor's column order.
pub type Row = serde_json::Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub database: String,
    pub statement: String,
    pub arguments: Vec<QueryParam>,
    pub timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub database: String,
    pub statement: String,
    pub arguments: Vec<QueryParam>,
    pub timeout_secs: Option<u32>,
}

/// A batch of statements that commit or roll back together.
///
/// `arguments[i]` belongs to `statements[i]`; the extractor guarantees both
/// have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub database: String,
    pub statements: Vec<String>,
    pub arguments: Vec<Vec<QueryParam>>,
    pub timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub rows_affected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

/// Per-statement outcome of a committed transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatementOutcome {
    pub statement_index: usize,
    pub rows_affected: u64,
}
