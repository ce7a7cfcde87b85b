//! Argument extraction.
//!
//! Tool calls arrive as an untyped JSON object. `Arguments` reads the fields
//! one command needs and fails closed: every missing or mistyped field is a
//! `MalformedRequest` naming that field, raised before any connection is
//! touched.

use crate::error::{DbError, DbResult};
use crate::models::{Command, MAX_QUERY_TIMEOUT_SECS, QueryParam};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

/// Scalar accepted in an `arguments` array. Used only to publish the schema;
/// decoding goes through [`QueryParam::from_json`].
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ScalarArgument {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Read-only view over one call's argument object.
pub struct Arguments<'a> {
    command: Command,
    fields: &'a Map<String, JsonValue>,
    default_database: Option<&'a str>,
}

impl<'a> Arguments<'a> {
    /// `default_database` is the name used when `database` is omitted; it is
    /// only set in single-database mode.
    pub fn new(
        command: Command,
        fields: &'a Map<String, JsonValue>,
        default_database: Option<&'a str>,
    ) -> Self {
        Self {
            command,
            fields,
            default_database,
        }
    }

    fn malformed(&self, field: impl Into<String>, message: impl Into<String>) -> DbError {
        DbError::malformed(self.command, field, message)
    }

    /// Target database name.
    pub fn database(&self) -> DbResult<String> {
        match self.fields.get("database") {
            None | Some(JsonValue::Null) => match self.default_database {
                Some(name) => Ok(name.to_string()),
                None => Err(self.malformed("database", "is required")),
            },
            Some(_) => self.required_str("database"),
        }
    }

    /// A string field that must be present and non-empty.
    pub fn required_str(&self, field: &str) -> DbResult<String> {
        match self.fields.get(field) {
            None | Some(JsonValue::Null) => Err(self.malformed(field, "is required")),
            Some(JsonValue::String(s)) if s.trim().is_empty() => {
                Err(self.malformed(field, "must not be empty"))
            }
            Some(JsonValue::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.malformed(
                field,
                format!("expected a string, got {}", json_kind(other)),
            )),
        }
    }

    /// A string field that may be omitted or null. An empty string counts
    /// as omitted.
    pub fn optional_str(&self, field: &str) -> DbResult<Option<String>> {
        match self.fields.get(field) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) if s.trim().is_empty() => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.malformed(
                field,
                format!("expected a string, got {}", json_kind(other)),
            )),
        }
    }

    /// Optional per-call deadline in seconds.
    pub fn timeout_secs(&self) -> DbResult<Option<u32>> {
        let value = match self.fields.get("timeout_secs") {
            None | Some(JsonValue::Null) => return Ok(None),
            Some(value) => value,
        };
        value
            .as_u64()
            .filter(|secs| (1..=u64::from(MAX_QUERY_TIMEOUT_SECS)).contains(secs))
            .and_then(|secs| u32::try_from(secs).ok())
            .map(Some)
            .ok_or_else(|| {
                self.malformed(
                    "timeout_secs",
                    format!("must be an integer between 1 and {}", MAX_QUERY_TIMEOUT_SECS),
                )
            })
    }

    /// The flat scalar list of execute and query.
    pub fn scalar_arguments(&self) -> DbResult<Vec<QueryParam>> {
        let items = self.required_array("arguments")?;
        self.scalars(items, "arguments")
    }

    /// The statement list of a transaction.
    pub fn statements(&self) -> DbResult<Vec<String>> {
        let items = self.required_array("statements")?;
        if items.is_empty() {
            return Err(self.malformed("statements", "must contain at least one statement"));
        }
        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                JsonValue::String(s) if !s.trim().is_empty() => Ok(s.clone()),
                JsonValue::String(_) => {
                    Err(self.malformed(format!("statements[{}]", i), "must not be empty"))
                }
                other => Err(self.malformed(
                    format!("statements[{}]", i),
                    format!("expected a string, got {}", json_kind(other)),
                )),
            })
            .collect()
    }

    /// One scalar list per statement; the outer length must equal
    /// `statement_count`.
    pub fn nested_arguments(&self, statement_count: usize) -> DbResult<Vec<Vec<QueryParam>>> {
        let items = self.required_array("arguments")?;
        if items.len() != statement_count {
            return Err(self.malformed(
                "arguments",
                format!(
                    "expected {} argument lists (one per statement), got {}",
                    statement_count,
                    items.len()
                ),
            ));
        }
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let field = format!("arguments[{}]", i);
                match item {
                    JsonValue::Array(inner) => self.scalars(inner, &field),
                    other => Err(self.malformed(
                        field,
                        format!("expected an array, got {}", json_kind(other)),
                    )),
                }
            })
            .collect()
    }

    fn required_array(&self, field: &str) -> DbResult<&'a Vec<JsonValue>> {
        match self.fields.get(field) {
            None | Some(JsonValue::Null) => Err(self.malformed(field, "is required")),
            Some(JsonValue::Array(items)) => Ok(items),
            Some(other) => Err(self.malformed(
                field,
                format!("expected an array, got {}", json_kind(other)),
            )),
        }
    }

    fn scalars(&self, items: &[JsonValue], field: &str) -> DbResult<Vec<QueryParam>> {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                QueryParam::from_json(item).ok_or_else(|| {
                    self.malformed(
                        format!("{}[{}]", field, i),
                        format!("expected a scalar, got {}", json_kind(item)),
                    )
                })
            })
            .collect()
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("test input must be an object"),
        }
    }

    fn field_of(err: DbError) -> String {
        match err {
            DbError::MalformedRequest { field, .. } => field,
            other => panic!("expected MalformedRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_database_defaults_only_in_single_mode() {
        let fields = object(json!({}));
        let single = Arguments::new(Command::Query, &fields, Some("main"));
        assert_eq!(single.database().unwrap(), "main");

        let fleet = Arguments::new(Command::Query, &fields, None);
        assert_eq!(field_of(fleet.database().unwrap_err()), "database");
    }

    #[test]
    fn test_database_must_not_be_empty() {
        let fields = object(json!({"database": "  "}));
        let args = Arguments::new(Command::Execute, &fields, Some("main"));
        assert_eq!(field_of(args.database().unwrap_err()), "database");

        let fields = object(json!({"database": 3}));
        let args = Arguments::new(Command::Execute, &fields, None);
        let err = args.database().unwrap_err();
        assert!(err.to_string().contains("expected a string, got number"));
    }

    #[test]
    fn test_scalar_arguments() {
        let fields = object(json!({"arguments": [1, 2.5, "x", true, null]}));
        let args = Arguments::new(Command::Query, &fields, None);
        assert_eq!(
            args.scalar_arguments().unwrap(),
            vec![
                QueryParam::Int(1),
                QueryParam::Float(2.5),
                QueryParam::String("x".to_string()),
                QueryParam::Bool(true),
                QueryParam::Null,
            ]
        );
    }

    #[test]
    fn test_scalar_arguments_reject_nested_values() {
        let fields = object(json!({"arguments": [1, 2, {"a": 1}]}));
        let args = Arguments::new(Command::Query, &fields, None);
        assert_eq!(field_of(args.scalar_arguments().unwrap_err()), "arguments[2]");

        let fields = object(json!({}));
        let args = Arguments::new(Command::Query, &fields, None);
        assert_eq!(field_of(args.scalar_arguments().unwrap_err()), "arguments");
    }

    #[test]
    fn test_statements() {
        let fields = object(json!({"statements": []}));
        let args = Arguments::new(Command::Transaction, &fields, None);
        assert_eq!(field_of(args.statements().unwrap_err()), "statements");

        let fields = object(json!({"statements": ["SELECT 1", ""]}));
        let args = Arguments::new(Command::Transaction, &fields, None);
        assert_eq!(field_of(args.statements().unwrap_err()), "statements[1]");
    }

    #[test]
    fn test_nested_arguments_length_must_match() {
        let fields = object(json!({"arguments": [[1]]}));
        let args = Arguments::new(Command::Transaction, &fields, None);
        let err = args.nested_arguments(2).unwrap_err();
        assert!(err.to_string().contains("expected 2 argument lists"));

        let fields = object(json!({"arguments": [[1], "x"]}));
        let args = Arguments::new(Command::Transaction, &fields, None);
        assert_eq!(field_of(args.nested_arguments(2).unwrap_err()), "arguments[1]");

        let fields = object(json!({"arguments": [[], [[1]]]}));
        let args = Arguments::new(Command::Transaction, &fields, None);
        assert_eq!(field_of(args.nested_arguments(2).unwrap_err()), "arguments[1][0]");
    }

    #[test]
    fn test_timeout_secs_range() {
        let fields = object(json!({"timeout_secs": 60}));
        let args = Arguments::new(Command::Query, &fields, None);
        assert_eq!(args.timeout_secs().unwrap(), Some(60));

        for bad in [json!(0), json!(301), json!(-1), json!("10"), json!(1.5)] {
            let fields = object(json!({ "timeout_secs": bad }));
            let args = Arguments::new(Command::Query, &fields, None);
            assert_eq!(field_of(args.timeout_secs().unwrap_err()), "timeout_secs");
        }
    }

    #[test]
    fn test_optional_str() {
        let fields = object(json!({"schema": "", "other": "public", "bad": []}));
        let args = Arguments::new(Command::Schema, &fields, None);
        assert_eq!(args.optional_str("schema").unwrap(), None);
        assert_eq!(args.optional_str("missing").unwrap(), None);
        assert_eq!(args.optional_str("other").unwrap(), Some("public".to_string()));
        assert!(args.optional_str("bad").is_err());
    }
}
