//! Record validation
//!
//! The pipeline only depends on the [`Schema`] trait. [`FieldSchema`] is the
//! declarative implementation configured from the collections file; callers
//! embedding the library can supply their own validator, including a plain
//! closure.

use indexmap::IndexMap;
use nocoload_common::types::{Attachment, RawRecord, TypedRecord};
use serde::Deserialize;
use serde_json::{Number, Value};
use thiserror::Error;

/// Why a record was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        actual: String,
    },

    #[error("unexpected field '{0}'")]
    UnknownField(String),

    #[error("{0}")]
    Invalid(String),
}

/// Validates and coerces a raw record into its typed form
pub trait Schema: Send + Sync {
    fn validate(&self, record: &RawRecord) -> Result<TypedRecord, ValidationError>;
}

impl<F> Schema for F
where
    F: Fn(&RawRecord) -> Result<TypedRecord, ValidationError> + Send + Sync,
{
    fn validate(&self, record: &RawRecord) -> Result<TypedRecord, ValidationError> {
        self(record)
    }
}

/// Accepts every record unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl Schema for PassThrough {
    fn validate(&self, record: &RawRecord) -> Result<TypedRecord, ValidationError> {
        Ok(record.clone())
    }
}

/// Column type in a [`FieldSchema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    /// Array of `{url, signedUrl?, title?, mimetype?}` objects
    Attachments,
    /// Any JSON value
    Json,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Attachments => "attachments",
            FieldKind::Json => "json",
        };
        f.write_str(name)
    }
}

/// One column of a [`FieldSchema`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldKind,

    #[serde(default)]
    pub required: bool,

    /// Inserted when the field is absent or null
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Declarative schema: typed columns, coerced where the conversion is lossless
///
/// ```toml
/// [collections.posts.schema]
/// deny_unknown = false
///
/// [collections.posts.schema.fields]
/// Title = { type = "string", required = true }
/// Views = { type = "integer", default = 0 }
/// Cover = { type = "attachments" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSchema {
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,

    /// Reject records carrying fields not listed in `fields`
    #[serde(default)]
    pub deny_unknown: bool,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn deny_unknown(mut self) -> Self {
        self.deny_unknown = true;
        self
    }
}

impl Schema for FieldSchema {
    fn validate(&self, record: &RawRecord) -> Result<TypedRecord, ValidationError> {
        let mut typed = TypedRecord::new();

        for (name, value) in record {
            match self.fields.get(name) {
                Some(_) if value.is_null() => {},
                Some(spec) => {
                    typed.insert(name.clone(), coerce(name, spec.kind, value)?);
                },
                None if self.deny_unknown => {
                    return Err(ValidationError::UnknownField(name.clone()));
                },
                None => {
                    typed.insert(name.clone(), value.clone());
                },
            }
        }

        for (name, spec) in &self.fields {
            if typed.contains_key(name) {
                continue;
            }
            match (&spec.default, spec.required) {
                (Some(default), _) => {
                    typed.insert(name.clone(), coerce(name, spec.kind, default)?);
                },
                (None, true) => return Err(ValidationError::MissingField(name.clone())),
                (None, false) => {
                    if record.contains_key(name) {
                        typed.insert(name.clone(), Value::Null);
                    }
                },
            }
        }

        Ok(typed)
    }
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

fn coerce(field: &str, kind: FieldKind, value: &Value) -> Result<Value, ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        field: field.to_string(),
        expected: kind,
        actual: type_name(value),
    };

    match (kind, value) {
        (FieldKind::Json, v) => Ok(v.clone()),

        (FieldKind::String, Value::String(_)) => Ok(value.clone()),
        (FieldKind::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (FieldKind::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

        (FieldKind::Number, Value::Number(_)) => Ok(value.clone()),
        (FieldKind::Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(mismatch),

        (FieldKind::Integer, Value::Number(n)) => n
            .as_i64()
            .map(Value::from)
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| Value::from(f as i64))
            })
            .ok_or_else(mismatch),
        (FieldKind::Integer, Value::String(s)) => {
            s.trim().parse::<i64>().map(Value::from).map_err(|_| mismatch())
        },

        (FieldKind::Boolean, Value::Bool(_)) => Ok(value.clone()),
        (FieldKind::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Value::Bool(true)),
            "false" | "0" | "no" => Ok(Value::Bool(false)),
            _ => Err(mismatch()),
        },
        (FieldKind::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(mismatch()),
        },

        (FieldKind::Attachments, Value::Array(items)) => coerce_attachments(field, items),
        // Some column types deliver attachments as a JSON-encoded string
        (FieldKind::Attachments, Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => coerce_attachments(field, &items),
            _ => Err(mismatch()),
        },

        _ => Err(mismatch()),
    }
}

fn coerce_attachments(field: &str, items: &[Value]) -> Result<Value, ValidationError> {
    let mut attachments = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let attachment: Attachment = serde_json::from_value(item.clone()).map_err(|e| {
            ValidationError::Invalid(format!("field '{}' attachment {}: {}", field, index, e))
        })?;
        if attachment.download_url().is_none() {
            return Err(ValidationError::Invalid(format!(
                "field '{}' attachment {} has neither url nor signedUrl",
                field, index
            )));
        }
        attachments.push(attachment);
    }

    serde_json::to_value(attachments).map_err(|e| ValidationError::Invalid(e.to_string()))
}
