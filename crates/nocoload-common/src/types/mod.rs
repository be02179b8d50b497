//! Common types used across nocoload

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier assigned to records that carry neither `Id` nor `id`
pub const UNKNOWN_ID: &str = "unknown";

/// An untyped record as returned by the source: field name to JSON value
pub type RawRecord = Map<String, Value>;

/// A record that has passed schema validation and coercion
pub type TypedRecord = Map<String, Value>;

/// The unit persisted to a content store.
///
/// `data` never contains the promoted body field; `body` is only present when
/// the table declares a body field and the record had a truthy value for it.
///
/// # Examples
///
/// ```rust
/// use nocoload_common::types::Entry;
/// use serde_json::json;
///
/// let entry = Entry {
///     id: "1".to_string(),
///     data: json!({"Id": "1"}).as_object().cloned().unwrap_or_default(),
///     body: Some("hello".to_string()),
/// };
/// assert_eq!(entry.id, "1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,

    pub data: TypedRecord,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A file attached to a record, as found in attachment columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Storage URL (may be a relative path for local storage backends)
    #[serde(default)]
    pub url: Option<String>,

    /// Pre-signed download URL, when the source issues one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl Attachment {
    /// The URL a consumer should download from, preferring the signed URL
    pub fn download_url(&self) -> Option<&str> {
        self.signed_url.as_deref().or(self.url.as_deref())
    }
}

/// Derive a record's identity from `Id`, then `id`, falling back to [`UNKNOWN_ID`].
///
/// Strings are used verbatim; numbers and booleans use their JSON text.
pub fn record_id(record: &RawRecord) -> String {
    ["Id", "id"]
        .iter()
        .filter_map(|key| record.get(*key))
        .find(|value| !value.is_null())
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| UNKNOWN_ID.to_string())
}

/// JavaScript-style truthiness, used to decide whether a body field is set
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
