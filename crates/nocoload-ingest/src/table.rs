//! Per-collection table specification

use crate::fetcher::{FetchError, FetchRequest, RetryPolicy};
use crate::schema::{PassThrough, Schema};
use indexmap::IndexMap;
use nocoload_common::types::RawRecord;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Record transform applied before identity assignment and validation
pub type Mapper = Arc<dyn Fn(RawRecord) -> RawRecord + Send + Sync>;

/// How one collection is read from its source table and shaped into entries
#[derive(Clone)]
pub struct TableSpec {
    /// Collection name in the destination store
    pub name: String,

    /// Source table identifier
    pub table_id: String,

    pub schema: Arc<dyn Schema>,

    pub mapper: Option<Mapper>,

    /// Field promoted out of `data` into the entry body
    pub body_field: Option<String>,

    pub fields: Vec<String>,

    pub query: BTreeMap<String, Value>,

    pub retry: RetryPolicy,
}

impl std::fmt::Debug for TableSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSpec")
            .field("name", &self.name)
            .field("table_id", &self.table_id)
            .field("mapper", &self.mapper.is_some())
            .field("body_field", &self.body_field)
            .field("fields", &self.fields)
            .field("query", &self.query)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl TableSpec {
    /// A spec that accepts every record as-is
    pub fn new(name: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_id: table_id.into(),
            schema: Arc::new(PassThrough),
            mapper: None,
            body_field: None,
            fields: Vec::new(),
            query: BTreeMap::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_schema(mut self, schema: impl Schema + 'static) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    pub fn with_mapper(
        mut self,
        mapper: impl Fn(RawRecord) -> RawRecord + Send + Sync + 'static,
    ) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    pub fn with_body_field(mut self, field: impl Into<String>) -> Self {
        self.body_field = Some(field.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_query(mut self, query: BTreeMap<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The fetch request for this table against `base_url`
    pub fn fetch_request(&self, base_url: &str, token: &str) -> Result<FetchRequest, FetchError> {
        Ok(FetchRequest::for_table(base_url, &self.table_id, token)?
            .with_query(self.query.clone())
            .with_fields(self.fields.clone())
            .with_retry(self.retry))
    }
}

/// A mapper that renames fields, keeping their position; missing sources are ignored
pub fn rename_mapper(renames: IndexMap<String, String>) -> Mapper {
    Arc::new(move |record: RawRecord| {
        record
            .into_iter()
            .map(|(key, value)| match renames.get(&key) {
                Some(target) => (target.clone(), value),
                None => (key, value),
            })
            .collect()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetch_request_carries_table_settings() {
        let mut query = BTreeMap::new();
        query.insert("sort".to_string(), json!("-CreatedAt"));

        let spec = TableSpec::new("posts", "m1x2y3")
            .with_fields(vec!["Title".to_string()])
            .with_query(query);
        let request = spec.fetch_request("https://noco.test/", "tok").unwrap();

        assert_eq!(request.endpoint.as_str(), "https://noco.test/api/v2/tables/m1x2y3/records");
        assert_eq!(request.fields, vec!["Title".to_string()]);
        assert_eq!(request.query["sort"], json!("-CreatedAt"));
    }

    #[test]
    fn test_rename_mapper() {
        let mut renames = IndexMap::new();
        renames.insert("Body".to_string(), "content".to_string());
        let mapper = rename_mapper(renames);

        let mapped = mapper(json!({"Id": 1, "Body": "text"}).as_object().cloned().unwrap());
        assert_eq!(mapped.get("content"), Some(&json!("text")));
        assert!(!mapped.contains_key("Body"));
        assert_eq!(mapped.keys().next().map(String::as_str), Some("Id"));
    }
}
