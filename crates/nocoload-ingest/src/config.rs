//! Configuration loading
//!
//! Two sources:
//!
//! - **Environment**: connection settings (`NOCODB_BASE_URL`, `NOCODB_API_KEY`,
//!   `NOCODB_TIMEOUT_SECS`), optionally from a `.env` file
//! - **Collections file**: TOML mapping collection names to table settings
//!
//! ```toml
//! [collections.posts]
//! table_id = "m4q1x8cz2b1yq7a"
//! fields = ["Id", "Title", "Body", "Cover"]
//! body_field = "Body"
//! max_retries = 5
//! retry_delay_ms = 1000
//!
//! [collections.posts.query]
//! where = "(Status,eq,Published)"
//! limit = 50
//! ```

use crate::fetcher::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS};
use crate::schema::FieldSchema;
use crate::table::{rename_mapper, TableSpec};
use indexmap::IndexMap;
use nocoload_common::{NocoError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

// ============================================================================
// Source Configuration Constants
// ============================================================================

pub const BASE_URL_VAR: &str = "NOCODB_BASE_URL";
pub const API_KEY_VAR: &str = "NOCODB_API_KEY";
pub const TIMEOUT_VAR: &str = "NOCODB_TIMEOUT_SECS";

/// Per-request HTTP timeout when `NOCODB_TIMEOUT_SECS` is unset.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the data source
#[derive(Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SourceConfig {
    /// Load `.env` (if present), then read the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read connection settings from the environment.
    ///
    /// A missing or empty base URL or API key is a configuration error.
    pub fn from_env() -> Result<Self> {
        let base_url = required_var(BASE_URL_VAR)?;
        let api_key = required_var(API_KEY_VAR)?;
        let timeout_secs = match std::env::var(TIMEOUT_VAR) {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|_| {
                NocoError::config(format!("{} must be a whole number of seconds, got '{}'", TIMEOUT_VAR, raw))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
        };
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            NocoError::config(format!("{} is not a valid URL ('{}'): {}", BASE_URL_VAR, self.base_url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(NocoError::config(format!(
                "{} must use http or https, got '{}'",
                BASE_URL_VAR,
                url.scheme()
            )));
        }

        if self.timeout.is_zero() {
            return Err(NocoError::config(format!("{} must be greater than 0", TIMEOUT_VAR)));
        }

        Ok(())
    }
}

fn required_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(NocoError::config(format!("{} is not set", name))),
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

/// Settings for one collection in the collections file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionConfig {
    pub table_id: String,

    #[serde(default)]
    pub fields: Vec<String>,

    /// Extra query parameters passed through to the records endpoint
    #[serde(default)]
    pub query: BTreeMap<String, Value>,

    #[serde(default)]
    pub body_field: Option<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Ceiling for the doubled backoff delay; unbounded when unset
    #[serde(default)]
    pub max_retry_delay_ms: Option<u64>,

    /// Field renames applied before validation (source name -> new name)
    #[serde(default)]
    pub rename: IndexMap<String, String>,

    #[serde(default)]
    pub schema: Option<FieldSchema>,
}

impl CollectionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: self.max_retry_delay_ms.map(Duration::from_millis),
        }
    }

    /// Build the table spec for collection `name`
    pub fn to_table_spec(&self, name: &str) -> TableSpec {
        let mut spec = TableSpec::new(name, self.table_id.clone())
            .with_fields(self.fields.clone())
            .with_query(self.query.clone())
            .with_retry(self.retry_policy());

        if let Some(schema) = &self.schema {
            spec = spec.with_schema(schema.clone());
        }
        if let Some(body_field) = &self.body_field {
            spec = spec.with_body_field(body_field.clone());
        }
        if !self.rename.is_empty() {
            spec.mapper = Some(rename_mapper(self.rename.clone()));
        }

        spec
    }
}

/// The collections file: collection name to table settings, in file order
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionsFile {
    #[serde(default)]
    pub collections: IndexMap<String, CollectionConfig>,
}

impl CollectionsFile {
    /// Load a collections file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NocoError::config(format!(
                "Collections file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| match e {
            NocoError::Config(msg) => NocoError::config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parse and validate collections TOML
    pub fn parse(content: &str) -> Result<Self> {
        let file: CollectionsFile = toml::from_str(content)
            .map_err(|e| NocoError::config(format!("Invalid collections file: {}", e)))?;
        file.validate()?;
        Ok(file)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            return Err(NocoError::config("No collections defined"));
        }

        for (name, collection) in &self.collections {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return Err(NocoError::config(format!("Invalid collection name '{}'", name)));
            }
            if collection.table_id.trim().is_empty() {
                return Err(NocoError::config(format!("Collection '{}' has an empty table_id", name)));
            }
            if collection.table_id.contains(['/', '\\', '?', '#', '%']) {
                return Err(NocoError::config(format!(
                    "Collection '{}' has an invalid table_id '{}'",
                    name, collection.table_id
                )));
            }
        }

        Ok(())
    }

    /// Table specs in file order, optionally restricted to `only`
    pub fn table_specs(&self, only: &[String]) -> Result<Vec<TableSpec>> {
        if let Some(unknown) = only.iter().find(|name| !self.collections.contains_key(*name)) {
            return Err(NocoError::CollectionNotFound(unknown.clone()));
        }

        Ok(self
            .collections
            .iter()
            .filter(|(name, _)| only.is_empty() || only.contains(name))
            .map(|(name, collection)| collection.to_table_spec(name))
            .collect())
    }
}
