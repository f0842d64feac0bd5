//! Persistence interface consumed by generated resources

use crate::core::error::StoreError;
use crate::core::model::ModelSchema;
use crate::core::query::SortSpec;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

/// Current time in the format stored in `created`/`updated`
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parameters of a filtered find
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    /// Mongo-style filter object; `{}` matches everything
    pub filter: Value,
    pub sort: SortSpec,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn new(filter: Value) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}

/// Document persistence
///
/// Documents are JSON objects keyed by a string `_id`. Implementations own
/// `_id`, `created` and `updated`, and guarantee atomicity per document only.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Make a model known to the store so writes can be validated
    fn register_model(&self, _model: &ModelSchema) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Value>, StoreError>;

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Fetch several documents; missing ids are skipped
    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Value>, StoreError>;

    /// Insert a new document, assigning `_id` and timestamps
    async fn insert(&self, collection: &str, doc: Value) -> Result<Value, StoreError>;

    /// Merge top-level keys of `patch` into a document and refresh `updated`
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError>;

    /// Swap the whole body of a document, keeping `_id` and `created`
    async fn replace(&self, collection: &str, id: &str, doc: Value) -> Result<Value, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}
