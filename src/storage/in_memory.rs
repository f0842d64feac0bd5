//! In-memory implementation of DocumentStore for testing and development

use crate::core::error::StoreError;
use crate::core::model::ModelSchema;
use crate::core::store::{DocumentStore, FindQuery, timestamp};
use crate::storage::matcher::{matches, sort_documents};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type Collections = HashMap<String, IndexMap<String, Value>>;

/// In-memory document store
///
/// Useful for testing and development. Uses RwLock for thread-safe access;
/// each call holds the lock for its whole duration, which makes single
/// document operations atomic.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    models: Arc<RwLock<HashMap<String, ModelSchema>>>,
}

fn lock_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("Failed to acquire lock: {e}"))
}

impl InMemoryDocumentStore {
    /// Create a new in-memory document store
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(&self, collection: &str, doc: &Value, partial: bool) -> Result<(), StoreError> {
        let models = self.models.read().map_err(lock_error)?;
        match models.get(collection) {
            Some(model) => model.validate(doc, partial).map_err(StoreError::Validation),
            None => Ok(()),
        }
    }

    fn not_found(collection: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn register_model(&self, model: &ModelSchema) -> Result<(), StoreError> {
        let mut models = self.models.write().map_err(lock_error)?;
        models.insert(model.name.clone(), model.clone());
        Ok(())
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().map_err(lock_error)?;
        let mut docs: Vec<Value> = collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches(doc, &query.filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        sort_documents(&mut docs, &query.sort);
        let docs = docs
            .into_iter()
            .skip(query.skip)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(docs)
    }

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64, StoreError> {
        let collections = self.collections.read().map_err(lock_error)?;
        let count = collections
            .get(collection)
            .map_or(0, |docs| docs.values().filter(|doc| matches(doc, filter)).count());
        Ok(count as u64)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().map_err(lock_error)?;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().map_err(lock_error)?;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| docs.get(id)).cloned().collect())
    }

    async fn insert(&self, collection: &str, doc: Value) -> Result<Value, StoreError> {
        let Value::Object(mut map) = doc else {
            return Err(StoreError::Validation(vec!["document must be a JSON object".into()]));
        };
        let id = match map.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        let now = timestamp();
        map.insert("_id".into(), json!(id));
        map.insert("created".into(), json!(now));
        map.insert("updated".into(), json!(now));
        let doc = Value::Object(map);
        self.validate(collection, &doc, false)?;

        let mut collections = self.collections.write().map_err(lock_error)?;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(&id) {
            return Err(StoreError::Validation(vec![format!("_id {id} already exists")]));
        }
        docs.insert(id, doc.clone());
        tracing::debug!(collection, "document inserted");
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::Validation(vec!["update must be a JSON object".into()]));
        };
        self.validate(collection, &Value::Object(patch.clone()), true)?;

        let mut collections = self.collections.write().map_err(lock_error)?;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| Self::not_found(collection, id))?;
        let Some(fields) = doc.as_object_mut() else {
            return Err(StoreError::Backend(format!("document {id} is not an object")));
        };
        for (key, value) in patch {
            if matches!(key.as_str(), "_id" | "created") {
                continue;
            }
            fields.insert(key, value);
        }
        fields.insert("updated".into(), json!(timestamp()));
        Ok(doc.clone())
    }

    async fn replace(&self, collection: &str, id: &str, doc: Value) -> Result<Value, StoreError> {
        let Value::Object(mut body) = doc else {
            return Err(StoreError::Validation(vec!["document must be a JSON object".into()]));
        };
        let mut collections = self.collections.write().map_err(lock_error)?;
        let current = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| Self::not_found(collection, id))?;

        body.insert("_id".into(), json!(id));
        body.insert(
            "created".into(),
            current.get("created").cloned().unwrap_or_else(|| json!(timestamp())),
        );
        body.insert("updated".into(), json!(timestamp()));
        let body = Value::Object(body);
        self.validate(collection, &body, false)?;

        *current = body.clone();
        Ok(body)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(lock_error)?;
        collections
            .get_mut(collection)
            .and_then(|docs| docs.shift_remove(id))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(collection, id))
    }
}
