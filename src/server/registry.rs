//! Registry of mounted resources

use crate::core::model::ModelSchema;
use crate::core::store::DocumentStore;
use crate::server::exposure::RestExposure;
use crate::server::resource::{ResourceConfig, ResourceContext};
use anyhow::Result;
use axum::Router;
use indexmap::IndexMap;
use std::sync::Arc;

/// Resources keyed by mount path, in registration order
#[derive(Default)]
pub struct ResourceRegistry {
    resources: IndexMap<String, Arc<ResourceContext>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource backed by `store`
    ///
    /// Fails when the path or model name is already taken, or when the
    /// configuration names fields the model does not have.
    pub fn register(
        &mut self,
        path: &str,
        model: ModelSchema,
        config: ResourceConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Arc<ResourceContext>> {
        if self.resources.contains_key(path) {
            anyhow::bail!("a resource is already mounted at {path}");
        }
        if self.resources.values().any(|ctx| ctx.name() == model.name) {
            anyhow::bail!("model {} is already registered", model.name);
        }
        config.validate_against(&model)?;
        store.register_model(&model)?;

        tracing::info!(model = %model.name, path, "registered resource");
        let ctx = Arc::new(ResourceContext::new(path, model, config, store));
        self.resources.insert(path.to_string(), ctx.clone());
        Ok(ctx)
    }

    pub fn get(&self, path: &str) -> Option<&Arc<ResourceContext>> {
        self.resources.get(path)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<ResourceContext>> {
        self.resources.values()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Nest every resource router under its path
    pub fn build_routes(&self) -> Router {
        self.resources.iter().fold(Router::new(), |router, (path, ctx)| {
            router.nest(path, RestExposure::resource_router(ctx.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::FieldSchema;
    use crate::storage::InMemoryDocumentStore;

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(InMemoryDocumentStore::new())
    }

    fn food() -> ModelSchema {
        ModelSchema::new("Food").field("name", FieldSchema::string())
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ResourceRegistry::new();
        registry.register("/food", food(), ResourceConfig::new(), store()).unwrap();

        assert_eq!(registry.paths(), vec!["/food"]);
        assert_eq!(registry.get("/food").unwrap().name(), "Food");
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let mut registry = ResourceRegistry::new();
        registry.register("/food", food(), ResourceConfig::new(), store()).unwrap();

        let err = registry
            .register("/food", ModelSchema::new("Meal"), ResourceConfig::new(), store())
            .err()
            .unwrap();
        assert!(err.to_string().contains("/food"));

        let err = registry
            .register("/foods", food(), ResourceConfig::new(), store())
            .err()
            .unwrap();
        assert!(err.to_string().contains("Food"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut registry = ResourceRegistry::new();
        let config = ResourceConfig::new().query_fields(["flavour"]);
        assert!(registry.register("/food", food(), config, store()).is_err());
        assert!(registry.paths().is_empty());
    }
}
