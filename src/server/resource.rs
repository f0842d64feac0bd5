//! Resource configuration
//!
//! A [`ResourceConfig`] is the single declarative object that drives both the
//! generated handlers and the OpenAPI reflection of one model. It is built
//! once, shared behind an `Arc` and never mutated afterwards.

use crate::core::auth::{DEFAULT_OWNER_FIELD, Operation, Permission, Permissions, Requester, Role};
use crate::core::error::{ApiError, ApiResult, ErrorKind};
use crate::core::hooks::Hooks;
use crate::core::model::{FieldSchema, ModelSchema};
use crate::core::populate::{PopulateSpec, collapse_all, populate};
use crate::core::query::SortSpec;
use crate::core::store::DocumentStore;
use crate::core::transform::FieldTransformer;
use axum::Router;
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Input of a response handler
#[derive(Debug, Clone)]
pub struct ResponseArgs {
    /// Populated and read-filtered data (an array for list)
    pub data: Value,
    pub requester: Option<Requester>,
    pub operation: Operation,
}

pub type ResponseHandlerFn =
    Arc<dyn Fn(ResponseArgs) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Extra filter contributed per requester; `Ok(None)` forces an empty list
pub type QueryFilterFn = Arc<
    dyn Fn(Option<Requester>) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync,
>;

/// Declarative configuration of one resource
#[derive(Clone)]
pub struct ResourceConfig {
    pub permissions: Permissions,
    pub transformer: FieldTransformer,
    pub query_fields: Option<Vec<String>>,
    pub sort: Option<SortSpec>,
    pub populate: Vec<PopulateSpec>,
    pub hooks: Hooks,
    pub response_handler: Option<ResponseHandlerFn>,
    pub query_filter: Option<QueryFilterFn>,
    /// Additional properties documented on the response schema
    pub extra_schema_properties: IndexMap<String, FieldSchema>,
    /// Hand-written routes served ahead of the generated ones
    pub custom_routes: Option<Router>,
    pub owner_field: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            permissions: Permissions::new(),
            transformer: FieldTransformer::allow_all(),
            query_fields: None,
            sort: None,
            populate: Vec::new(),
            hooks: Hooks::new(),
            response_handler: None,
            query_filter: None,
            extra_schema_properties: IndexMap::new(),
            custom_routes: None,
            owner_field: DEFAULT_OWNER_FIELD.to_string(),
        }
    }
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the permission list of one operation
    pub fn permission(mut self, operation: Operation, permissions: Vec<Permission>) -> Self {
        self.permissions = self.permissions.allow(operation, permissions);
        self
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn transformer(mut self, transformer: FieldTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn query_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn populate(mut self, spec: PopulateSpec) -> Self {
        self.populate.push(spec);
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn response_handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ResponseArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.response_handler = Some(Arc::new(move |args| f(args).boxed()));
        self
    }

    pub fn query_filter<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Option<Requester>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.query_filter = Some(Arc::new(move |requester| f(requester).boxed()));
        self
    }

    pub fn extra_schema_property(mut self, name: impl Into<String>, field: FieldSchema) -> Self {
        self.extra_schema_properties.insert(name.into(), field);
        self
    }

    pub fn custom_routes(mut self, router: Router) -> Self {
        self.custom_routes = Some(router);
        self
    }

    pub fn owner_field(mut self, field: impl Into<String>) -> Self {
        self.owner_field = field.into();
        self
    }

    /// Check that every name in the configuration exists on the model
    pub fn validate_against(&self, model: &ModelSchema) -> anyhow::Result<()> {
        for field in self.query_fields.iter().flatten() {
            if model.field_at_path(field).is_none() {
                anyhow::bail!("query field '{field}' is not a field of {}", model.name);
            }
        }
        for spec in &self.populate {
            if model.reference_at_path(&spec.path).is_none() {
                anyhow::bail!(
                    "populate path '{}' is not a reference field of {}",
                    spec.path,
                    model.name
                );
            }
        }
        for (field, _) in self.sort.iter().flat_map(|s| s.0.iter()) {
            let system = matches!(field.as_str(), "_id" | "created" | "updated");
            if model.field_at_path(field).is_none() && !system {
                anyhow::bail!("sort field '{field}' is not a field of {}", model.name);
            }
        }
        Ok(())
    }
}

/// Everything a generated handler needs, shared as router state
pub struct ResourceContext {
    /// Mount path, e.g. `/food`
    pub path: String,
    pub model: Arc<ModelSchema>,
    pub config: Arc<ResourceConfig>,
    pub store: Arc<dyn DocumentStore>,
}

impl ResourceContext {
    pub fn new(
        path: impl Into<String>,
        model: ModelSchema,
        config: ResourceConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            path: path.into(),
            model: Arc::new(model),
            config: Arc::new(config),
            store,
        }
    }

    /// Collection name, which is also the model name
    pub fn name(&self) -> &str {
        &self.model.name
    }

    pub fn role(&self, requester: Option<&Requester>, object: Option<&Value>) -> Role {
        Role::resolve(requester, object, &self.config.owner_field)
    }

    pub fn authorize(
        &self,
        operation: Operation,
        requester: Option<&Requester>,
        object: Option<&Value>,
    ) -> ApiResult<()> {
        self.config.permissions.authorize(
            operation,
            requester,
            object,
            &self.config.owner_field,
            self.name(),
        )
    }

    /// Load a live document; soft-deleted ones are reported with `meta`
    pub async fn load(&self, id: &str) -> ApiResult<Value> {
        let doc = self
            .store
            .get(self.name(), id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Document {id} not found")))?;
        if self.model.has_soft_delete() && doc.get("deleted") == Some(&Value::Bool(true)) {
            return Err(ApiError::not_found(format!("Document {id} not found"))
                .with_detail("Document was deleted")
                .with_meta(serde_json::json!({"deleted": true})));
        }
        Ok(doc)
    }

    /// Expand configured references on a batch of documents
    pub async fn populate(&self, docs: Vec<Value>) -> ApiResult<Vec<Value>> {
        populate(self.store.as_ref(), &self.model, &self.config.populate, docs).await
    }

    pub async fn populate_one(&self, doc: Value) -> ApiResult<Value> {
        let mut docs = self.populate(vec![doc]).await?;
        docs.pop()
            .ok_or_else(|| ApiError::server_fault("Population lost the document"))
    }

    /// Undo any expansion on a body before it is written
    pub fn collapse(&self, body: &Value) -> Value {
        collapse_all(body, &self.config.populate)
    }

    /// Read-filter one document for the requester's role on it
    pub fn present(&self, requester: Option<&Requester>, doc: &Value) -> Value {
        let role = self.role(requester, Some(doc));
        self.config.transformer.filter_for_read(doc, role)
    }

    /// Run the optional query filter hook
    pub async fn query_filter(&self, requester: Option<&Requester>) -> ApiResult<Option<Value>> {
        let Some(query_filter) = &self.config.query_filter else {
            return Ok(Some(Value::Object(Default::default())));
        };
        query_filter(requester.cloned())
            .await
            .map_err(|e| ApiError::from_stage(ErrorKind::InvalidRequest, "Query filter error", e))
    }

    /// Run the optional response handler over the outgoing data
    pub async fn respond(
        &self,
        data: Value,
        requester: Option<&Requester>,
        operation: Operation,
    ) -> ApiResult<Value> {
        let Some(handler) = &self.config.response_handler else {
            return Ok(data);
        };
        handler(ResponseArgs {
            data,
            requester: requester.cloned(),
            operation,
        })
        .await
        .map_err(|e| ApiError::from_stage(ErrorKind::ServerFault, "responseHandler error", e))
    }
}
