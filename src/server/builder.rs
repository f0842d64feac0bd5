//! Fluent assembly of the resource server

use super::exposure::RestExposure;
use super::openapi::{Endpoint, SchemaDocument, build_document, serve_document};
use super::registry::ResourceRegistry;
use super::resource::ResourceConfig;
use crate::config::ResourcesConfig;
use crate::core::auth::{NoRequesterProvider, RequesterProvider};
use crate::core::extractors::inject_requester;
use crate::core::model::ModelSchema;
use crate::core::store::DocumentStore;
use crate::storage::InMemoryDocumentStore;
use anyhow::Result;
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

struct PendingResource {
    path: String,
    model: ModelSchema,
    config: ResourceConfig,
}

/// Builder for creating HTTP servers with generated resource routes
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_store(InMemoryDocumentStore::new())
///     .with_requester_provider(HeaderRequesterProvider::new())
///     .register_resource("/food", food_model(), food_config())?
///     .build()?;
/// ```
pub struct ServerBuilder {
    store: Option<Arc<dyn DocumentStore>>,
    resources: Vec<PendingResource>,
    custom_routes: Vec<Router>,
    endpoints: Vec<Endpoint>,
    requester_provider: Arc<dyn RequesterProvider>,
    title: String,
    version: String,
    cors: Option<CorsLayer>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            resources: Vec::new(),
            custom_routes: Vec::new(),
            endpoints: Vec::new(),
            requester_provider: Arc::new(NoRequesterProvider),
            title: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            cors: None,
        }
    }

    /// Set the document store; an in-memory store is used otherwise
    pub fn with_store(mut self, store: impl DocumentStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Share an existing store, e.g. one a test seeds directly
    pub fn with_shared_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set how requests are mapped to a requester
    pub fn with_requester_provider(mut self, provider: impl RequesterProvider + 'static) -> Self {
        self.requester_provider = Arc::new(provider);
        self
    }

    /// Title and version reported by `/openapi.json`
    pub fn with_title(mut self, title: impl Into<String>, version: impl Into<String>) -> Self {
        self.title = title.into();
        self.version = version.into();
        self
    }

    pub fn with_cors(mut self, cors: CorsLayer) -> Self {
        self.cors = Some(cors);
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this for endpoints that are not resources, such as login or
    /// webhooks. Describe them with [`with_endpoint`](Self::with_endpoint) to
    /// have them documented.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let session = Router::new().route("/session", post(open_session).delete(close_session));
    ///
    /// let app = ServerBuilder::new()
    ///     .with_custom_routes(session)
    ///     .with_endpoint(EndpointBuilder::post("/session").tag("Session").build())
    ///     .build()?;
    /// ```
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Document a hand-written endpoint in `/openapi.json`
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Register a resource
    ///
    /// The configuration is checked against the model right away; the
    /// model is handed to the store when the router is built.
    pub fn register_resource(
        mut self,
        path: impl Into<String>,
        model: ModelSchema,
        config: ResourceConfig,
    ) -> Result<Self> {
        let path = path.into();
        if self.resources.iter().any(|r| r.path == path) {
            anyhow::bail!("a resource is already mounted at {path}");
        }
        config.validate_against(&model)?;
        self.resources.push(PendingResource { path, model, config });
        Ok(self)
    }

    /// Register every resource of a YAML configuration
    pub fn register_config(self, config: ResourcesConfig) -> Result<Self> {
        config.check()?;
        config.resources.into_iter().try_fold(self, |builder, definition| {
            let (path, model, resource) = definition.into_parts()?;
            builder.register_resource(path, model, resource)
        })
    }

    /// Build the resource registry without mounting any route
    pub fn build_registry(&mut self) -> Result<ResourceRegistry> {
        let store = self
            .store
            .get_or_insert_with(|| Arc::new(InMemoryDocumentStore::new()) as Arc<dyn DocumentStore>)
            .clone();
        let mut registry = ResourceRegistry::new();
        for resource in std::mem::take(&mut self.resources) {
            registry.register(&resource.path, resource.model, resource.config, store.clone())?;
        }
        Ok(registry)
    }

    /// Build the final router
    ///
    /// This mounts:
    /// - the generated routes of every registered resource
    /// - custom routes, served ahead of everything else
    /// - `/openapi.json`, `/health` and `/healthz`
    pub fn build(mut self) -> Result<Router> {
        let registry = self.build_registry()?;
        let resources: Vec<_> = registry.resources().cloned().collect();

        let document = build_document(&self.title, &self.version, &resources, &self.endpoints);
        let document = Arc::new(SchemaDocument::new(&document)?);
        tracing::info!(
            resources = resources.len(),
            etag = document.etag(),
            "schema document ready"
        );

        let mut router = registry
            .build_routes()
            .merge(RestExposure::health_routes())
            .merge(
                Router::new()
                    .route("/openapi.json", get(serve_document))
                    .with_state(document),
            );
        if !self.custom_routes.is_empty() {
            let custom = self
                .custom_routes
                .into_iter()
                .fold(Router::new(), |custom, routes| custom.merge(routes));
            router = RestExposure::overlay(custom, router);
        }

        let router = router
            .layer(from_fn_with_state(self.requester_provider, inject_requester))
            .layer(TraceLayer::new_for_http());
        Ok(match self.cors {
            Some(cors) => router.layer(cors),
            None => router,
        })
    }

    /// Build, bind `addr` and serve until SIGINT or SIGTERM
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(%addr, "model router listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("model router stopped");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!(signal = "SIGINT", "shutting down");
        },
        _ = terminate => {
            tracing::info!(signal = "SIGTERM", "shutting down");
        },
    }
}
