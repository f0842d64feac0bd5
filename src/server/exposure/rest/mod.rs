//! REST exposure of generated resources
//!
//! Each resource gets its own sub-router, nested under its mount path:
//!
//! ```text
//! GET    /food                          list
//! POST   /food                          create
//! GET    /food/{id}                     read
//! PATCH  /food/{id}                     update
//! DELETE /food/{id}                     delete
//! POST   /food/{id}/{field}             append to an array field
//! PATCH  /food/{id}/{field}/{item}      update an array entry
//! DELETE /food/{id}/{field}/{item}      remove an array entry
//! ```
//!
//! Any other verb on those paths answers 500 "<VERB> is not supported.".
//!
//! A resource's custom router is consulted first. Requests it has no route
//! for, or whose verb its matching route does not handle, continue to the
//! generated routes.

pub mod array;
pub mod handlers;

use crate::core::extractors::CurrentRequester;
use crate::server::resource::ResourceContext;
use axum::extract::{OriginalUri, Request};
use axum::http::Extensions;
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

/// Router factory for generated resources
pub struct RestExposure;

impl RestExposure {
    /// Build the generated router of one resource (not yet nested)
    ///
    /// Hand-written routes from the configuration take precedence, down to
    /// the individual verb: a custom `GET /{id}` replaces the generated read
    /// while `PATCH /{id}` still reaches the generated update.
    pub fn resource_router(ctx: Arc<ResourceContext>) -> Router {
        let generated = Router::new()
            .route(
                "/",
                get(handlers::list)
                    .post(handlers::create)
                    .fallback(handlers::unsupported_verb),
            )
            .route(
                "/{id}",
                get(handlers::read)
                    .patch(handlers::update)
                    .delete(handlers::remove)
                    .fallback(handlers::unsupported_verb),
            )
            .route(
                "/{id}/{field}",
                post(array::append).fallback(handlers::unsupported_verb),
            )
            .route(
                "/{id}/{field}/{item}",
                patch(array::update_entry)
                    .delete(array::remove_entry)
                    .fallback(handlers::unsupported_verb),
            )
            .with_state(ctx.clone());

        match &ctx.config.custom_routes {
            Some(custom) => Self::overlay(custom.clone(), generated),
            None => generated,
        }
    }

    /// Serve `custom` first and let `underneath` answer whatever it leaves
    /// unrouted, including verbs a matching custom path does not handle
    pub fn overlay(custom: Router, underneath: Router) -> Router {
        let passthrough = underneath.clone();
        custom
            .method_not_allowed_fallback(move |req: Request| forward(passthrough.clone(), req))
            .fallback_service(underneath)
    }

    /// `/health` and `/healthz`
    pub fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "model-router"
        }))
    }
}

/// Hand a request the custom router matched by path, but not by verb, to the
/// generated routes
///
/// Path parameters captured by the custom route would otherwise be appended
/// to the ones the generated route captures, so only the requester and the
/// original URI travel along.
async fn forward(generated: Router, req: Request) -> Response {
    let (mut parts, body) = req.into_parts();
    let mut extensions = Extensions::new();
    if let Some(requester) = parts.extensions.remove::<CurrentRequester>() {
        extensions.insert(requester);
    }
    if let Some(uri) = parts.extensions.remove::<OriginalUri>() {
        extensions.insert(uri);
    }
    parts.extensions = extensions;

    match generated.oneshot(Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}
