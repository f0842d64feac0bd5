//! Axum extractors and middleware for generated resources
//!
//! This module provides:
//! - [`CurrentRequester`]: the requester attached to the request (or anonymous)
//! - [`JsonBody`]: a JSON body whose rejections use the API error envelope
//! - [`inject_requester`]: middleware resolving the requester through a provider

use crate::core::auth::{Requester, RequesterProvider};
use crate::core::error::ApiError;
use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;

/// Requester attached to the current request; `None` is anonymous
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentRequester(pub Option<Requester>);

impl<S> FromRequestParts<S> for CurrentRequester
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentRequester>()
            .cloned()
            .unwrap_or_default())
    }
}

/// JSON request body
///
/// Malformed bodies become a 400 `ApiError` instead of axum's plain-text
/// rejection.
#[derive(Debug, Clone)]
pub struct JsonBody(pub Value);

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| {
                ApiError::invalid_request("Invalid JSON body").with_detail(rejection.body_text())
            })?;
        Ok(JsonBody(value))
    }
}

/// Resolve the requester and store it in the request extensions
///
/// A requester already attached by an outer layer is kept as is. Provider
/// failures are answered with 401.
pub async fn inject_requester(
    State(provider): State<Arc<dyn RequesterProvider>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let already_set = parts
        .extensions
        .get::<CurrentRequester>()
        .is_some_and(|current| current.0.is_some());

    if !already_set {
        match provider.resolve(&parts).await {
            Ok(requester) => {
                parts.extensions.insert(CurrentRequester(requester));
            }
            Err(e) => {
                tracing::debug!(provider = provider.name(), error = %e, "requester rejected");
                return ApiError::unauthorized("Authentication failed")
                    .with_detail(e.to_string())
                    .without_tracking()
                    .into_response();
            }
        }
    }

    next.run(Request::from_parts(parts, body)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::HeaderRequesterProvider;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn_with_state;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    async fn whoami(CurrentRequester(requester): CurrentRequester) -> String {
        match requester {
            Some(r) if r.admin => format!("admin:{}", r.id),
            Some(r) => format!("user:{}", r.id),
            None => "anonymous".to_string(),
        }
    }

    fn app() -> Router {
        let provider: Arc<dyn RequesterProvider> = Arc::new(HeaderRequesterProvider::new());
        Router::new()
            .route("/whoami", get(whoami))
            .route("/echo", post(|JsonBody(body): JsonBody| async move { Json(body) }))
            .layer(from_fn_with_state(provider, inject_requester))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_without_headers() {
        let response = app()
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_requester_from_headers() {
        let request = Request::builder()
            .uri("/whoami")
            .header("x-requester-id", "u1")
            .header("x-requester-admin", "true")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(body_text(response).await, "admin:u1");
    }

    #[tokio::test]
    async fn test_provider_failure_is_401() {
        let request = Request::builder()
            .uri("/whoami")
            .header("x-requester-id", "")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_error_envelope() {
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["title"], "Invalid JSON body");
        assert_eq!(body["status"], 400);
    }
}
