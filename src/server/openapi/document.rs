//! Serving the OpenAPI document with ETag revalidation

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use utoipa::openapi::OpenApi;
use xxhash_rust::xxh3::xxh3_64;

/// Serialized document and its entity tag, computed once at startup
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    body: Arc<[u8]>,
    etag: String,
}

impl SchemaDocument {
    pub fn new(document: &OpenApi) -> anyhow::Result<Self> {
        let body = serde_json::to_vec(document)?;
        let etag = format!("\"{:016x}\"", xxh3_64(&body));
        Ok(Self {
            body: body.into(),
            etag,
        })
    }

    /// Quoted hex of the xxh3-64 hash of the body
    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether an `If-None-Match` value names the current document
    ///
    /// Accepts lists, weak validators, `*` and unquoted tags.
    pub fn matches(&self, if_none_match: &str) -> bool {
        let bare = self.etag.trim_matches('"');
        if_none_match.split(',').map(str::trim).any(|candidate| {
            let candidate = candidate.strip_prefix("W/").unwrap_or(candidate);
            candidate == "*" || candidate.trim_matches('"') == bare
        })
    }
}

/// GET /openapi.json
pub async fn serve_document(
    State(document): State<Arc<SchemaDocument>>,
    headers: HeaderMap,
) -> Response {
    let etag = match HeaderValue::from_str(document.etag()) {
        Ok(etag) => etag,
        Err(e) => {
            tracing::error!(error = %e, "invalid etag for schema document");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let fresh = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| document.matches(value));
    if fresh {
        tracing::debug!("schema document not modified");
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::ETAG, etag),
        ],
        Body::from(document.body().to_vec()),
    )
        .into_response()
}
