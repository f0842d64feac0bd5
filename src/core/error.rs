//! Error taxonomy for generated resources
//!
//! Every failure inside the request pipeline ends up as an [`ApiError`], which
//! renders as the uniform envelope `{status, title, detail?, meta?}` with the
//! numeric status mirrored on the HTTP status line.
//!
//! # Error Kinds
//!
//! - [`ErrorKind::NotAllowed`] (403): requester recognised but unauthorized, or a hook denied
//! - [`ErrorKind::MethodDisabled`] (405): operation not configured for the resource
//! - [`ErrorKind::NotFound`] (404): document or array entry absent
//! - [`ErrorKind::InvalidRequest`] (400): bad body shape, query, hook or validation failure
//! - [`ErrorKind::ServerFault`] (500): unsupported verb or unclassified handler failure
//!
//! User callbacks (hooks, query filters, response handlers) return
//! `anyhow::Result`. If the error they raise is itself an `ApiError`, it is
//! passed through unchanged, including its tracking flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use modelrouter::prelude::*;
//!
//! let hooks = Hooks::new().pre_update(|args| async move {
//!     if args.body.get("locked").is_some() {
//!         return Err(ApiError::not_allowed("Locked documents cannot change")
//!             .without_tracking()
//!             .into());
//!     }
//!     Ok(Some(args.body))
//! });
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

/// Failure kinds produced by the resource pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotAllowed,
    MethodDisabled,
    NotFound,
    InvalidRequest,
    ServerFault,
}

impl ErrorKind {
    /// HTTP status associated with this kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::NotAllowed => StatusCode::FORBIDDEN,
            ErrorKind::MethodDisabled => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::ServerFault => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured API error
///
/// Serializes as `{status, title, detail?, meta?}`. The
/// `disable_external_error_tracking` flag never reaches the wire; it only
/// controls whether the failure is reported at `warn`/`error` level.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{title}")]
pub struct ApiError {
    pub status: u16,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip)]
    pub disable_external_error_tracking: bool,
}

/// Result alias used across the pipeline
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Create an error with an arbitrary status
    pub fn new(status: StatusCode, title: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            title: title.into(),
            detail: None,
            meta: None,
            disable_external_error_tracking: false,
        }
    }

    pub fn from_kind(kind: ErrorKind, title: impl Into<String>) -> Self {
        Self::new(kind.status_code(), title)
    }

    pub fn not_allowed(title: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::NotAllowed, title)
    }

    pub fn method_disabled(title: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::MethodDisabled, title)
    }

    pub fn not_found(title: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::NotFound, title)
    }

    pub fn invalid_request(title: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::InvalidRequest, title)
    }

    pub fn server_fault(title: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::ServerFault, title)
    }

    pub fn unauthorized(title: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, title)
    }

    /// Attach a human-readable detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach machine-readable metadata
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Mark the error as expected so it is not reported to error tracking
    pub fn without_tracking(mut self) -> Self {
        self.disable_external_error_tracking = true;
        self
    }

    /// HTTP status of this error, falling back to 500 for invalid codes
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// The taxonomy kind of this error, if its status belongs to one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self.status {
            403 => Some(ErrorKind::NotAllowed),
            405 => Some(ErrorKind::MethodDisabled),
            404 => Some(ErrorKind::NotFound),
            400 => Some(ErrorKind::InvalidRequest),
            500 => Some(ErrorKind::ServerFault),
            _ => None,
        }
    }

    /// Translate a user callback failure at a stage boundary
    ///
    /// A structured `ApiError` raised by the callback is returned untouched.
    /// Anything else becomes `kind` with `title` and the error text as detail.
    pub fn from_stage(kind: ErrorKind, title: impl Into<String>, err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_error) => api_error,
            Err(other) => Self::from_kind(kind, title).with_detail(format!("{other:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if !self.disable_external_error_tracking {
            if status.is_server_error() {
                tracing::error!(
                    status = self.status,
                    title = %self.title,
                    detail = ?self.detail,
                    "request failed"
                );
            } else {
                tracing::debug!(status = self.status, title = %self.title, "request rejected");
            }
        }
        (status, Json(self)).into_response()
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors reported by a [`DocumentStore`](crate::core::store::DocumentStore)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Document {id} not found in {collection}")]
    NotFound { collection: String, id: String },

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound { id, .. } => {
                ApiError::not_found(format!("Document {id} not found"))
            }
            StoreError::Validation(messages) => {
                ApiError::invalid_request("Validation failed").with_detail(messages.join("; "))
            }
            StoreError::Backend(_) => {
                ApiError::server_fault("Storage error").with_detail(err.to_string())
            }
        }
    }
}
