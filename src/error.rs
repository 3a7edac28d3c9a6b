//! Crate-wide error taxonomy and its mapping onto HTTP responses.
//!
//! Every fallible operation in the core (routing, validation, uploads, cache,
//! tasks, DI) funnels into [`CoreError`]. Handlers and middleware propagate it
//! with `?`; only the server's outermost dispatch boundary turns it into a
//! [`crate::types::Response`] via [`Responder`].

use http::StatusCode;
use thiserror::Error;

use crate::arena::ResponseArena;
use crate::responder::Responder;
use crate::types::Response;

/// A single validation failure attached to a field path.
#[derive(Debug, Clone, Error)]
#[error("{field}: {kind}")]
pub struct FieldError {
    pub field: String,
    pub kind: ValidationKind,
}

/// The specific way a field failed validation.
#[derive(Debug, Clone, Error)]
pub enum ValidationKind {
    #[error("expected type {expected}")]
    Type { expected: &'static str },
    #[error("value out of range")]
    Range,
    #[error("length out of bounds")]
    Length,
    #[error("does not match pattern")]
    Pattern,
    #[error("field is required")]
    Required,
    #[error("{0}")]
    Custom(String),
}

/// The unified error type for the Catzilla native core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to parse request: {0}")]
    Parse(String),

    #[error("route conflict: {method} {pattern} is already registered")]
    RouteConflict { method: String, pattern: String },

    #[error("no route matches {method} {path}")]
    NotFound { method: String, path: String },

    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allowed: Vec<String>,
    },

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("backpressure limit exceeded")]
    Backpressure,

    #[error("upload exceeds maximum size of {limit} bytes")]
    UploadTooLarge { limit: u64 },

    #[error("uploaded file signature does not match declared content type")]
    UploadSignatureMismatch,

    #[error("uploaded file failed virus scan")]
    UploadVirusDetected,

    #[error("cache is full")]
    CacheFull,

    #[error("dependency cycle detected: {0}")]
    Cycle(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::Parse(_) => StatusCode::BAD_REQUEST,
            CoreError::RouteConflict { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            CoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Backpressure => StatusCode::TOO_MANY_REQUESTS,
            CoreError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::UploadSignatureMismatch => StatusCode::BAD_REQUEST,
            CoreError::UploadVirusDetected => StatusCode::BAD_REQUEST,
            CoreError::CacheFull => StatusCode::INSUFFICIENT_STORAGE,
            CoreError::Cycle(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Responder for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let CoreError::MethodNotAllowed { allowed, .. } = &self {
            let mut res = (status, self.to_string()).into_response();
            let arena = ResponseArena::new();
            let allow_value = arena.alloc_str(allowed.join(", "));
            if let Ok(value) = http::HeaderValue::from_str(allow_value) {
                res.headers_mut().insert(http::header::ALLOW, value);
            }
            return res;
        }
        if let CoreError::Validation(errors) = &self {
            let body = serde_json::json!({
                "error": "validation_failed",
                "fields": errors.iter().map(|e| serde_json::json!({
                    "field": e.field,
                    "reason": e.kind.to_string(),
                })).collect::<Vec<_>>(),
            });
            let mut res = (status, body.to_string()).into_response();
            res.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            return res;
        }
        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = core::result::Result<T, CoreError>;
