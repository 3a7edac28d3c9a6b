//! Core type aliases shared across the native core.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;

use crate::{body::CoreBody, middleware::Next};

/// HTTP request type with a streaming Hyper body.
pub type Request = hyper::Request<Incoming>;

/// HTTP response type using the core's body implementation.
pub type Response = hyper::Response<CoreBody>;

/// Boxed HTTP body type used internally for response composition.
pub(crate) type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Boxed, thread-safe error type.
pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased middleware function.
pub type BoxMiddleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;
