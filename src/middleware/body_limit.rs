//! Request body size limiting middleware.
//!
//! Performs fast rejection via a declared `Content-Length` before a single
//! body byte is read. This only catches requests that announce their size;
//! chunked-transfer requests carry no `Content-Length` and pass through
//! here uncapped. The actual byte count is bounded downstream, where the
//! bytes are read: [`crate::extractors::json`] wraps the body in
//! [`http_body_util::Limited`] against `Config::max_body_bytes`, and
//! [`crate::extractors::multipart`] enforces `UploadConfig::max_file_bytes`
//! per chunk while streaming to the sink.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use http::header::CONTENT_LENGTH;

use crate::middleware::IntoMiddleware;
use crate::middleware::Next;
use crate::responder::Responder;
use crate::types::Request;
use crate::types::Response;

/// Static or request-dependent request body size limit.
pub struct BodyLimit<F>
where
    F: Fn(&Request) -> usize + Send + Sync + 'static,
{
    limit: Option<usize>,
    dynamic_limit: Option<F>,
}

impl<F> BodyLimit<F>
where
    F: Fn(&Request) -> usize + Send + Sync + 'static,
{
    pub fn new(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            dynamic_limit: None,
        }
    }

    pub fn with_dynamic_limit(f: F) -> Self {
        Self {
            limit: None,
            dynamic_limit: Some(f),
        }
    }

    pub fn new_with_dynamic(limit: usize, f: F) -> Self {
        Self {
            limit: Some(limit),
            dynamic_limit: Some(f),
        }
    }
}

impl<F> IntoMiddleware for BodyLimit<F>
where
    F: Fn(&Request) -> usize + Send + Sync + 'static,
{
    fn into_middleware(
        self,
    ) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send + 'static>>
    + Clone
    + Send
    + Sync
    + 'static {
        let static_limit = self.limit;
        let dynamic_limit = self.dynamic_limit.map(Arc::new);

        move |req: Request, next: Next| {
            let dynamic_limit = dynamic_limit.clone();

            Box::pin(async move {
                let limit = dynamic_limit
                    .as_ref()
                    .map(|f| f(&req))
                    .or(static_limit)
                    .unwrap_or(10 * 1024 * 1024);

                if let Some(len) = req
                    .headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<usize>().ok())
                    && len > limit
                {
                    return (StatusCode::PAYLOAD_TOO_LARGE, "Body exceeds allowed size")
                        .into_response();
                }

                next.run(req).await.into_response()
            })
        }
    }
}
