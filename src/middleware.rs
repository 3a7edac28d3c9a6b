//! Middleware pipeline: request/response processing composed around a handler.
//!
//! Middleware can modify requests, short-circuit with a response, or observe
//! the result of the inner chain. `Next` threads the remaining chain through
//! to the final handler.

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{
    handler::BoxHandler,
    types::{BoxMiddleware, Request, Response},
};

pub mod body_limit;

/// Converts a type into a middleware function compatible with `Router::middleware`.
pub trait IntoMiddleware {
    fn into_middleware(
        self,
    ) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send + 'static>>
    + Clone
    + Send
    + Sync
    + 'static;
}

/// The remaining middleware chain plus the terminal handler.
pub struct Next {
    pub middlewares: Arc<Vec<BoxMiddleware>>,
    pub endpoint: Arc<BoxHandler>,
}

impl Next {
    pub async fn run(self, req: Request) -> Response {
        if let Some((mw, rest)) = self.middlewares.split_first() {
            let rest = Arc::new(rest.to_vec());
            mw(
                req,
                Next {
                    middlewares: rest,
                    endpoint: self.endpoint.clone(),
                },
            )
            .await
        } else {
            self.endpoint.call(req).await
        }
    }
}
