//! HTTP server core: acceptor, per-connection lifecycle, and dispatch (§4.1).
//!
//! `run` accepts connections on a plain `TcpListener` and serves each one
//! with `hyper::server::conn::http1`, dispatching every request through the
//! [`Router`]. TLS termination is explicitly out of scope (§1 non-goals) —
//! callers front this with a TLS-terminating proxy or layer their own
//! acceptor. Tracing is initialized once per process (idempotent via
//! [`OnceLock`]) with a `connection` span per accepted socket and a
//! `request` span per dispatched request, per `SPEC_FULL.md`'s logging
//! section.
//!
//! # Examples
//!
//! ```rust,no_run
//! use catzilla_core::{serve, router::Router, Method, responder::Responder, types::Request};
//! use tokio::net::TcpListener;
//!
//! async fn hello(_: Request) -> impl Responder {
//!     "Hello, World!".into_response()
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! let mut router = Router::new();
//! router.route(Method::GET, "/", hello);
//! serve(listener, router).await;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use hyper::{server::conn::http1, service::service_fn};
use tokio::net::TcpListener;
use tracing::Instrument;

use crate::config::Config;
use crate::middleware::IntoMiddleware;
use crate::middleware::body_limit::BodyLimit;
use crate::router::Router;
use crate::types::{BoxError, Request};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

fn init_tracing_once() {
    TRACING_INIT.get_or_init(crate::tracing::init_tracing);
}

/// Starts the HTTP server with the given listener and router, using
/// [`Config::default`].
///
/// # Examples
///
/// ```rust,no_run
/// use catzilla_core::{serve, router::Router};
/// use tokio::net::TcpListener;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let listener = TcpListener::bind("127.0.0.1:8080").await?;
/// let router = Router::new();
/// serve(listener, router).await;
/// # Ok(())
/// # }
/// ```
pub async fn serve(listener: TcpListener, router: Router) {
    serve_with_config(listener, router, Config::default()).await
}

/// Starts the HTTP server with an explicit [`Config`]: installs the
/// `max_body_bytes` cap as global middleware, initializes tracing, and
/// enters the accept loop.
pub async fn serve_with_config(listener: TcpListener, mut router: Router, config: Config) {
    router.middleware(
        BodyLimit::<fn(&Request) -> usize>::new(config.max_body_bytes as usize)
            .into_middleware(),
    );

    // Extractors (json, multipart) have no direct handle on `Config`; publish
    // it through the global state store so `max_body_bytes` and `upload` are
    // reachable from wherever bytes are actually consumed.
    crate::state::set_state(config.clone());
    crate::state::set_state(config.upload.clone());

    if let Err(err) = run(listener, router, &config).await {
        tracing::error!(error = %err, "server loop terminated");
    }
}

async fn run(listener: TcpListener, router: Router, config: &Config) -> Result<(), BoxError> {
    init_tracing_once();

    let router = Arc::new(router);
    let keepalive = config.keepalive;
    let max_header_bytes = config.max_header_bytes;

    tracing::info!(addr = %listener.local_addr()?, "catzilla core listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let router = router.clone();

        tokio::spawn(
            async move {
                let svc = service_fn(move |mut req: hyper::Request<_>| {
                    let router = router.clone();
                    req.extensions_mut().insert(addr);

                    let method = req.method().clone();
                    let path = req.uri().path().to_string();
                    let span = tracing::info_span!(
                        "request",
                        %method,
                        %path,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    );

                    async move {
                        let started = Instant::now();
                        let response = router.dispatch(req).await;
                        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                        let status = response.status();

                        tracing::Span::current().record("status", status.as_u16() as u64);
                        tracing::Span::current().record("latency_ms", latency_ms);

                        if status.is_server_error() {
                            tracing::error!(%method, %path, %status, latency_ms, "request failed");
                        } else {
                            tracing::debug!(%method, %path, %status, latency_ms, "request completed");
                        }

                        Ok::<_, Infallible>(response)
                    }
                    .instrument(span)
                });

                // `max_buf_size` bounds the connection's read buffer, so
                // oversized headers abort the parse and close the connection
                // before a `Request` exists to answer with a clean 413 —
                // hyper surfaces this as the connection error logged below.
                let mut http = http1::Builder::new();
                http.keep_alive(keepalive);
                http.max_buf_size(max_header_bytes);
                let conn = http.serve_connection(io, svc).with_upgrades();

                if let Err(err) = conn.await {
                    tracing::warn!(error = %err, "connection error");
                }
            }
            .instrument(tracing::info_span!("connection", peer = %addr)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::Responder;

    async fn hello(_req: Request) -> impl Responder {
        "hello"
    }

    #[tokio::test]
    async fn serves_a_bound_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut router = Router::new();
        router.route(crate::Method::GET, "/", hello);

        let server = tokio::spawn(serve(listener, router));

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut stream = stream;
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.starts_with("HTTP/1.1 200"));
        assert!(text.ends_with("hello"));

        server.abort();
    }
}
