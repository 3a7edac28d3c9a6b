//! Route definitions and path-pattern segmentation (§3 "Route", §4.2).
//!
//! A [`Route`] pairs an HTTP method and compiled [`Segment`] sequence with a
//! handler and its own middleware chain. Patterns are parsed once, at
//! registration time, into a `Vec<Segment>` that the trie in [`crate::router`]
//! consumes directly — nothing about segment kind is re-derived at lookup
//! time.

use std::{
    collections::VecDeque,
    sync::{Arc, RwLock},
};

use http::Method;

use crate::{
    handler::BoxHandler,
    middleware::Next,
    responder::Responder,
    types::{BoxMiddleware, Request},
};

/// One slash-separated element of a path pattern (§3 "Segment").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A fixed path element, matched by exact byte comparison.
    Literal(String),
    /// `{name}` or `{name:type}` — matches exactly one segment, bound to
    /// `name`. The `:type` annotation is kept only as a hint; the router
    /// never enforces it (spec §4.2, §9 open question).
    Param(String),
    /// `{name:path}` — matches the remainder of the path, including any
    /// further `/`, bound to `name` as a single string.
    PathParam(String),
    /// `*` — matches exactly one segment, unbound.
    Wildcard,
}

/// Splits a pattern like `/users/{id}/posts/{slug:path}` into its segments.
///
/// Leading/trailing slashes and empty segments (from `//`) are dropped; the
/// root pattern `/` parses to an empty segment list.
pub fn parse_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|raw| {
            if raw == "*" {
                Segment::Wildcard
            } else if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                match inner.split_once(':') {
                    Some((name, ty)) if ty == "path" => Segment::PathParam(name.to_string()),
                    Some((name, _ty)) => Segment::Param(name.to_string()),
                    None => Segment::Param(inner.to_string()),
                }
            } else {
                Segment::Literal(raw.to_string())
            }
        })
        .collect()
}

/// A registered (method, pattern, handler, middleware) tuple (§3 "Route").
pub struct Route {
    /// Original pattern text, kept for conflict messages and introspection.
    pub pattern: String,
    /// Compiled segment sequence used by the router trie.
    pub segments: Vec<Segment>,
    /// HTTP method this route responds to.
    pub method: Method,
    /// Handler function to execute when the route is matched.
    pub handler: BoxHandler,
    /// Route-specific middleware chain, run after global and group chains.
    pub middlewares: RwLock<VecDeque<BoxMiddleware>>,
    /// Whether trailing-slash redirection is enabled for this route.
    pub tsr: bool,
}

impl Route {
    /// Creates a new route, parsing `pattern` into its segment sequence.
    pub fn new(pattern: String, method: Method, handler: BoxHandler, tsr: Option<bool>) -> Self {
        let segments = parse_pattern(&pattern);
        Self {
            pattern,
            segments,
            method,
            handler,
            middlewares: RwLock::new(VecDeque::new()),
            tsr: tsr.unwrap_or(false),
        }
    }

    /// Appends middleware to this route's own chain (installed last, after
    /// global and group middleware, per §4.2).
    pub fn middleware<F, Fut, R>(&self, f: F) -> &Self
    where
        F: Fn(Request, Next) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = R> + Send + 'static,
        R: Responder + Send + 'static,
    {
        let mw: BoxMiddleware = Arc::new(move |req, next| {
            let fut = f(req, next);
            Box::pin(async move { fut.await.into_response() })
        });

        self.middlewares.write().unwrap().push_back(mw);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literal_and_param() {
        let segs = parse_pattern("/users/{id}/profile");
        assert_eq!(
            segs,
            vec![
                Segment::Literal("users".into()),
                Segment::Param("id".into()),
                Segment::Literal("profile".into()),
            ]
        );
    }

    #[test]
    fn parses_typed_param_as_plain_param() {
        let segs = parse_pattern("/users/{id:int}");
        assert_eq!(
            segs,
            vec![Segment::Literal("users".into()), Segment::Param("id".into())]
        );
    }

    #[test]
    fn parses_path_param() {
        let segs = parse_pattern("/files/{rest:path}");
        assert_eq!(
            segs,
            vec![
                Segment::Literal("files".into()),
                Segment::PathParam("rest".into()),
            ]
        );
    }

    #[test]
    fn parses_wildcard() {
        let segs = parse_pattern("/static/*");
        assert_eq!(
            segs,
            vec![Segment::Literal("static".into()), Segment::Wildcard]
        );
    }

    #[test]
    fn root_pattern_has_no_segments() {
        assert_eq!(parse_pattern("/"), Vec::new());
    }
}
