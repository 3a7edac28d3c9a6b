//! Routing engine: a byte-literal / param / path-param / wildcard trie with
//! deterministic "most specific wins" matching (§4.2).
//!
//! [`RouterNode`] mirrors §3's invariants directly: a map of literal
//! children, at most one param child, at most one path/wildcard child, and
//! a terminal `Method -> Route` map. [`Router::lookup`] walks the trie
//! trying literal, then param, then path-param, then wildcard at each level
//! — backtracking to the next alternative whenever a branch leads to a node
//! with no registered route, which is what gives the trie O(path length)
//! matching without a scoring pass. [`RouterGroup`] builds a prefix +
//! middleware scope that's spliced into the trie at install time, so only
//! the compiled trie exists once the server starts (§4.2 "Groups").
//!
//! # Examples
//!
//! ```rust
//! use catzilla_core::{router::Router, Method, responder::Responder, types::Request};
//!
//! async fn hello(_req: Request) -> impl Responder {
//!     "Hello, World!"
//! }
//!
//! async fn user_handler(_req: Request) -> impl Responder {
//!     "User profile"
//! }
//!
//! let mut router = Router::new();
//! router.route(Method::GET, "/", hello);
//! router.route(Method::GET, "/users/{id}", user_handler);
//!
//! router.middleware(|req, next| async move {
//!     println!("Processing request to: {}", req.uri());
//!     next.run(req).await
//! });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use hyper::Method;

use crate::{
    arena::RequestArena,
    body::CoreBody,
    error::CoreError,
    extractors::params::PathParams,
    handler::{BoxHandler, Handler},
    middleware::Next,
    responder::Responder,
    route::{Route, Segment},
    state::set_state,
    types::{BoxMiddleware, Request, Response},
};

/// One node of the routing trie (§3 "RouterNode").
#[derive(Default)]
struct RouterNode {
    literal: HashMap<String, RouterNode>,
    param: Option<(String, Box<RouterNode>)>,
    path_param: Option<(String, Box<RouterNode>)>,
    wildcard: Option<Box<RouterNode>>,
    routes: HashMap<Method, Arc<Route>>,
}

impl RouterNode {
    fn insert(
        &mut self,
        segments: &[Segment],
        method: Method,
        route: Arc<Route>,
    ) -> Result<(), CoreError> {
        let conflict = || CoreError::RouteConflict {
            method: method.to_string(),
            pattern: route.pattern.clone(),
        };

        match segments.split_first() {
            None => {
                if self.routes.contains_key(&method) {
                    return Err(conflict());
                }
                self.routes.insert(method, route);
                Ok(())
            }
            Some((Segment::Literal(lit), rest)) => {
                self.literal.entry(lit.clone()).or_default().insert(rest, method, route)
            }
            Some((Segment::Param(name), rest)) => {
                if self.param.is_none() {
                    self.param = Some((name.clone(), Box::new(RouterNode::default())));
                }
                let (existing, child) = self.param.as_mut().unwrap();
                if existing != name {
                    return Err(conflict());
                }
                child.insert(rest, method, route)
            }
            Some((Segment::PathParam(name), rest)) => {
                if !rest.is_empty() {
                    return Err(conflict());
                }
                if self.path_param.is_none() {
                    self.path_param = Some((name.clone(), Box::new(RouterNode::default())));
                }
                let (existing, child) = self.path_param.as_mut().unwrap();
                if existing != name {
                    return Err(conflict());
                }
                child.insert(&[], method, route)
            }
            Some((Segment::Wildcard, rest)) => {
                if self.wildcard.is_none() {
                    self.wildcard = Some(Box::new(RouterNode::default()));
                }
                self.wildcard.as_mut().unwrap().insert(rest, method, route)
            }
        }
    }

    /// Finds the terminal node for `segments`, trying literal, param,
    /// path-param, then wildcard children in that order at each level
    /// (§4.2 matching order) and backtracking on an empty-routes dead end.
    fn find<'n>(&'n self, segments: &[&str]) -> Option<(&'n RouterNode, Vec<(String, String)>)> {
        match segments.split_first() {
            None => {
                if self.routes.is_empty() {
                    None
                } else {
                    Some((self, Vec::new()))
                }
            }
            Some((first, rest)) => {
                if let Some(child) = self.literal.get(*first)
                    && let Some(found) = child.find(rest)
                {
                    return Some(found);
                }
                if let Some((name, child)) = &self.param
                    && let Some((node, mut params)) = child.find(rest)
                {
                    params.push((name.clone(), (*first).to_string()));
                    return Some((node, params));
                }
                if let Some((name, child)) = &self.path_param
                    && !child.routes.is_empty()
                {
                    return Some((child, vec![(name.clone(), segments.join("/"))]));
                }
                if let Some(child) = &self.wildcard
                    && let Some(found) = child.find(rest)
                {
                    return Some(found);
                }
                None
            }
        }
    }

    fn find_mut<'n>(&'n mut self, segments: &[Segment]) -> Option<&'n mut RouterNode> {
        match segments.split_first() {
            None => Some(self),
            Some((Segment::Literal(lit), rest)) => {
                self.literal.get_mut(lit).and_then(|c| c.find_mut(rest))
            }
            Some((Segment::Param(_), rest)) => {
                self.param.as_mut().and_then(|(_, c)| c.find_mut(rest))
            }
            Some((Segment::PathParam(_), _)) => {
                self.path_param.as_mut().map(|(_, c)| c.as_mut())
            }
            Some((Segment::Wildcard, rest)) => {
                self.wildcard.as_mut().and_then(|c| c.find_mut(rest))
            }
        }
    }
}

/// Outcome of [`Router::lookup`] (§4.2 `lookup(method, path)`).
pub enum Lookup {
    Matched {
        route: Arc<Route>,
        params: HashMap<String, String>,
    },
    /// The path matched a registered pattern, but not for this method.
    /// Carries the method set for the `Allow` header (§4.1, §7).
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// HTTP router: the compiled trie plus global middleware (§4.2).
///
/// # Examples
///
/// ```rust
/// use catzilla_core::{router::Router, Method, responder::Responder, types::Request};
///
/// async fn index(_req: Request) -> impl Responder {
///     "Welcome to the home page!"
/// }
///
/// async fn user_profile(_req: Request) -> impl Responder {
///     "User profile page"
/// }
///
/// let mut router = Router::new();
/// router.route(Method::GET, "/", index);
/// router.route(Method::GET, "/users/{id}", user_profile);
/// router.state("MyApp".to_string());
/// ```
pub struct Router {
    root: RouterNode,
    middlewares: RwLock<Vec<BoxMiddleware>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a new, empty router.
    pub fn new() -> Self {
        Self {
            root: RouterNode::default(),
            middlewares: RwLock::new(Vec::new()),
        }
    }

    /// Registers `(method, pattern)` with `handler` and an explicit
    /// middleware chain, failing with [`CoreError::RouteConflict`] if the
    /// same `(method, pattern)` is already registered (§4.2 `add`).
    pub fn add<H>(
        &mut self,
        method: Method,
        pattern: &str,
        handler: H,
        middleware: Vec<BoxMiddleware>,
        tsr: bool,
    ) -> Result<Arc<Route>, CoreError>
    where
        H: Handler + Clone + 'static,
    {
        let route = Arc::new(Route::new(
            pattern.to_string(),
            method.clone(),
            BoxHandler::new(handler),
            Some(tsr),
        ));
        {
            let mut guard = route.middlewares.write().unwrap();
            guard.extend(middleware);
        }
        let segments = route.segments.clone();
        self.root.insert(&segments, method, route.clone())?;
        Ok(route)
    }

    /// Convenience wrapper over [`Router::add`] for the common case of no
    /// route-specific middleware and no trailing-slash redirection. Panics
    /// on a route conflict — use [`Router::add`] directly to handle it.
    pub fn route<H>(&mut self, method: Method, path: &str, handler: H) -> Arc<Route>
    where
        H: Handler + Clone + 'static,
    {
        self.add(method, path, handler, Vec::new(), false)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Like [`Router::route`], but with trailing-slash redirection enabled:
    /// requests for the pattern with or without a trailing `/` redirect to
    /// the canonical form (§4.1 "Supplemented features").
    ///
    /// # Panics
    ///
    /// Panics if `path` is `/`, or on a route conflict.
    pub fn route_with_tsr<H>(&mut self, method: Method, path: &str, handler: H) -> Arc<Route>
    where
        H: Handler + Clone + 'static,
    {
        if path == "/" {
            panic!("cannot route with TSR for root path");
        }
        self.add(method, path, handler, Vec::new(), true)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Removes a previously registered `(method, pattern)`. Returns `true`
    /// if a route was removed.
    ///
    /// Not concurrent-safe with `lookup` — a setup-time operation (§5).
    pub fn remove(&mut self, method: &Method, pattern: &str) -> bool {
        let segments = crate::route::parse_pattern(pattern);
        match self.root.find_mut(&segments) {
            Some(node) => node.routes.remove(method).is_some(),
            None => false,
        }
    }

    /// Matches `(method, path)` against the trie (§4.2 `lookup`).
    ///
    /// Read-only and safe to call concurrently with other lookups (§5).
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match self.root.find(&segments) {
            Some((node, params)) => match node.routes.get(method) {
                Some(route) => Lookup::Matched {
                    route: route.clone(),
                    params: params.into_iter().collect(),
                },
                None => {
                    let mut allowed: Vec<Method> = node.routes.keys().cloned().collect();
                    allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                    Lookup::MethodNotAllowed(allowed)
                }
            },
            None => Lookup::NotFound,
        }
    }

    fn tsr_redirect(&self, method: &Method, path: &str) -> Option<Response> {
        let alt = if path.ends_with('/') {
            path.trim_end_matches('/').to_string()
        } else {
            format!("{path}/")
        };
        if let Lookup::Matched { route, .. } = self.lookup(method, &alt)
            && route.tsr
        {
            return Some(
                hyper::Response::builder()
                    .status(http::StatusCode::TEMPORARY_REDIRECT)
                    .header("Location", alt)
                    .body(CoreBody::empty())
                    .unwrap(),
            );
        }
        None
    }

    /// Dispatches an incoming request: matches it against the trie, builds
    /// the global-then-route middleware chain, and runs it to completion
    /// (§4.1 dispatch semantics).
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use catzilla_core::{router::Router, Method, types::Request, body::CoreBody};
    ///
    /// # async fn example() {
    /// let mut router = Router::new();
    /// router.route(Method::GET, "/users/{id}", |_req| async { "User page" });
    ///
    /// let request = Request::builder()
    ///     .method(Method::GET)
    ///     .uri("/users/123")
    ///     .body(CoreBody::empty())
    ///     .unwrap();
    ///
    /// let response = router.dispatch(request).await;
    /// assert_eq!(response.status(), 200);
    /// # }
    /// ```
    pub async fn dispatch(&self, mut req: Request) -> Response {
        // Per-request arena (§4.9): the trie walk and the common matched
        // path only ever need a borrowed view of the request path, so they
        // never pay for an owned `String`. Only the (cold) error branches
        // below, which hand an owned path to `CoreError`, copy out of it.
        let arena = RequestArena::new();
        let method = req.method().clone();
        let path = arena.alloc_str(req.uri().path().to_string());

        match self.lookup(&method, path) {
            Lookup::Matched { route, params } => {
                if !params.is_empty() {
                    req.extensions_mut().insert(PathParams(params));
                }

                let g_mws = self.middlewares.read().unwrap().clone();
                let r_mws: Vec<BoxMiddleware> =
                    route.middlewares.read().unwrap().iter().cloned().collect();
                let mut chain = g_mws;
                chain.extend(r_mws);

                let next = Next {
                    middlewares: Arc::new(chain),
                    endpoint: Arc::new(route.handler.clone()),
                };
                next.run(req).await
            }
            Lookup::MethodNotAllowed(allowed) => {
                if let Some(redirect) = self.tsr_redirect(&method, path) {
                    return redirect;
                }
                CoreError::MethodNotAllowed {
                    method: method.to_string(),
                    path: path.to_string(),
                    allowed: allowed.iter().map(|m| m.to_string()).collect(),
                }
                .into_response()
            }
            Lookup::NotFound => {
                if let Some(redirect) = self.tsr_redirect(&method, path) {
                    return redirect;
                }
                CoreError::NotFound {
                    method: method.to_string(),
                    path: path.to_string(),
                }
                .into_response()
            }
        }
    }

    /// Stores a value in the process-wide state store, retrievable by
    /// handlers via the `State<T>` extractor (§4.6 design note: "Global
    /// mutable state").
    pub fn state<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        set_state(value);
    }

    /// Adds global middleware, run before any group or route middleware.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use catzilla_core::{router::Router, middleware::Next, types::Request};
    ///
    /// let mut router = Router::new();
    ///
    /// router.middleware(|req, next| async move {
    ///     println!("Request: {} {}", req.method(), req.uri());
    ///     next.run(req).await
    /// });
    /// ```
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

        self.middlewares.write().unwrap().push(mw);
        self
    }

    /// Splices a [`RouterGroup`]'s routes into this router, concatenating
    /// the group's prefix and middleware with anything it inherits from
    /// nested parent groups (§4.2 "Groups").
    pub fn install_group(&mut self, group: RouterGroup) -> Result<(), CoreError> {
        group.install(self, "", &[])
    }
}

fn join_prefix(a: &str, b: &str) -> String {
    let a = a.trim_end_matches('/');
    let b = b.trim_start_matches('/');
    if b.is_empty() {
        if a.is_empty() { "/".to_string() } else { a.to_string() }
    } else if a.is_empty() {
        format!("/{b}")
    } else {
        format!("{a}/{b}")
    }
}

struct PendingRoute {
    method: Method,
    path: String,
    handler: BoxHandler,
    middleware: Vec<BoxMiddleware>,
    tsr: bool,
}

/// A builder for a group of routes sharing a path prefix and default
/// middleware chain, with support for nested sub-groups (§4.2 "Groups").
///
/// Installing a group into a [`Router`] via [`Router::install_group`]
/// splices its routes into the trie with the group's prefix concatenated
/// onto each path, and the group's middleware concatenated onto each
/// route's chain ahead of any route-specific middleware. Group nesting is
/// purely structural: once installed, only the compiled trie exists.
pub struct RouterGroup {
    prefix: String,
    middlewares: Vec<BoxMiddleware>,
    routes: Vec<PendingRoute>,
    groups: Vec<RouterGroup>,
}

impl RouterGroup {
    /// Creates a new group rooted at `prefix` (e.g. `"/api/v1"`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            middlewares: Vec::new(),
            routes: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Registers a route relative to this group's prefix.
    pub fn route<H>(&mut self, method: Method, path: &str, handler: H) -> &mut Self
    where
        H: Handler + Clone + 'static,
    {
        self.routes.push(PendingRoute {
            method,
            path: path.to_string(),
            handler: BoxHandler::new(handler),
            middleware: Vec::new(),
            tsr: false,
        });
        self
    }

    /// Adds middleware applied to every route in this group (and its
    /// nested sub-groups), after the router's global middleware.
    pub fn middleware<F, Fut, R>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Request, Next) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = R> + Send + 'static,
        R: Responder + Send + 'static,
    {
        let mw: BoxMiddleware = Arc::new(move |req, next| {
            let fut = f(req, next);
            Box::pin(async move { fut.await.into_response() })
        });
        self.middlewares.push(mw);
        self
    }

    /// Nests a sub-group under this one; the sub-group's prefix is
    /// concatenated onto this group's prefix at install time.
    pub fn group(&mut self, sub: RouterGroup) -> &mut Self {
        self.groups.push(sub);
        self
    }

    fn install(
        self,
        router: &mut Router,
        inherited_prefix: &str,
        inherited_mw: &[BoxMiddleware],
    ) -> Result<(), CoreError> {
        let prefix = join_prefix(inherited_prefix, &self.prefix);
        let mut chain = inherited_mw.to_vec();
        chain.extend(self.middlewares.iter().cloned());

        for pending in self.routes {
            let full_path = join_prefix(&prefix, &pending.path);
            let mut route_chain = chain.clone();
            route_chain.extend(pending.middleware);
            let route = Arc::new(Route::new(
                full_path.clone(),
                pending.method.clone(),
                pending.handler,
                Some(pending.tsr),
            ));
            {
                let mut guard = route.middlewares.write().unwrap();
                guard.extend(route_chain);
            }
            let segments = route.segments.clone();
            router.root.insert(&segments, pending.method, route)?;
        }

        for sub in self.groups {
            sub.install(router, &prefix, &chain)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok(_req: Request) -> &'static str {
        "ok"
    }

    // S1: literal beats param; param binds the id.
    #[test]
    fn literal_beats_param() {
        let mut router = Router::new();
        router.route(Method::GET, "/users/{id}", ok);
        router.route(Method::GET, "/users/me", ok);

        match router.lookup(&Method::GET, "/users/me") {
            Lookup::Matched { route, params } => {
                assert_eq!(route.pattern, "/users/me");
                assert!(params.is_empty());
            }
            _ => panic!("expected match"),
        }

        match router.lookup(&Method::GET, "/users/42") {
            Lookup::Matched { route, params } => {
                assert_eq!(route.pattern, "/users/{id}");
                assert_eq!(params.get("id"), Some(&"42".to_string()));
            }
            _ => panic!("expected match"),
        }
    }

    // S2: path-param consumes the remainder including slashes.
    #[test]
    fn path_param_consumes_rest() {
        let mut router = Router::new();
        router.route(Method::GET, "/files/{path:path}", ok);

        match router.lookup(&Method::GET, "/files/a/b/c.txt") {
            Lookup::Matched { params, .. } => {
                assert_eq!(params.get("path"), Some(&"a/b/c.txt".to_string()));
            }
            _ => panic!("expected match"),
        }
    }

    // S3: method mismatch on a matching path reports 405 with Allow.
    #[test]
    fn method_mismatch_reports_allowed_set() {
        let mut router = Router::new();
        router.route(Method::GET, "/x", ok);
        router.route(Method::POST, "/x", ok);

        match router.lookup(&Method::PUT, "/x") {
            Lookup::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, vec![Method::GET, Method::POST]);
            }
            _ => panic!("expected method not allowed"),
        }
    }

    #[test]
    fn unknown_path_is_not_found() {
        let mut router = Router::new();
        router.route(Method::GET, "/x", ok);
        assert!(matches!(
            router.lookup(&Method::GET, "/y"),
            Lookup::NotFound
        ));
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let mut router = Router::new();
        router.route(Method::GET, "/a", ok);
        let err = router.add(Method::GET, "/a", ok, Vec::new(), false);
        assert!(matches!(err, Err(CoreError::RouteConflict { .. })));
    }

    #[test]
    fn lookup_is_order_independent() {
        let mut forward = Router::new();
        forward.route(Method::GET, "/users/{id}", ok);
        forward.route(Method::GET, "/users/me", ok);

        let mut backward = Router::new();
        backward.route(Method::GET, "/users/me", ok);
        backward.route(Method::GET, "/users/{id}", ok);

        for r in ["/users/me", "/users/42"] {
            let a = match forward.lookup(&Method::GET, r) {
                Lookup::Matched { route, .. } => route.pattern.clone(),
                _ => panic!("expected match"),
            };
            let b = match backward.lookup(&Method::GET, r) {
                Lookup::Matched { route, .. } => route.pattern.clone(),
                _ => panic!("expected match"),
            };
            assert_eq!(a, b);
        }
    }

    #[test]
    fn groups_splice_prefix_and_middleware() {
        let mut router = Router::new();
        let mut api = RouterGroup::new("/api");
        api.route(Method::GET, "/users", ok);
        let mut v1 = RouterGroup::new("/v1");
        v1.route(Method::GET, "/ping", ok);
        api.group(v1);
        router.install_group(api).unwrap();

        assert!(matches!(
            router.lookup(&Method::GET, "/api/users"),
            Lookup::Matched { .. }
        ));
        assert!(matches!(
            router.lookup(&Method::GET, "/api/v1/ping"),
            Lookup::Matched { .. }
        ));
    }

    #[test]
    fn remove_drops_the_route() {
        let mut router = Router::new();
        router.route(Method::GET, "/a", ok);
        assert!(router.remove(&Method::GET, "/a"));
        assert!(matches!(
            router.lookup(&Method::GET, "/a"),
            Lookup::NotFound
        ));
    }
}
