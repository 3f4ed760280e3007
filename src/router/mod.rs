//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! [`Router`] dispatches a request to the first registered route whose method
//! and pattern both match. Three pattern styles are supported:
//!
//! | Pattern                    | Example match                  | Captured params       |
//! |----------------------------|--------------------------------|-----------------------|
//! | `/movies`                  | `/movies`                      | *(none)*              |
//! | `/movies/:movieId`         | `/movies/42`                   | `movieId → "42"`      |
//! | `/uploads/*`               | `/uploads/posters/1.jpg`       | `wildcard → "/posters/1.jpg"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths.
//!
//! Every route carries its own middleware stack (the response cache and the
//! write invalidation hook are attached per route), wrapped by any router-wide
//! layers added with [`Router::layer`].

use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::middleware::{MiddlewareHandler, Next, ResponseFuture};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler that turns a [`Context`] into a [`Response`].
///
/// Stored behind `Arc<dyn Fn(…)>` so it can be shared across tasks. Use the
/// method helpers on [`Router`] rather than building one by hand.
pub type Handler = Arc<dyn Fn(Context) -> ResponseFuture + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait through the blanket impl.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> ResponseFuture;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> ResponseFuture {
        Box::pin((self)(ctx))
    }
}

/// Erases a concrete handler into a [`Handler`].
pub fn handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    // `/*` suffix → Wildcard, any `:` → Parameterized, otherwise Exact.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_string());
                        }
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => {
                let suffix = path.strip_prefix(prefix.as_str())?;
                // The prefix has to end on a segment boundary.
                if !suffix.is_empty() && !suffix.starts_with('/') {
                    return None;
                }
                let mut params = PathParams::new();
                params.insert("wildcard".to_string(), suffix.to_string());
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    middlewares: Arc<[MiddlewareHandler]>,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router.
///
/// Routes are evaluated in registration order; an unmatched request gets
/// `404 Not Found`.
///
/// # Examples
///
/// ```rust,no_run
/// use marquee::{Router, Response, StatusCode};
/// use marquee::cache::Cache;
/// use marquee::context::Context;
///
/// # async fn example(cache: Cache) {
/// let mut router = Router::new();
///
/// router.get_with("/movies", [cache.layer(Some(120))], |_ctx: Context| async {
///     Response::new(StatusCode::Ok).body("[]")
/// });
///
/// router.get("/movies/:movieId", |ctx: Context| async move {
///     let id = ctx.params().get("movieId").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// # }
/// ```
pub struct Router {
    routes: Vec<Route>,
    layers: Vec<MiddlewareHandler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            layers: Vec::new(),
        }
    }

    /// Adds a router-wide middleware. Layers wrap every route's own stack,
    /// and also wrap the `404` produced for unmatched requests.
    pub fn layer(&mut self, middleware: MiddlewareHandler) {
        self.layers.push(middleware);
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, Vec::new(), handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, Vec::new(), handler);
    }

    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, Vec::new(), handler);
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, Vec::new(), handler);
    }

    /// `GET` route behind its own middleware stack, outermost first.
    pub fn get_with(
        &mut self,
        path: &str,
        middlewares: impl IntoIterator<Item = MiddlewareHandler>,
        handler: impl IntoHandler,
    ) {
        self.add_route(Method::Get, path, middlewares.into_iter().collect(), handler);
    }

    pub fn post_with(
        &mut self,
        path: &str,
        middlewares: impl IntoIterator<Item = MiddlewareHandler>,
        handler: impl IntoHandler,
    ) {
        self.add_route(Method::Post, path, middlewares.into_iter().collect(), handler);
    }

    pub fn put_with(
        &mut self,
        path: &str,
        middlewares: impl IntoIterator<Item = MiddlewareHandler>,
        handler: impl IntoHandler,
    ) {
        self.add_route(Method::Put, path, middlewares.into_iter().collect(), handler);
    }

    pub fn delete_with(
        &mut self,
        path: &str,
        middlewares: impl IntoIterator<Item = MiddlewareHandler>,
        handler: impl IntoHandler,
    ) {
        self.add_route(Method::Delete, path, middlewares.into_iter().collect(), handler);
    }

    fn add_route(
        &mut self,
        method: Method,
        path: &str,
        middlewares: Vec<MiddlewareHandler>,
        handler: impl IntoHandler,
    ) {
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            middlewares: Arc::from(middlewares),
            handler: self::handler(handler),
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `request` through the first matching route's middleware stack.
    pub async fn route(&self, request: Request) -> Response {
        let matched = self.routes.iter().find_map(|route| {
            route
                .matches(request.method(), request.path())
                .map(|params| (route, params))
        });

        match matched {
            Some((route, params)) => {
                let ctx = Context::with_params(request, params);
                let endpoint: Handler = if route.middlewares.is_empty() {
                    route.handler.clone()
                } else {
                    let stack = route.middlewares.clone();
                    let inner = route.handler.clone();
                    Arc::new(move |ctx: Context| -> ResponseFuture {
                        let next = Next::new(stack.clone(), inner.clone());
                        Box::pin(next.run(ctx))
                    })
                };
                self.run_layers(ctx, endpoint).await
            }
            None => {
                let not_found: Handler = Arc::new(|_ctx: Context| -> ResponseFuture {
                    Box::pin(async { Response::new(StatusCode::NotFound) })
                });
                self.run_layers(Context::new(request), not_found).await
            }
        }
    }

    async fn run_layers(&self, ctx: Context, endpoint: Handler) -> Response {
        if self.layers.is_empty() {
            endpoint(ctx).await
        } else {
            Next::new(Arc::from(self.layers.clone()), endpoint).run(ctx).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{LoggerMiddleware, from_middleware};

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn pattern_parse_variants() {
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
        assert!(matches!(Pattern::parse("/movies/"), Pattern::Exact(s) if s == "/movies"));
        assert!(matches!(Pattern::parse("/uploads/*"), Pattern::Wildcard(s) if s == "/uploads"));
        match Pattern::parse("/movies/:movieId/edit") {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 3);
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "movieId"));
                assert!(matches!(&segments[2], Segment::Static(s) if s == "edit"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn pattern_exact_matching() {
        let pat = Pattern::parse("/movies");
        assert!(pat.matches("/movies").is_some());
        assert!(pat.matches("/movies/").is_some());
        assert!(pat.matches("/categories").is_none());
    }

    #[test]
    fn pattern_param_extraction() {
        let pat = Pattern::parse("/movies/:movieId/edit");
        let params = pat.matches("/movies/42/edit").unwrap();
        assert_eq!(params.get("movieId"), Some("42"));
        assert!(pat.matches("/movies/42").is_none());
        assert!(pat.matches("/users/42/edit").is_none());
    }

    #[test]
    fn pattern_wildcard() {
        let pat = Pattern::parse("/uploads/*");
        let params = pat.matches("/uploads/posters/1.jpg").unwrap();
        assert_eq!(params.get("wildcard"), Some("/posters/1.jpg"));
        assert!(pat.matches("/other/1.jpg").is_none());
    }

    #[test]
    fn wildcard_stops_at_segment_boundary() {
        let pat = Pattern::parse("/uploads/*");
        assert!(pat.matches("/uploadsX").is_none());
        assert!(pat.matches("/uploads-old/1.jpg").is_none());
        assert_eq!(pat.matches("/uploads").unwrap().get("wildcard"), Some(""));
    }

    #[test]
    fn router_len_counts_routes() {
        let mut router = Router::default();
        assert!(router.is_empty());
        router.get("/a", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.post_with("/b", [], |_ctx: Context| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.len(), 2);
    }

    #[tokio::test]
    async fn unmatched_is_404() {
        let mut router = Router::new();
        router.get("/movies", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.route(make_request("GET", "/nope")).await.status(), StatusCode::NotFound);
        assert_eq!(
            router.route(make_request("POST", "/movies")).await.status(),
            StatusCode::NotFound
        );
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/movies/category/:categoryId", |_ctx: Context| async {
            Response::new(StatusCode::Ok).body("by-category")
        });
        router.get("/movies/:movieId", |_ctx: Context| async {
            Response::new(StatusCode::Ok).body("single")
        });
        let res = router.route(make_request("GET", "/movies/category/3")).await;
        assert_eq!(res.content().as_ref(), b"by-category");
    }

    #[tokio::test]
    async fn route_params_reach_handler() {
        let mut router = Router::new();
        router.delete("/movies/delete/:movieId", |ctx: Context| async move {
            let id = ctx.params().get("movieId").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(id)
        });
        let res = router.route(make_request("DELETE", "/movies/delete/9")).await;
        assert_eq!(res.content().as_ref(), b"9");
    }

    #[tokio::test]
    async fn route_middleware_wraps_only_its_route() {
        let stamp: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| -> ResponseFuture {
            Box::pin(async move {
                let mut res = next.run(ctx).await;
                res.add_header("X-Stamp", "yes");
                res
            })
        });

        let mut router = Router::new();
        router.get_with("/stamped", [stamp], |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.put("/plain", |_ctx: Context| async { Response::new(StatusCode::Ok) });

        let stamped = router.route(make_request("GET", "/stamped")).await;
        assert_eq!(stamped.headers().get("x-stamp"), Some("yes"));
        let plain = router.route(make_request("PUT", "/plain")).await;
        assert!(!plain.headers().contains("x-stamp"));
    }

    #[tokio::test]
    async fn router_layers_also_wrap_404() {
        let mut router = Router::new();
        router.layer(from_middleware(Arc::new(LoggerMiddleware)));
        router.get("/ok", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        assert_eq!(router.route(make_request("GET", "/ok")).await.status(), StatusCode::Ok);
        assert_eq!(router.route(make_request("GET", "/x")).await.status(), StatusCode::NotFound);
    }
}
