//! Middleware pipeline — composable logic wrapped around a route handler.
//!
//! Each middleware receives the request [`Context`] and a [`Next`] cursor. It
//! can short-circuit with its own [`Response`] (the response cache does this on
//! a hit), or call [`Next::run`] and decorate whatever comes back.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain, ending at the route handler.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] — converts a [`Middleware`] into a [`MiddlewareHandler`].
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::{Response, context::Context, router::Handler};

/// A cursor into the remaining middleware chain for a single request.
///
/// The chain always terminates in the route's handler: once every middleware
/// has been passed, [`run`](Self::run) invokes the handler itself. `Next` is
/// consumed by `run`, so a middleware cannot forward the same request twice.
///
/// # Examples
///
/// ```rust,no_run
/// use std::pin::Pin;
/// use marquee::{Response, context::Context, middleware::{Middleware, Next}};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(
///         &self,
///         ctx: Context,
///         next: Next,
///     ) -> Pin<Box<dyn std::future::Future<Output = Response> + Send>> {
///         Box::pin(async move { next.run(ctx).await })
///     }
/// }
/// ```
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Handler,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

/// A type-erased, reference-counted middleware function.
///
/// Construct one with [`from_middleware`] or by wrapping a closure directly:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use marquee::{context::Context, middleware::{MiddlewareHandler, Next, ResponseFuture}};
///
/// let handler: MiddlewareHandler = Arc::new(|ctx: Context, next: Next| -> ResponseFuture {
///     Box::pin(async move { next.run(ctx).await })
/// });
/// ```
pub type MiddlewareHandler =
    Arc<dyn Fn(Context, Next) -> ResponseFuture + Send + Sync + 'static>;

/// The boxed future every middleware and handler resolves through.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use marquee::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

impl Next {
    /// Creates a cursor at the start of `middlewares`, ending in `endpoint`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            endpoint,
            index: 0,
        }
    }

    /// Invokes the next middleware, or the handler once the chain is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(middleware) => {
                self.index += 1;
                middleware(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may:
///
/// - **Pass through** — `next.run(ctx).await` unchanged.
/// - **Short-circuit** — return a [`Response`] without calling `next`.
/// - **Decorate** — call `next.run(ctx).await`, then adjust the response.
///
/// Middleware is shared across Tokio tasks, hence `Send + Sync`; implementations
/// must not hold a lock across an `.await`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture;
}

/// Logs each request's method, original URL, status, and duration.
///
/// The line carries the `X-Cache` marker when the response has one, so hit
/// ratios can be read straight off the log.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let url = ctx.original_url().to_string();

            let response = next.run(ctx).await;

            let duration = start.elapsed();
            let status = response.status().as_u16();
            let cache = response.headers().get("x-cache").unwrap_or("-");

            tracing::info!(%method, %url, status, cache, ?duration, "request handled");

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, Request, StatusCode};

    fn endpoint() -> Handler {
        Arc::new(|_ctx: Context| -> ResponseFuture {
            Box::pin(async { Response::new(StatusCode::Ok).body("handler") })
        })
    }

    fn tag(value: &'static str) -> MiddlewareHandler {
        Arc::new(move |ctx: Context, next: Next| -> ResponseFuture {
            Box::pin(async move {
                let mut res = next.run(ctx).await;
                res.add_header("X-Trace", value);
                res
            })
        })
    }

    #[tokio::test]
    async fn empty_chain_reaches_handler() {
        let next = Next::new(Arc::from(Vec::new()), endpoint());
        let res = next.run(Context::new(Request::new(Method::Get, "/"))).await;
        assert_eq!(res.content().as_ref(), b"handler");
    }

    #[tokio::test]
    async fn middleware_runs_outermost_first() {
        let chain: Arc<[MiddlewareHandler]> = Arc::from(vec![tag("outer"), tag("inner")]);
        let res = Next::new(chain, endpoint())
            .run(Context::new(Request::new(Method::Get, "/")))
            .await;
        // Decoration happens on the way out, so the inner layer appends first.
        let trace: Vec<_> = res.headers().get_all("x-trace").collect();
        assert_eq!(trace, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_handler() {
        let deny: MiddlewareHandler = Arc::new(|_ctx: Context, _next: Next| -> ResponseFuture {
            Box::pin(async { Response::new(StatusCode::Forbidden) })
        });
        let res = Next::new(Arc::from(vec![deny]), endpoint())
            .run(Context::new(Request::new(Method::Get, "/")))
            .await;
        assert_eq!(res.status(), StatusCode::Forbidden);
        assert!(res.content().is_empty());
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let chain: Arc<[MiddlewareHandler]> =
            Arc::from(vec![from_middleware(Arc::new(LoggerMiddleware))]);
        let res = Next::new(chain, endpoint())
            .run(Context::new(Request::new(Method::Get, "/movies?x=1")))
            .await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.content().as_ref(), b"handler");
    }
}
