//! Read-through caching for `GET` routes.

use tracing::debug;

use super::{CacheConfig, CacheStore, CachedBody};
use crate::context::Context;
use crate::middleware::{Middleware, Next, ResponseFuture};
use crate::{Response, StatusCode};

/// Response header that marks where a `GET` response came from.
pub const CACHE_HEADER: &str = "X-Cache";
pub const CACHE_HIT: &str = "HIT";
pub const CACHE_MISS: &str = "MISS";

/// Serves repeated `GET` requests from the [`CacheStore`].
///
/// The key is the request's original URL, query string included, behind the
/// configured prefix. On a hit the stored body is replayed as `200 OK` with
/// `X-Cache: HIT` and the handler never runs. On a miss the handler runs and
/// its response, tagged `X-Cache: MISS`, passes through a [`CaptureResponse`]
/// that stores the body before it goes back to the client. Other methods pass
/// straight through.
pub struct CacheMiddleware {
    store: CacheStore,
    ttl_secs: Option<u64>,
    key_prefix: String,
    cache_errors: bool,
}

impl CacheMiddleware {
    pub fn new(store: CacheStore, ttl_secs: Option<u64>, config: &CacheConfig) -> Self {
        Self {
            store,
            ttl_secs,
            key_prefix: config.key_prefix.clone(),
            cache_errors: config.cache_errors,
        }
    }

    /// The cache key for `ctx`.
    pub fn key_for(&self, ctx: &Context) -> String {
        format!("{}{}", self.key_prefix, ctx.original_url())
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        if !ctx.request().method().is_read() {
            return Box::pin(next.run(ctx));
        }

        let key = self.key_for(&ctx);

        if let Some(cached) = self.store.get(&key) {
            debug!(%key, "cache hit");
            return Box::pin(async move { replay(cached) });
        }

        debug!(%key, "cache miss");
        let capture = CaptureResponse {
            generation: self.store.generation(),
            store: self.store.clone(),
            key,
            ttl_secs: self.ttl_secs,
            cache_errors: self.cache_errors,
        };
        Box::pin(async move {
            let response = next.run(ctx).await;
            capture.deliver(response)
        })
    }
}

fn replay(cached: CachedBody) -> Response {
    let mut response = Response::new(StatusCode::Ok).header(CACHE_HEADER, CACHE_HIT);
    if let Some(content_type) = cached.content_type {
        response.add_header("Content-Type", content_type);
    }
    response.body_bytes(cached.bytes)
}

/// Output adapter on the miss path: records the finalized body in the store
/// and hands the response on unchanged apart from the `X-Cache: MISS` marker.
///
/// Only a response that actually comes back from the handler reaches
/// [`deliver`](Self::deliver), so a handler that panics or is cancelled
/// leaves nothing behind in the cache. A body is also dropped when an
/// invalidation ran while the handler was producing it, since it may
/// predate the write that triggered it.
pub struct CaptureResponse {
    generation: u64,
    store: CacheStore,
    key: String,
    ttl_secs: Option<u64>,
    cache_errors: bool,
}

impl CaptureResponse {
    pub fn deliver(self, mut response: Response) -> Response {
        response.set_header(CACHE_HEADER, CACHE_MISS);

        if response.status().is_success() || self.cache_errors {
            let body = CachedBody::new(
                response.content().clone(),
                response.headers().get("content-type").map(str::to_owned),
            );
            let key = self.key;
            if !self.store.set_if_unchanged(key.as_str(), body, self.ttl_secs, self.generation) {
                debug!(%key, "cache invalidated during handler; not storing");
            }
        } else {
            debug!(key = %self.key, status = response.status().as_u16(), "not caching error response");
        }

        response
    }
}
