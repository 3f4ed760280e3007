//! Keeping cached reads fresh after writes.
//!
//! A write handler either calls [`invalidate`] itself right after its commit,
//! or is registered behind [`InvalidateOnWrite`], which does the same once the
//! handler has returned a successful response. Either way the matching entries
//! are gone before the write's response is handed back to the server, so no
//! read that starts after the client sees the write can be served stale.

use tracing::warn;

use super::CacheStore;
use crate::context::{Context, PathParams};
use crate::middleware::{Middleware, Next, ResponseFuture};

/// Invalidates every key containing any of `patterns`; returns the total removed.
///
/// Empty patterns are skipped here: clearing the whole store has to be asked
/// for explicitly through [`CacheStore::invalidate_by_pattern`] with `None`.
pub fn invalidate<S: AsRef<str>>(store: &CacheStore, patterns: &[S]) -> usize {
    patterns
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.is_empty())
        .map(|p| store.invalidate_by_pattern(Some(p)))
        .sum()
}

/// Invalidates a fixed set of patterns after a successful write.
///
/// Patterns are templates: a segment written `:name` is replaced by the
/// route's `name` parameter, so `/movies/:movieId` registered on
/// `PUT /movies/:movieId/edit` invalidates `/movies/42` for movie 42. A
/// template whose parameter the route did not capture is skipped.
///
/// Nothing is invalidated for non-2xx responses or for read requests.
pub struct InvalidateOnWrite {
    store: CacheStore,
    patterns: Vec<String>,
}

impl InvalidateOnWrite {
    pub fn new<I, S>(store: CacheStore, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            store,
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    fn resolve(&self, params: &PathParams) -> Vec<String> {
        self.patterns
            .iter()
            .filter_map(|template| match resolve_template(template, params) {
                Some(pattern) => Some(pattern),
                None => {
                    warn!(%template, "invalidation pattern references an uncaptured parameter");
                    None
                }
            })
            .collect()
    }
}

fn resolve_template(template: &str, params: &PathParams) -> Option<String> {
    let segments = template
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => params.get(name),
            None => Some(segment),
        })
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

impl Middleware for InvalidateOnWrite {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        if !ctx.request().method().is_write() {
            return Box::pin(next.run(ctx));
        }

        let patterns = self.resolve(ctx.params());
        let store = self.store.clone();
        Box::pin(async move {
            let response = next.run(ctx).await;
            if response.status().is_success() {
                invalidate(&store, &patterns);
            }
            response
        })
    }
}
