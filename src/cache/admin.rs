//! Admin introspection over HTTP.
//!
//! - `GET /cache-stats?secret=…` — counters, every key, and per key the
//!   stored body and its remaining TTL in seconds (`null` = never expires).
//! - `POST /clear-cache?secret=…` — optional JSON body `{"pattern": "…"}`;
//!   without a pattern the whole cache is cleared.
//!
//! Both answer `403` unless the query carries the configured admin secret.
//! With no secret configured they always answer `403`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{CacheStats, CacheStore};
use crate::context::Context;
use crate::{Response, Router, StatusCode};

#[derive(Debug, Serialize)]
struct StatsReport {
    stats: CacheStats,
    keys: Vec<String>,
    items: BTreeMap<String, ItemReport>,
}

#[derive(Debug, Serialize)]
struct ItemReport {
    value: String,
    ttl: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ClearRequest {
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClearReport {
    success: bool,
    removed: usize,
    message: String,
}

/// Handlers for the cache admin endpoints.
#[derive(Debug, Clone)]
pub struct CacheAdmin {
    store: CacheStore,
    secret: Option<String>,
}

impl CacheAdmin {
    pub fn new(store: CacheStore, secret: Option<String>) -> Self {
        Self { store, secret }
    }

    /// Mounts `GET /cache-stats` and `POST /clear-cache` on `router`.
    pub fn register(self, router: &mut Router) {
        let admin = Arc::new(self);

        let stats = admin.clone();
        router.get("/cache-stats", move |ctx: Context| {
            let admin = stats.clone();
            async move { admin.stats(&ctx) }
        });

        router.post("/clear-cache", move |ctx: Context| {
            let admin = admin.clone();
            async move { admin.clear(&ctx) }
        });
    }

    fn authorized(&self, ctx: &Context) -> bool {
        match (self.secret.as_deref(), ctx.request().query_param("secret")) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        }
    }

    fn forbidden() -> Response {
        Response::json(
            StatusCode::Forbidden,
            &serde_json::json!({ "error": "Unauthorized" }),
        )
    }

    /// `GET /cache-stats`.
    pub fn stats(&self, ctx: &Context) -> Response {
        if !self.authorized(ctx) {
            warn!("cache stats requested without a valid secret");
            return Self::forbidden();
        }

        let mut keys = self.store.keys();
        keys.sort();

        let items = self
            .store
            .entries()
            .into_iter()
            .map(|entry| {
                let item = ItemReport {
                    value: entry.value.to_text(),
                    ttl: entry.ttl.as_secs_f64(),
                };
                (entry.key, item)
            })
            .collect();

        let report = StatsReport {
            stats: self.store.stats(),
            keys,
            items,
        };
        Response::json(StatusCode::Ok, &report)
    }

    /// `POST /clear-cache`.
    pub fn clear(&self, ctx: &Context) -> Response {
        if !self.authorized(ctx) {
            warn!("cache clear requested without a valid secret");
            return Self::forbidden();
        }

        let request = if ctx.request().body().is_empty() {
            ClearRequest::default()
        } else {
            match ctx.json::<ClearRequest>() {
                Ok(request) => request,
                Err(e) => {
                    return Response::json(
                        StatusCode::BadRequest,
                        &serde_json::json!({ "error": format!("invalid body: {e}") }),
                    );
                }
            }
        };

        let pattern = request.pattern.as_deref().filter(|p| !p.is_empty());
        let removed = self.store.invalidate_by_pattern(pattern);
        info!(pattern = pattern.unwrap_or("*"), removed, "cache cleared by admin");

        let message = match pattern {
            Some(p) => format!("Cache cleared for pattern: {p}"),
            None => "Entire cache cleared".to_string(),
        };
        Response::json(
            StatusCode::Ok,
            &ClearReport {
                success: true,
                removed,
                message,
            },
        )
    }
}
