//! In-process response cache with pattern-based invalidation.
//!
//! - [`CacheStore`] — shared key/value store of response bodies with per-entry TTL.
//! - [`Cache`] — owns a store and the background sweep that purges expired entries.
//! - [`CacheMiddleware`] — serves repeated `GET`s from the store (`X-Cache: HIT|MISS`).
//! - [`InvalidateOnWrite`] / [`invalidate`] — drop affected keys after a successful write.
//! - [`CacheAdmin`] — `/cache-stats` and `/clear-cache` handlers.
//!
//! ```rust,no_run
//! use marquee::cache::{Cache, CacheConfig};
//! use marquee::context::Context;
//! use marquee::{Response, Router, StatusCode};
//!
//! # async fn wire() -> Result<(), marquee::cache::CacheError> {
//! let cache = Cache::start(CacheConfig::from_env()?)?;
//! let mut router = Router::new();
//!
//! router.get_with("/movies", [cache.layer(Some(120))], |_ctx: Context| async {
//!     Response::new(StatusCode::Ok).body("[]")
//! });
//! router.post_with(
//!     "/movies/create",
//!     [cache.invalidate_on_write(["/movies"])],
//!     |_ctx: Context| async { Response::new(StatusCode::Created) },
//! );
//! cache.admin().register(&mut router);
//! # cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod admin;
pub mod config;
pub mod invalidate;
pub mod middleware;
pub mod store;
mod sweeper;

pub use admin::CacheAdmin;
pub use config::CacheConfig;
pub use invalidate::{InvalidateOnWrite, invalidate};
pub use middleware::{CACHE_HEADER, CACHE_HIT, CACHE_MISS, CacheMiddleware, CaptureResponse};
pub use store::{CacheStats, CacheStore, CachedBody, EntrySnapshot, Ttl};
pub use sweeper::Cache;

/// Errors raised while setting up the cache. Store operations themselves
/// cannot fail.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("the cache sweeper must be started inside a Tokio runtime")]
    NoRuntime,

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}
