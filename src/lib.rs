//! # marquee
//!
//! The HTTP core of a movie-catalog backend: an async HTTP/1.1 server, a
//! router with per-route middleware, and an in-process response cache that
//! serves repeated reads and is invalidated by pattern after writes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marquee::cache::{Cache, CacheConfig};
//! use marquee::context::Context;
//! use marquee::{Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Cache::start(CacheConfig::default())?;
//!     let mut router = Router::new();
//!     router.get_with("/categories", [cache.layer(Some(300))], |_ctx: Context| async {
//!         Response::new(StatusCode::Ok).body(r#"["Drama","Comedy"]"#)
//!     });
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.serve(router, async { let _ = tokio::signal::ctrl_c().await; }).await?;
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
