//! [`Cache`]: an owned store with its background sweep.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::admin::CacheAdmin;
use super::invalidate::InvalidateOnWrite;
use super::middleware::CacheMiddleware;
use super::{CacheConfig, CacheError, CacheStore};
use crate::middleware::{MiddlewareHandler, from_middleware};

/// The response cache for one server: a [`CacheStore`] plus the task that
/// sweeps expired entries out of it.
///
/// The sweep starts in [`start`](Self::start) and stops in
/// [`shutdown`](Self::shutdown). Dropping a `Cache` also signals the sweep to
/// stop, without waiting for it.
pub struct Cache {
    store: CacheStore,
    config: Arc<CacheConfig>,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Cache {
    /// Creates the store and spawns the sweep on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`CacheError::NoRuntime`] when called outside a Tokio runtime.
    pub fn start(config: CacheConfig) -> Result<Self, CacheError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let store = CacheStore::with_default_ttl(config.default_ttl_secs);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = config.check_period().map(|period| {
            info!(period = ?period, "cache sweeper started");
            runtime.spawn(sweep(store.clone(), period, shutdown_rx))
        });

        Ok(Self {
            store,
            config: Arc::new(config),
            shutdown_tx,
            sweeper: Mutex::new(sweeper),
        })
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Caching middleware for a `GET` route. `ttl_secs` of `None` or `Some(0)`
    /// keeps entries until they are invalidated (or for the configured
    /// default TTL, when one is set).
    pub fn layer(&self, ttl_secs: Option<u64>) -> MiddlewareHandler {
        from_middleware(Arc::new(CacheMiddleware::new(
            self.store.clone(),
            ttl_secs,
            &self.config,
        )))
    }

    /// Invalidation middleware for a write route. See [`InvalidateOnWrite`].
    pub fn invalidate_on_write<I, S>(&self, patterns: I) -> MiddlewareHandler
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        from_middleware(Arc::new(InvalidateOnWrite::new(self.store.clone(), patterns)))
    }

    /// Admin introspection handlers bound to this cache.
    pub fn admin(&self) -> CacheAdmin {
        CacheAdmin::new(self.store.clone(), self.config.admin_secret.clone())
    }

    /// Stops the sweep and waits for it to finish. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "cache sweeper ended abnormally");
            }
            info!("cache sweeper stopped");
        }
    }

    /// Whether the background sweep is still running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn sweep(store: CacheStore, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "cache sweep");
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
