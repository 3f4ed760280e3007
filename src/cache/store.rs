//! The key/value store behind the response cache.
//!
//! Entries expire lazily: [`CacheStore::get`] drops an expired entry the
//! moment it is looked up, and [`CacheStore::purge_expired`] (run on a timer by
//! [`Cache`](super::Cache)) clears whatever nobody asked for. [`keys`](CacheStore::keys)
//! does neither, so it can still list a key whose deadline has already passed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info};

/// A cached response body, plus the content type it was served with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBody {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl CachedBody {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl From<&'static str> for CachedBody {
    fn from(body: &'static str) -> Self {
        Self::new(body, None)
    }
}

impl From<String> for CachedBody {
    fn from(body: String) -> Self {
        Self::new(body, None)
    }
}

impl From<Bytes> for CachedBody {
    fn from(body: Bytes) -> Self {
        Self::new(body, None)
    }
}

/// Remaining lifetime of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Stored with a zero or absent TTL; only invalidation removes it.
    Never,
    Remaining(Duration),
}

impl Ttl {
    /// Remaining seconds, or `None` for an entry that never expires.
    pub fn as_secs_f64(self) -> Option<f64> {
        match self {
            Ttl::Never => None,
            Ttl::Remaining(d) => Some(d.as_secs_f64()),
        }
    }
}

/// One live entry, as reported to the admin surface.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub key: String,
    pub value: CachedBody,
    pub ttl: Ttl,
}

/// Counters in the shape the admin endpoint reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Number of keys currently held (expired-but-unswept included).
    pub keys: usize,
    /// Total length of all keys, in bytes.
    pub ksize: usize,
    /// Total length of all stored bodies, in bytes.
    pub vsize: usize,
}

#[derive(Debug)]
struct CacheEntry {
    value: CachedBody,
    // `None` means the entry never expires.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    fn ttl(&self, now: Instant) -> Ttl {
        match self.expires_at {
            None => Ttl::Never,
            Some(deadline) => Ttl::Remaining(deadline.saturating_duration_since(now)),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    // Bumped by every invalidation.
    generation: u64,
}

/// Shared, thread-safe response store.
///
/// Cloning is cheap and every clone sees the same entries. Each operation
/// takes the lock once and never awaits while holding it, so operations are
/// atomic with respect to one another, including the background sweep.
///
/// # Examples
///
/// ```
/// use marquee::cache::CacheStore;
///
/// let store = CacheStore::new();
/// store.set("/movies", "[]", Some(120));
/// store.set("/movies/42", "{}", None);
/// store.set("/categories", "[]", Some(300));
///
/// assert_eq!(store.invalidate_by_pattern(Some("/movies")), 2);
/// assert!(store.get("/categories").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    inner: Arc<Mutex<Inner>>,
    default_ttl: Option<Duration>,
}

impl CacheStore {
    /// A store whose entries never expire unless given a TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that applies `secs` to every [`set`](Self::set) called without a TTL.
    /// Zero keeps the never-expire default.
    pub fn with_default_ttl(secs: u64) -> Self {
        Self {
            inner: Arc::default(),
            default_ttl: (secs > 0).then(|| Duration::from_secs(secs)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up `key`. An expired entry is removed and reported as absent.
    pub fn get(&self, key: &str) -> Option<CachedBody> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.misses += 1;
            debug!(key, "cache entry expired on read");
            return None;
        }

        inner.hits += 1;
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// `ttl_secs` of `Some(0)` never expires. `None` falls back to the store's
    /// default TTL, which itself defaults to never.
    ///
    /// A TTL too large to put a deadline on is treated as never expiring.
    pub fn set(&self, key: impl Into<String>, value: impl Into<CachedBody>, ttl_secs: Option<u64>) {
        let entry = self.entry(value.into(), ttl_secs);
        self.lock().entries.insert(key.into(), entry);
    }

    /// Like [`set`](Self::set), but only if no invalidation has run since
    /// `generation` was read from [`generation`](Self::generation). Returns
    /// whether the entry was stored.
    ///
    /// A response computed before a write and finished after it would
    /// otherwise be stored after the write invalidated its key.
    pub fn set_if_unchanged(
        &self,
        key: impl Into<String>,
        value: impl Into<CachedBody>,
        ttl_secs: Option<u64>,
        generation: u64,
    ) -> bool {
        let entry = self.entry(value.into(), ttl_secs);
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.entries.insert(key.into(), entry);
        true
    }

    /// Invalidation counter; changes whenever
    /// [`invalidate_by_pattern`](Self::invalidate_by_pattern) runs.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn entry(&self, value: CachedBody, ttl_secs: Option<u64>) -> CacheEntry {
        let ttl = match ttl_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => self.default_ttl,
        };
        CacheEntry {
            value,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    /// Removes `key`. Returns whether an entry was present; removing an
    /// absent key is a no-op.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Every key currently held, in no particular order. Does not check expiry.
    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Removes every key containing `pattern` as a plain substring and returns
    /// how many were removed. `None` or an empty pattern clears the store.
    pub fn invalidate_by_pattern(&self, pattern: Option<&str>) -> usize {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);

        let removed: Vec<String> = match pattern.filter(|p| !p.is_empty()) {
            Some(pattern) => {
                let matching: Vec<String> = inner
                    .entries
                    .keys()
                    .filter(|key| key.contains(pattern))
                    .cloned()
                    .collect();
                for key in &matching {
                    inner.entries.remove(key);
                }
                matching
            }
            None => inner.entries.drain().map(|(key, _)| key).collect(),
        };
        drop(inner);

        if !removed.is_empty() {
            info!(
                pattern = pattern.unwrap_or("*"),
                count = removed.len(),
                keys = ?removed,
                "cache keys invalidated"
            );
        }
        removed.len()
    }

    /// Remaining lifetime of `key`, or `None` if it is absent or already expired.
    pub fn ttl(&self, key: &str) -> Option<Ttl> {
        let now = Instant::now();
        let inner = self.lock();
        let entry = inner.entries.get(key)?;
        (!entry.is_expired(now)).then(|| entry.ttl(now))
    }

    /// Key, value and remaining TTL of every unexpired entry.
    pub fn entries(&self) -> Vec<EntrySnapshot> {
        let now = Instant::now();
        self.lock()
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| EntrySnapshot {
                key: key.clone(),
                value: entry.value.clone(),
                ttl: entry.ttl(now),
            })
            .collect()
    }

    /// One sweep pass: drops every entry with a TTL whose deadline has passed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        before - inner.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            keys: inner.entries.len(),
            ksize: inner.entries.keys().map(String::len).sum(),
            vsize: inner.entries.values().map(|e| e.value.bytes.len()).sum(),
        }
    }
}
