//! Cache configuration.

use std::time::Duration;

use serde::Deserialize;

use super::CacheError;

/// Default interval between background sweeps.
pub const DEFAULT_CHECK_PERIOD_SECS: u64 = 60;

pub const ENV_DEFAULT_TTL: &str = "MARQUEE_CACHE_TTL";
pub const ENV_CHECK_PERIOD: &str = "MARQUEE_CACHE_CHECK_PERIOD";
pub const ENV_KEY_PREFIX: &str = "MARQUEE_CACHE_KEY_PREFIX";
pub const ENV_CACHE_ERRORS: &str = "MARQUEE_CACHE_ERRORS";
pub const ENV_ADMIN_SECRET: &str = "MARQUEE_CACHE_ADMIN_SECRET";

/// Settings for a [`Cache`](super::Cache).
///
/// Deserializable with every field optional, so it can sit inside a larger
/// application config file; [`from_env`](Self::from_env) reads the same
/// settings from `MARQUEE_CACHE_*` variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a route registers without one. `0` means never expire.
    pub default_ttl_secs: u64,
    /// Seconds between sweeps of expired entries. `0` disables the sweep.
    pub check_period_secs: u64,
    /// Prepended to every cache key.
    pub key_prefix: String,
    /// Store non-2xx responses too. Off by default: a cached hit is always
    /// replayed as `200 OK`, so caching an error would turn it into a success.
    pub cache_errors: bool,
    /// Secret the admin endpoints expect in `?secret=`, compared after the
    /// query value is percent-decoded. `None` locks them.
    pub admin_secret: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 0,
            check_period_secs: DEFAULT_CHECK_PERIOD_SECS,
            key_prefix: String::new(),
            cache_errors: false,
            admin_secret: None,
        }
    }
}

impl CacheConfig {
    /// Reads overrides from the process environment, keeping defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidEnv`] when a numeric or boolean variable does not parse.
    pub fn from_env() -> Result<Self, CacheError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CacheError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_DEFAULT_TTL) {
            config.default_ttl_secs = parse_var(ENV_DEFAULT_TTL, &value)?;
        }
        if let Some(value) = lookup(ENV_CHECK_PERIOD) {
            config.check_period_secs = parse_var(ENV_CHECK_PERIOD, &value)?;
        }
        if let Some(value) = lookup(ENV_KEY_PREFIX) {
            config.key_prefix = value;
        }
        if let Some(value) = lookup(ENV_CACHE_ERRORS) {
            config.cache_errors = parse_var(ENV_CACHE_ERRORS, &value)?;
        }
        if let Some(value) = lookup(ENV_ADMIN_SECRET).filter(|v| !v.is_empty()) {
            config.admin_secret = Some(value);
        }

        Ok(config)
    }

    /// Sweep interval, or `None` when sweeping is disabled.
    pub fn check_period(&self) -> Option<Duration> {
        (self.check_period_secs > 0).then(|| Duration::from_secs(self.check_period_secs))
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, CacheError> {
    value.trim().parse().map_err(|_| CacheError::InvalidEnv {
        var,
        value: value.to_owned(),
    })
}
