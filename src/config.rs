//! Client configuration record.
//!
//! Loadable from any serde format or from environment variables.

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::stores::memcached::StoreConfig;

/// Default server when none is configured.
pub const DEFAULT_SERVERS: &str = "localhost:11211";

/// Everything needed to connect a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Comma, semicolon or whitespace separated `host:port` list.
    pub servers: String,
    /// Prefix applied to every key.
    pub namespace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Runtime type checks, see [`ClientBuilder::type_checks`](crate::ClientBuilder::type_checks).
    pub type_checks: bool,
    pub backoff: BackoffPolicy,
    /// Transport settings passed through to the memcache client.
    pub store: StoreConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            servers: DEFAULT_SERVERS.to_string(),
            namespace: String::new(),
            username: None,
            password: None,
            type_checks: false,
            backoff: BackoffPolicy::default(),
            store: StoreConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a new ClientConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMCACHE_SERVERS` - Server list (default: localhost:11211)
    /// - `MEMCACHE_NAMESPACE` - Key prefix (default: empty)
    /// - `MEMCACHE_USERNAME` / `MEMCACHE_PASSWORD` - SASL credentials
    /// - `MEMCACHE_TYPE_CHECKS` - `true`/`1` to enable type checks (default: false)
    /// - `MEMCACHE_MAX_RETRIES` - Retries per call (default: 5)
    /// - `MEMCACHE_INITIAL_BACKOFF_MS` - First retry delay (default: 100)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let backoff = BackoffPolicy {
            max_retries: lookup("MEMCACHE_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.backoff.max_retries),
            initial_interval: lookup("MEMCACHE_INITIAL_BACKOFF_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff.initial_interval),
            ..defaults.backoff
        };

        Self {
            servers: lookup("MEMCACHE_SERVERS").unwrap_or(defaults.servers),
            namespace: lookup("MEMCACHE_NAMESPACE").unwrap_or(defaults.namespace),
            username: lookup("MEMCACHE_USERNAME"),
            password: lookup("MEMCACHE_PASSWORD"),
            type_checks: lookup("MEMCACHE_TYPE_CHECKS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.type_checks),
            backoff,
            store: defaults.store,
        }
    }
}
