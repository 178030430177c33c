use async_trait::async_trait;
use memcache::{CommandError, MemcacheError};
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;
use crate::store::Store;

/// Transport-level settings passed through to the memcache client.
///
/// These are separate from the client's [`BackoffPolicy`](crate::BackoffPolicy),
/// which retries whole operations on top of whatever the transport does.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connections kept per server.
    pub pool_size: u32,
    /// Socket read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Socket write timeout in milliseconds.
    pub write_timeout_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            pool_size: 1,
            read_timeout_ms: Some(1_000),
            write_timeout_ms: Some(1_000),
        }
    }
}

/// Credentials for SASL authentication.
///
/// Both parts are embedded in the connection URL as they are, so they are
/// limited to letters, digits and `-._~!$&'()*+,`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Reject characters that would be escaped or misparsed in the connection URL.
    pub fn validate(&self) -> Result<(), CacheError> {
        for (field, value) in [("username", &self.username), ("password", &self.password)] {
            if let Some(c) = value.chars().find(|c| !is_userinfo_safe(*c)) {
                return Err(CacheError::Config(format!(
                    "{} contains unsupported character {:?}",
                    field, c
                )));
            }
        }
        if self.username.is_empty() {
            return Err(CacheError::Config("username is empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn is_userinfo_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~!$&'()*+,".contains(c)
}

/// Network store backed by the `memcache` crate.
///
/// The underlying client is blocking, so every command runs on tokio's
/// blocking pool. Connections are pooled per server and the client is safe to
/// share between tasks.
pub struct MemcachedStore {
    client: Arc<memcache::Client>,
}

impl MemcachedStore {
    /// Connect to the given servers.
    ///
    /// `servers` is a comma, semicolon or whitespace separated list of
    /// `host:port` pairs, with or without the `memcache://` scheme.
    ///
    /// # Example
    /// ```ignore
    /// let store = MemcachedStore::connect(
    ///     "10.0.0.1:11211, 10.0.0.2:11211",
    ///     None,
    ///     StoreConfig::default(),
    /// ).await?;
    /// ```
    pub async fn connect(
        servers: &str,
        credentials: Option<Credentials>,
        config: StoreConfig,
    ) -> Result<Self, CacheError> {
        let urls = server_urls(servers, credentials.as_ref())?;

        let client = tokio::task::spawn_blocking(move || open_client(urls, &config))
            .await
            .map_err(|e| {
                CacheError::transport("memcached", "", format!("connect task failed: {}", e))
            })?
            .map_err(|e| {
                CacheError::transport("memcached", "", format!("Failed to connect: {}", e))
            })?;

        tracing::debug!("Connected to memcached: servers={}", servers);

        Ok(MemcachedStore {
            client: Arc::new(client),
        })
    }

    /// Run a blocking command on the pool and map its error.
    async fn run<T, F>(&self, key: &str, command: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client) -> Result<T, MemcacheError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || command(client.as_ref()))
            .await
            .map_err(|e| CacheError::transport(self.name(), key, format!("task failed: {}", e)))?
            .map_err(|e| map_error(key, e))
    }

    /// Shared increment/decrement logic.
    ///
    /// Binary `incr`/`decr` create a missing counter at 0 with no expiration,
    /// so the counter is seeded with an `add` of `initial` and `ttl` first.
    async fn adjust(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: u32,
        increment: bool,
    ) -> Result<u64, CacheError> {
        let owned = key.to_string();
        seed_or_adjust(self.add(key, initial.to_string(), ttl), initial, || {
            self.run(key, move |c| {
                if increment {
                    c.increment(&owned, delta)
                } else {
                    c.decrement(&owned, delta)
                }
            })
        })
        .await
    }
}

#[async_trait]
impl Store for MemcachedStore {
    fn name(&self) -> &'static str {
        "memcached"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let owned = key.to_string();
        self.run(key, move |c| c.get::<String>(&owned)).await
    }

    async fn set(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError> {
        let owned = key.to_string();
        self.run(key, move |c| c.set(&owned, value.as_str(), ttl))
            .await
    }

    async fn add(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError> {
        let owned = key.to_string();
        self.run(key, move |c| c.add(&owned, value.as_str(), ttl))
            .await
    }

    async fn replace(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError> {
        let owned = key.to_string();
        self.run(key, move |c| c.replace(&owned, value.as_str(), ttl))
            .await
            .map_err(|e| match e {
                // A missing key is the rejection case for replace
                CacheError::NotFound { key } => CacheError::NotStored { key },
                other => other,
            })
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let owned = key.to_string();
        let deleted = self.run(key, move |c| c.delete(&owned)).await?;
        if deleted {
            Ok(())
        } else {
            Err(CacheError::not_found(key))
        }
    }

    async fn increment(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: u32,
    ) -> Result<u64, CacheError> {
        self.adjust(key, delta, initial, ttl, true).await
    }

    async fn decrement(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: u32,
    ) -> Result<u64, CacheError> {
        self.adjust(key, delta, initial, ttl, false).await
    }

    async fn touch(&self, key: &str, ttl: u32) -> Result<(), CacheError> {
        let owned = key.to_string();
        let touched = self.run(key, move |c| c.touch(&owned, ttl)).await?;
        if touched {
            Ok(())
        } else {
            Err(CacheError::not_found(key))
        }
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.run("", |c| c.flush()).await
    }

    async fn noop(&self) -> Result<(), CacheError> {
        self.run("", |c| c.version().map(|_| ())).await
    }

    async fn quit(&self) -> Result<(), CacheError> {
        // Pooled connections close when the last handle drops
        Ok(())
    }
}

/// Run `seed`; if the counter already existed, run `adjust` instead.
///
/// A fresh counter reports `initial` without being adjusted.
async fn seed_or_adjust<S, F, Fut>(seed: S, initial: u64, adjust: F) -> Result<u64, CacheError>
where
    S: Future<Output = Result<(), CacheError>>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<u64, CacheError>>,
{
    match seed.await {
        Ok(()) => Ok(initial),
        Err(CacheError::NotStored { .. }) => adjust().await,
        Err(e) => Err(e),
    }
}

fn open_client(urls: Vec<String>, config: &StoreConfig) -> Result<memcache::Client, MemcacheError> {
    let client = memcache::Client::with_pool_size(urls, config.pool_size)?;
    client.set_read_timeout(config.read_timeout_ms.map(Duration::from_millis))?;
    client.set_write_timeout(config.write_timeout_ms.map(Duration::from_millis))?;
    Ok(client)
}

/// Split a server list and turn each entry into a connection URL.
fn server_urls(
    servers: &str,
    credentials: Option<&Credentials>,
) -> Result<Vec<String>, CacheError> {
    if let Some(creds) = credentials {
        creds.validate()?;
    }
    let urls: Vec<String> = servers
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|server| {
            let address = server.strip_prefix("memcache://").unwrap_or(server);
            match credentials {
                Some(creds) => format!(
                    "memcache://{}:{}@{}",
                    creds.username, creds.password, address
                ),
                None => format!("memcache://{}", address),
            }
        })
        .collect();

    if urls.is_empty() {
        return Err(CacheError::Config("no memcached servers given".to_string()));
    }
    Ok(urls)
}

fn map_error(key: &str, err: MemcacheError) -> CacheError {
    match err {
        MemcacheError::CommandError(CommandError::KeyNotFound) => CacheError::not_found(key),
        MemcacheError::CommandError(CommandError::KeyExists) => CacheError::not_stored(key),
        MemcacheError::IOError(e) => CacheError::transport("memcached", key, e.to_string()),
        MemcacheError::PoolError(e) => CacheError::transport("memcached", key, e.to_string()),
        other => CacheError::server("memcached", key, other.to_string()),
    }
}
