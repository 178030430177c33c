//! Builder API for creating clients.
//!
//! Every option is applied and validated before the client exists; a built
//! client is immutable.

use std::sync::Arc;

use crate::backoff::BackoffPolicy;
use crate::client::Client;
use crate::codec::{Codec, JsonCodec, StringCodec};
use crate::config::ClientConfig;
use crate::error::CacheError;
use crate::store::Store;
use crate::stores::memcached::{Credentials, MemcachedStore, StoreConfig};
use crate::utils::MAX_KEY_LENGTH;

/// Builder for [`Client`].
///
/// # Example
///
/// ```ignore
/// use memcache_getset::{ClientBuilder, StringCodec};
///
/// let cache = ClientBuilder::new()
///     .namespace("users_")
///     .auth("user", "secret")
///     .type_checks(true)
///     .connect("localhost:11211")
///     .await?;
///
/// let raw = ClientBuilder::new()
///     .codec(StringCodec)
///     .build(MemoryStore::new(MemoryStoreConfig::default()))?;
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    namespace: String,
    codec: Arc<dyn Codec>,
    backoff: BackoffPolicy,
    type_checks: bool,
    credentials: Option<Credentials>,
    store_config: StoreConfig,
}

impl ClientBuilder {
    /// Create a new ClientBuilder with no namespace, JSON encoding and the
    /// default backoff policy.
    pub fn new() -> Self {
        ClientBuilder {
            namespace: String::new(),
            codec: Arc::new(JsonCodec),
            backoff: BackoffPolicy::default(),
            type_checks: false,
            credentials: None,
            store_config: StoreConfig::default(),
        }
    }

    /// Start from a configuration record. The servers are passed to [`ClientBuilder::connect`].
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut builder = ClientBuilder::new()
            .namespace(config.namespace.clone())
            .backoff(config.backoff.clone())
            .type_checks(config.type_checks)
            .store_config(config.store.clone());
        if let Some(username) = &config.username {
            builder = builder.auth(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }
        builder
    }

    /// Prefix applied to every key.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replace the encoding used for every value.
    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Structured JSON encoding (the default).
    pub fn json(self) -> Self {
        self.codec(JsonCodec)
    }

    /// Passthrough encoding for string values.
    pub fn string(self) -> Self {
        self.codec(StringCodec)
    }

    /// Credentials for the memcached servers. Only used by [`ClientBuilder::connect`].
    pub fn auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Transport settings for the memcached client. Only used by [`ClientBuilder::connect`].
    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    /// Retry policy wrapped around every store call.
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    /// Check target and computed value types against the codec at runtime.
    pub fn type_checks(mut self, enabled: bool) -> Self {
        self.type_checks = enabled;
        self
    }

    fn validate(&self) -> Result<(), CacheError> {
        if self.namespace.len() >= MAX_KEY_LENGTH {
            return Err(CacheError::Config(format!(
                "namespace is {} bytes, leaving no room for keys",
                self.namespace.len()
            )));
        }
        if self
            .namespace
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(CacheError::Config(
                "namespace contains whitespace or control characters".to_string(),
            ));
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        self.backoff.validate()
    }

    /// Build a client that owns the given store.
    pub fn build(self, store: impl Store + 'static) -> Result<Client, CacheError> {
        self.validate()?;
        Ok(Client::new(
            self.namespace,
            self.codec,
            self.backoff,
            self.type_checks,
            Box::new(store),
        ))
    }

    /// Connect to memcached and build a client on top of it.
    ///
    /// `servers` is a comma, semicolon or whitespace separated list.
    pub async fn connect(self, servers: &str) -> Result<Client, CacheError> {
        self.validate()?;
        let store =
            MemcachedStore::connect(servers, self.credentials.clone(), self.store_config.clone())
                .await?;
        self.build(store)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
