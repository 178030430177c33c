use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::backoff::BackoffPolicy;
use crate::builder::ClientBuilder;
use crate::codec::{Codec, check_target, decode_into, decode_with, encode_with};
use crate::config::ClientConfig;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::build_cache_key;

/// Value a missing counter starts from.
pub const COUNTER_SEED: u64 = 1;

/// Typed facade over a [`Store`].
///
/// A client owns its store exclusively and prefixes every key with its
/// namespace before it reaches the store. Values go through the configured
/// [`Codec`], and every store call is wrapped individually in the client's
/// [`BackoffPolicy`].
///
/// All methods take `&self`; share a client between tasks with `Arc<Client>`.
pub struct Client {
    namespace: String,
    codec: Arc<dyn Codec>,
    backoff: BackoffPolicy,
    type_checks: bool,
    store: Box<dyn Store>,
}

impl Client {
    pub(crate) fn new(
        namespace: String,
        codec: Arc<dyn Codec>,
        backoff: BackoffPolicy,
        type_checks: bool,
        store: Box<dyn Store>,
    ) -> Self {
        Client {
            namespace,
            codec,
            backoff,
            type_checks,
            store,
        }
    }

    /// Start building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect to memcached using a [`ClientConfig`].
    pub async fn connect(config: &ClientConfig) -> Result<Self, CacheError> {
        ClientBuilder::from_config(config)
            .connect(&config.servers)
            .await
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn type_checks(&self) -> bool {
        self.type_checks
    }

    /// The underlying store, for commands this facade does not cover.
    ///
    /// Keys passed to the store directly are not namespaced.
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    fn full_key(&self, key: &str) -> String {
        build_cache_key(&self.namespace, key)
    }

    /// Check that `T` can receive values from this client's codec.
    pub(crate) fn check_target<T: DeserializeOwned>(&self) -> Result<(), CacheError> {
        if self.type_checks {
            check_target::<T>(self.codec.as_ref())?;
        }
        Ok(())
    }

    /// Fetch the raw stored value. A miss is [`CacheError::NotFound`].
    async fn fetch(&self, key: &str) -> Result<String, CacheError> {
        let full = self.full_key(key);
        self.backoff
            .retry("get", &full, || self.store.get(&full))
            .await?
            .ok_or_else(|| CacheError::not_found(key))
    }

    /// Encode and write a value with the given command.
    pub(crate) async fn write(
        &self,
        op: WriteOp,
        key: &str,
        raw: String,
        ttl: u32,
    ) -> Result<(), CacheError> {
        let full = self.full_key(key);
        self.backoff
            .retry(op.name(), &full, || {
                let raw = raw.clone();
                let full = full.as_str();
                async move {
                    match op {
                        WriteOp::Set => self.store.set(full, raw, ttl).await,
                        WriteOp::Add => self.store.add(full, raw, ttl).await,
                        WriteOp::Replace => self.store.replace(full, raw, ttl).await,
                    }
                }
            })
            .await
    }

    /// Return the decoded value stored under `key`.
    ///
    /// Fails with [`CacheError::NotFound`] on a miss. A stored empty value only
    /// decodes into types that accept `null`, such as `Option<_>`; see
    /// [`Client::get_into`] for reads that should treat it as a hit.
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned,
    {
        self.check_target::<T>()?;
        let raw = self.fetch(key).await?;
        decode_with(self.codec.as_ref(), &raw)
    }

    /// Decode the value stored under `key` into `out`.
    ///
    /// `out` is left untouched when the call fails. A stored empty value that
    /// `T` has no representation for is a hit that also leaves `out` as it was.
    pub async fn get_into<T>(&self, key: &str, out: &mut T) -> Result<(), CacheError>
    where
        T: DeserializeOwned,
    {
        self.check_target::<T>()?;
        let raw = self.fetch(key).await?;
        decode_into(self.codec.as_ref(), &raw, out)
    }

    /// Store `value` under `key`, unconditionally.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: u32) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let raw = encode_with(self.codec.as_ref(), value)?;
        self.write(WriteOp::Set, key, raw, ttl).await
    }

    /// Store `value` only if `key` is absent. Fails with [`CacheError::NotStored`] otherwise.
    pub async fn add<T>(&self, key: &str, value: &T, ttl: u32) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let raw = encode_with(self.codec.as_ref(), value)?;
        self.write(WriteOp::Add, key, raw, ttl).await
    }

    /// Store `value` only if `key` exists. Fails with [`CacheError::NotStored`] otherwise.
    pub async fn replace<T>(&self, key: &str, value: &T, ttl: u32) -> Result<(), CacheError>
    where
        T: Serialize + ?Sized,
    {
        let raw = encode_with(self.codec.as_ref(), value)?;
        self.write(WriteOp::Replace, key, raw, ttl).await
    }

    /// Whether `key` holds a value. A miss is `Ok(false)`, not an error.
    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        match self.fetch(key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Delete each key in order.
    ///
    /// Missing keys are skipped. Any other error stops the loop and is
    /// returned; later keys are not attempted.
    pub async fn delete(&self, keys: &[&str]) -> Result<(), CacheError> {
        for key in keys {
            let full = self.full_key(key);
            match self
                .backoff
                .retry("delete", &full, || self.store.delete(&full))
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Atomically add `delta` to the counter under `key` and return the new value.
    ///
    /// A missing counter starts at [`COUNTER_SEED`] with the given `ttl`.
    /// Overflow wraps at 64 bits.
    pub async fn inc(&self, key: &str, delta: u64, ttl: u32) -> Result<u64, CacheError> {
        let full = self.full_key(key);
        self.backoff
            .retry("increment", &full, || {
                self.store.increment(&full, delta, COUNTER_SEED, ttl)
            })
            .await
    }

    /// Atomically subtract `delta` from the counter under `key` and return the new value.
    ///
    /// A missing counter starts at [`COUNTER_SEED`] with the given `ttl`.
    /// The counter never goes below zero.
    pub async fn dec(&self, key: &str, delta: u64, ttl: u32) -> Result<u64, CacheError> {
        let full = self.full_key(key);
        self.backoff
            .retry("decrement", &full, || {
                self.store.decrement(&full, delta, COUNTER_SEED, ttl)
            })
            .await
    }

    /// Update the expiration of an existing key.
    pub async fn touch(&self, key: &str, ttl: u32) -> Result<(), CacheError> {
        let full = self.full_key(key);
        self.backoff
            .retry("touch", &full, || self.store.touch(&full, ttl))
            .await
    }

    /// Expire **every** item in the store.
    ///
    /// This is a global flush. It ignores the namespace and also wipes keys
    /// written by other clients sharing the same servers.
    pub async fn delete_all(&self) -> Result<(), CacheError> {
        tracing::debug!("Flushing store: store={}", self.store.name());
        self.backoff.retry("flush", "", || self.store.flush()).await
    }

    /// Round trip to the store.
    pub async fn ping(&self) -> Result<(), CacheError> {
        self.backoff.retry("noop", "", || self.store.noop()).await
    }

    /// Release the store connection.
    pub async fn close(self) -> Result<(), CacheError> {
        self.store.quit().await
    }
}

/// Write commands sharing the encode-then-store path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOp {
    Set,
    Add,
    Replace,
}

impl WriteOp {
    fn name(self) -> &'static str {
        match self {
            WriteOp::Set => "set",
            WriteOp::Add => "add",
            WriteOp::Replace => "replace",
        }
    }
}
