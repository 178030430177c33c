use async_trait::async_trait;

use crate::error::CacheError;

/// A store is the key-value backend a [`Client`](crate::Client) talks to.
///
/// Implementations speak memcached semantics: keys arrive already namespaced,
/// values are the codec's output, and `ttl` follows the memcached expiration
/// convention (`0` never expires, up to 30 days is relative seconds, larger
/// values are absolute Unix timestamps).
///
/// Misses on `get` are reported as `Ok(None)`. Every other command that needs
/// an existing item fails with [`CacheError::NotFound`], and rejected
/// conditional writes fail with [`CacheError::NotStored`]. Network failures
/// must be reported as [`CacheError::Transport`] so the client can retry them.
///
/// Stores must be usable from many tasks at once.
#[async_trait]
pub trait Store: Send + Sync {
    /// A name for logs and error messages.
    ///
    /// # Example
    /// - "memory"
    /// - "memcached"
    fn name(&self) -> &'static str;

    /// Return the stored value, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store the value unconditionally.
    async fn set(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError>;

    /// Store the value only if the key does not exist yet.
    async fn add(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError>;

    /// Store the value only if the key already exists.
    async fn replace(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError>;

    /// Remove the key.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Add `delta` to a counter and return the new value.
    ///
    /// A missing counter is created with `initial` and `ttl` and `initial` is
    /// returned. Overflow wraps around at 64 bits.
    async fn increment(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: u32,
    ) -> Result<u64, CacheError>;

    /// Subtract `delta` from a counter and return the new value.
    ///
    /// A missing counter is created with `initial` and `ttl`. The result never
    /// goes below zero.
    async fn decrement(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: u32,
    ) -> Result<u64, CacheError>;

    /// Update the expiration of an existing key.
    async fn touch(&self, key: &str, ttl: u32) -> Result<(), CacheError>;

    /// Expire every item in the store.
    async fn flush(&self) -> Result<(), CacheError>;

    /// Round trip to the store without side effects.
    async fn noop(&self) -> Result<(), CacheError>;

    /// Release the connection. No other call may follow.
    async fn quit(&self) -> Result<(), CacheError>;
}
