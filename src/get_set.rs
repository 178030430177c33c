//! Read-through cache population.
//!
//! [`Client::get_set`] looks a key up and, on a miss only, asks a callback for
//! the value, hands it to the caller and writes it back to the store.
//!
//! There is no locking between the miss and the write. Callers that miss the
//! same key at the same time will all run their callback and all write; the
//! last write wins. Nothing here protects the origin from a stampede.

use serde::{Serialize, de::DeserializeOwned};
use std::error::Error as StdError;
use std::future::Future;

use crate::client::{Client, WriteOp};
use crate::codec::{decode_with, encode_with};
use crate::error::CacheError;

/// Result of a GetSet compute callback.
///
/// `None` stands for a callback that produced nothing. The caller's output is
/// left as it was, and for [`Computed::Cache`] an empty value is still written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Computed<T> {
    /// Hand the value to the caller and write it to the store.
    Cache(Option<T>),
    /// Hand the value to the caller but do not write it.
    Skip(Option<T>),
}

impl<T> Computed<T> {
    pub fn cache(value: T) -> Self {
        Computed::Cache(Some(value))
    }

    pub fn skip(value: T) -> Self {
        Computed::Skip(Some(value))
    }

    /// Nothing to return, cache an empty value anyway.
    pub fn empty() -> Self {
        Computed::Cache(None)
    }

    pub fn should_cache(&self) -> bool {
        matches!(self, Computed::Cache(_))
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Computed::Cache(value) | Computed::Skip(value) => value,
        }
    }
}

impl Client {
    /// Get the value for `key` into `out`, computing and caching it on a miss.
    ///
    /// - Hit: `out` receives the cached value, `callback` is never called.
    /// - Any error other than a miss is returned as is; `callback` is not called.
    /// - Miss: `callback` runs once. Its error is returned as
    ///   [`CacheError::Callback`]. [`Computed::Skip`] fills `out` and returns
    ///   without touching the store. [`Computed::Cache`] fills `out` and writes
    ///   the value with `ttl`, returning the outcome of that write.
    ///
    /// With type checks enabled the computed value must survive the client's
    /// codec as `T`, otherwise [`CacheError::Type`] is returned before `out`
    /// or the store is touched.
    ///
    /// # Example
    /// ```ignore
    /// let mut user = User::default();
    /// cache.get_set("user:1", 60, &mut user, || async {
    ///     let user = db.load_user(1).await?;
    ///     Ok::<_, DbError>(Computed::cache(user))
    /// }).await?;
    /// ```
    pub async fn get_set<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: u32,
        out: &mut T,
        callback: F,
    ) -> Result<(), CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        match self.get_into(key, out).await {
            Ok(()) => return Ok(()),
            Err(err) if !err.is_not_found() => return Err(err),
            Err(_) => {}
        }

        tracing::debug!(
            "Cache miss, computing value: namespace={}, key={}",
            self.namespace(),
            key
        );

        let computed = callback().await.map_err(CacheError::callback)?;

        let value = match computed {
            Computed::Skip(value) => {
                if let Some(value) = value {
                    *out = value;
                }
                tracing::debug!(
                    "Computed value not cached: namespace={}, key={}",
                    self.namespace(),
                    key
                );
                return Ok(());
            }
            Computed::Cache(value) => value,
        };

        let encoded = encode_with(self.codec(), &value);

        if self.type_checks() && value.is_some() {
            let raw = encoded.as_ref().map_err(|e| e.clone())?;
            decode_with::<T>(self.codec(), raw).map_err(|e| {
                CacheError::Type(format!(
                    "computed value does not fit {}: {}",
                    std::any::type_name::<T>(),
                    e
                ))
            })?;
        }

        if let Some(value) = value {
            *out = value;
        }

        let raw = encoded?;
        self.write(WriteOp::Set, key, raw, ttl).await?;

        tracing::debug!(
            "Cache populated: namespace={}, key={}, ttl={}",
            self.namespace(),
            key,
            ttl
        );
        Ok(())
    }

    /// Like [`Client::get_set`], but returns the value.
    ///
    /// Starts from `T::default()`, which is also what comes back when the
    /// callback produced nothing.
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: u32,
        callback: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>, E>>,
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let mut out = T::default();
        self.get_set(key, ttl, &mut out, callback).await?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ClientBuilder;
    use crate::codec::StringCodec;
    use crate::stores::memory::{MemoryStore, MemoryStoreConfig};
    use serde::Deserialize;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: String,
        b: i64,
    }

    fn sample(a: &str, b: i64) -> Sample {
        Sample { a: a.into(), b }
    }

    fn client() -> Client {
        ClientBuilder::new()
            .namespace("test_")
            .build(MemoryStore::new(MemoryStoreConfig::default()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_miss_computes_and_caches() {
        let cache = client();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut out = Sample::default();
        let counter = calls.clone();
        cache
            .get_set("missing", 10, &mut out, || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Computed::cache(sample("x", 1)))
            })
            .await
            .unwrap();

        assert_eq!(out, sample("x", 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get::<Sample>("missing").await.unwrap(), sample("x", 1));

        // Second call is a hit
        let mut again = Sample::default();
        let counter = calls.clone();
        cache
            .get_set("missing", 10, &mut again, || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Computed::cache(sample("y", 2)))
            })
            .await
            .unwrap();

        assert_eq!(again, sample("x", 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hit_never_calls_back_or_writes() {
        let cache = client();
        cache.set("k", &sample("cached", 1), 0).await.unwrap();
        let before = cache.store().get("test_k").await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut out = Sample::default();
        let counter = calls.clone();
        cache
            .get_set("k", 10, &mut out, || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Computed::cache(sample("new", 2)))
            })
            .await
            .unwrap();

        assert_eq!(out, sample("cached", 1));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.store().get("test_k").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_skip_fills_out_without_caching() {
        let cache = client();

        let mut out = Sample::default();
        cache
            .get_set("k", 10, &mut out, || async {
                Ok::<_, Infallible>(Computed::skip(sample("temp", 3)))
            })
            .await
            .unwrap();

        assert_eq!(out, sample("temp", 3));
        assert!(cache.get::<Sample>("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_skip_with_nothing_keeps_out() {
        let cache = client();

        let mut out = sample("untouched", 9);
        cache
            .get_set("k", 10, &mut out, || async {
                Ok::<_, Infallible>(Computed::Skip(None))
            })
            .await
            .unwrap();

        assert_eq!(out, sample("untouched", 9));
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_callback_error_propagates() {
        let cache = client();

        let mut out = Sample::default();
        let err = cache
            .get_set("k", 10, &mut out, || async {
                Err::<Computed<Sample>, _>(std::io::Error::other("db down"))
            })
            .await
            .unwrap_err();

        match &err {
            CacheError::Callback(source) => assert_eq!(source.to_string(), "db down"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(out, Sample::default());
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_value_keeps_out_and_still_writes() {
        let cache = client();

        let mut out = Sample::default();
        cache
            .get_set("k", 10, &mut out, || async {
                Ok::<_, Infallible>(Computed::<Sample>::empty())
            })
            .await
            .unwrap();

        assert_eq!(out, Sample::default());
        assert_eq!(
            cache.store().get("test_k").await.unwrap().as_deref(),
            Some("null")
        );
    }

    #[tokio::test]
    async fn test_cached_empty_value_is_a_hit() {
        let cache = client();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut out = Sample::default();
        cache
            .get_set("k", 10, &mut out, || async {
                Ok::<_, Infallible>(Computed::<Sample>::empty())
            })
            .await
            .unwrap();

        let mut again = sample("caller", 4);
        let counter = calls.clone();
        cache
            .get_set("k", 10, &mut again, || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Computed::cache(sample("x", 1)))
            })
            .await
            .unwrap();

        assert_eq!(again, sample("caller", 4));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            cache.store().get("test_k").await.unwrap().as_deref(),
            Some("null")
        );
    }

    #[tokio::test]
    async fn test_get_error_other_than_miss_skips_callback() {
        let cache = client();
        let calls = Arc::new(AtomicUsize::new(0));

        // The store refuses keys with whitespace
        let mut out = Sample::default();
        let counter = calls.clone();
        let err = cache
            .get_set("bad key", 10, &mut out, || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Computed::cache(sample("x", 1)))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Server { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecodable_cached_value_is_returned() {
        let cache = client();
        cache
            .store()
            .set("test_k", "not json".into(), 0)
            .await
            .unwrap();

        let mut out = Sample::default();
        let err = cache
            .get_set("k", 10, &mut out, || async {
                Ok::<_, Infallible>(Computed::cache(sample("x", 1)))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Serialization(_)));
    }

    fn checked_string_client() -> Client {
        ClientBuilder::new()
            .codec(StringCodec)
            .type_checks(true)
            .build(MemoryStore::new(MemoryStoreConfig::default()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_type_checks_reject_target_before_callback() {
        let cache = checked_string_client();
        let calls = Arc::new(AtomicUsize::new(0));

        // u8 cannot receive what the string codec produces
        let mut out: u8 = 0;
        let counter = calls.clone();
        let err = cache
            .get_set("k", 10, &mut out, || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(Computed::cache(5u8))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Type(_)));
        assert_eq!(out, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(untagged)]
    enum Flex {
        Text(String),
        Number(u64),
    }

    #[tokio::test]
    async fn test_type_checks_reject_value_before_mutation() {
        let cache = checked_string_client();

        // Flex accepts strings, so the lookup goes ahead, but this value
        // cannot be written by the string codec.
        let mut out = Flex::Text("initial".into());
        let err = cache
            .get_set("k", 10, &mut out, || async {
                Ok::<_, Infallible>(Computed::cache(Flex::Number(5)))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Type(_)));
        assert_eq!(out, Flex::Text("initial".into()));
        assert!(!cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_type_checks_pass_for_matching_value() {
        let cache = checked_string_client();

        let mut out = Flex::Text(String::new());
        cache
            .get_set("k", 10, &mut out, || async {
                Ok::<_, Infallible>(Computed::cache(Flex::Text("hello".into())))
            })
            .await
            .unwrap();

        assert_eq!(out, Flex::Text("hello".into()));
        assert_eq!(
            cache.store().get("k").await.unwrap().as_deref(),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn test_get_or_compute() {
        let cache = client();

        let value: Sample = cache
            .get_or_compute("k", 10, || async {
                Ok::<_, Infallible>(Computed::cache(sample("x", 1)))
            })
            .await
            .unwrap();
        assert_eq!(value, sample("x", 1));

        let value: Sample = cache
            .get_or_compute("k", 10, || async {
                Ok::<_, Infallible>(Computed::cache(sample("y", 2)))
            })
            .await
            .unwrap();
        assert_eq!(value, sample("x", 1));
    }

    #[test]
    fn test_computed_helpers() {
        assert!(Computed::cache(1).should_cache());
        assert!(!Computed::skip(1).should_cache());
        assert_eq!(Computed::<u8>::empty().into_value(), None);
        assert_eq!(Computed::skip(4).into_value(), Some(4));
    }
}
