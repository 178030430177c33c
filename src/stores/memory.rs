use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::store::Store;
use crate::utils::{expires_at_ms, key_violation, now_ms};

/// Configuration for MemoryStore.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfig {
    /// Keep at most this many items.
    ///
    /// Checked on every write: expired items go first, then the items closest
    /// to expiring. Items without expiration are evicted last.
    pub max_items: Option<usize>,
}

/// Internal stored item with expiration time.
#[derive(Clone)]
struct Item {
    value: String,
    expires: Option<i64>,
}

impl Item {
    fn is_live(&self, now: i64) -> bool {
        self.expires.is_none_or(|at| at > now)
    }
}

/// Thread-safe in-process store with memcached semantics.
///
/// Useful for tests, local development and embedding. Keys are validated the
/// way memcached validates them, counters wrap on overflow and clamp at zero,
/// and `flush` drops everything.
pub struct MemoryStore {
    state: RwLock<HashMap<String, Item>>,
    max_items: Option<usize>,
}

impl MemoryStore {
    /// Create a new MemoryStore with the given configuration.
    pub fn new(config: MemoryStoreConfig) -> Self {
        MemoryStore {
            state: RwLock::new(HashMap::new()),
            max_items: config.max_items,
        }
    }

    /// Number of live items.
    pub async fn len(&self) -> usize {
        let now = now_ms();
        let state = self.state.read().await;
        state.values().filter(|item| item.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_key(&self, key: &str) -> Result<(), CacheError> {
        match key_violation(key) {
            Some(reason) => Err(CacheError::server(self.name(), key, reason)),
            None => Ok(()),
        }
    }

    /// Store an item, evicting if over capacity.
    fn insert(&self, state: &mut HashMap<String, Item>, key: &str, value: String, ttl: u32) {
        let now = now_ms();
        state.insert(
            key.to_string(),
            Item {
                value,
                expires: expires_at_ms(ttl, now),
            },
        );

        let Some(max_items) = self.max_items else {
            return;
        };
        if state.len() <= max_items {
            return;
        }

        // First delete all expired entries
        state.retain(|_, item| item.is_live(now));

        // If still over max_items, remove the soonest to expire
        if state.len() > max_items {
            let mut entries: Vec<_> = state
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, item)| (k.clone(), item.expires.unwrap_or(i64::MAX)))
                .collect();
            entries.sort_by_key(|(_, expires)| *expires);

            let to_remove = state.len() - max_items;
            for (k, _) in entries.into_iter().take(to_remove) {
                state.remove(&k);
            }
        }
    }

    /// Apply `f` to a live counter, or seed it with `initial`.
    async fn adjust(
        &self,
        key: &str,
        initial: u64,
        ttl: u32,
        f: impl FnOnce(u64) -> u64,
    ) -> Result<u64, CacheError> {
        self.check_key(key)?;
        let mut state = self.state.write().await;
        let now = now_ms();

        let live = state.get_mut(key).filter(|item| item.is_live(now));
        let Some(item) = live else {
            self.insert(&mut state, key, initial.to_string(), ttl);
            return Ok(initial);
        };

        let current: u64 = item.value.trim_end().parse().map_err(|_| {
            CacheError::server(
                self.name(),
                key,
                "cannot increment or decrement non-numeric value",
            )
        })?;
        let next = f(current);
        item.value = next.to_string();
        Ok(next)
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_key(key)?;
        let state = self.state.read().await;

        let Some(item) = state.get(key) else {
            return Ok(None);
        };

        if !item.is_live(now_ms()) {
            // Item is expired, remove it
            drop(state);
            let mut state = self.state.write().await;
            state.remove(key);
            return Ok(None);
        }

        Ok(Some(item.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError> {
        self.check_key(key)?;
        let mut state = self.state.write().await;
        self.insert(&mut state, key, value, ttl);
        Ok(())
    }

    async fn add(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError> {
        self.check_key(key)?;
        let mut state = self.state.write().await;

        if state.get(key).is_some_and(|item| item.is_live(now_ms())) {
            return Err(CacheError::not_stored(key));
        }
        self.insert(&mut state, key, value, ttl);
        Ok(())
    }

    async fn replace(&self, key: &str, value: String, ttl: u32) -> Result<(), CacheError> {
        self.check_key(key)?;
        let mut state = self.state.write().await;

        if !state.get(key).is_some_and(|item| item.is_live(now_ms())) {
            return Err(CacheError::not_stored(key));
        }
        self.insert(&mut state, key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_key(key)?;
        let mut state = self.state.write().await;

        match state.remove(key) {
            Some(item) if item.is_live(now_ms()) => Ok(()),
            _ => Err(CacheError::not_found(key)),
        }
    }

    async fn increment(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: u32,
    ) -> Result<u64, CacheError> {
        self.adjust(key, initial, ttl, |current| current.wrapping_add(delta))
            .await
    }

    async fn decrement(
        &self,
        key: &str,
        delta: u64,
        initial: u64,
        ttl: u32,
    ) -> Result<u64, CacheError> {
        self.adjust(key, initial, ttl, |current| current.saturating_sub(delta))
            .await
    }

    async fn touch(&self, key: &str, ttl: u32) -> Result<(), CacheError> {
        self.check_key(key)?;
        let mut state = self.state.write().await;
        let now = now_ms();

        match state.get_mut(key).filter(|item| item.is_live(now)) {
            Some(item) => {
                item.expires = expires_at_ms(ttl, now);
                Ok(())
            }
            None => Err(CacheError::not_found(key)),
        }
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.state.write().await.clear();
        Ok(())
    }

    async fn noop(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn quit(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
