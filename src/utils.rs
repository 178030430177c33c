//! Shared utilities for the cache library.

use std::time::{SystemTime, UNIX_EPOCH};

/// Largest key the memcached protocol accepts, in bytes.
pub const MAX_KEY_LENGTH: usize = 250;

/// Expirations above this many seconds are absolute Unix timestamps (30 days).
pub const RELATIVE_TTL_LIMIT: u32 = 60 * 60 * 24 * 30;

/// Build the key sent to the store from namespace and key.
///
/// Format: `{namespace}{key}`. The namespace is a plain prefix and is never
/// stripped again.
pub fn build_cache_key(namespace: &str, key: &str) -> String {
    let mut full = String::with_capacity(namespace.len() + key.len());
    full.push_str(namespace);
    full.push_str(key);
    full
}

/// Check a key against the memcached key rules.
///
/// Returns a description of the violation.
pub fn key_violation(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("key is empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "key is {} bytes, limit is {}",
            key.len(),
            MAX_KEY_LENGTH
        ));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Some("key contains whitespace or control characters".to_string());
    }
    None
}

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Resolve a memcached expiration into an absolute deadline in milliseconds.
///
/// `0` never expires, values up to 30 days are relative seconds, anything
/// larger is an absolute Unix timestamp in seconds.
pub fn expires_at_ms(ttl: u32, now_ms: i64) -> Option<i64> {
    match ttl {
        0 => None,
        secs if secs <= RELATIVE_TTL_LIMIT => Some(now_ms + i64::from(secs) * 1000),
        timestamp => Some(i64::from(timestamp) * 1000),
    }
}

/// Simple pseudo-random number generator (0.0 to 1.0).
/// This avoids adding a dependency on rand crate.
pub fn rand_simple() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
    );
    (hasher.finish() as f64) / (u64::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cache_key() {
        assert_eq!(build_cache_key("users_", "123"), "users_123");
        assert_eq!(build_cache_key("", "123"), "123");
    }

    #[test]
    fn test_key_violation() {
        assert!(key_violation("user:1").is_none());
        assert!(key_violation("").is_some());
        assert!(key_violation("has space").is_some());
        assert!(key_violation("line\nbreak").is_some());
        assert!(key_violation(&"k".repeat(MAX_KEY_LENGTH)).is_none());
        assert!(key_violation(&"k".repeat(MAX_KEY_LENGTH + 1)).is_some());
    }

    #[test]
    fn test_expires_at_ms() {
        let now = 1_000_000;
        assert_eq!(expires_at_ms(0, now), None);
        assert_eq!(expires_at_ms(10, now), Some(now + 10_000));
        assert_eq!(
            expires_at_ms(RELATIVE_TTL_LIMIT + 1, now),
            Some(i64::from(RELATIVE_TTL_LIMIT + 1) * 1000)
        );
    }

    #[test]
    fn test_rand_simple_in_range() {
        for _ in 0..100 {
            let r = rand_simple();
            assert!((0.0..=1.0).contains(&r));
        }
    }
}
