//! memcache-getset - A typed convenience layer over memcached for Rust
//!
//! This library provides:
//! - Typed get/set/delete/increment operations with per-client namespacing
//! - A read-through `get_set` that computes and caches values on a miss
//! - Pluggable value encoding (JSON by default, raw strings on request)
//! - Bounded exponential retry around every network call
//!
//! # Example
//!
//! ```ignore
//! use memcache_getset::{ClientBuilder, Computed};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = ClientBuilder::new()
//!         .namespace("users_")
//!         .connect("localhost:11211")
//!         .await?;
//!
//!     // Read-through: the callback only runs on a miss
//!     let mut name = String::new();
//!     cache
//!         .get_set("123", 60, &mut name, || async {
//!             // Load from database
//!             Ok::<_, std::io::Error>(Computed::cache("Alice".to_string()))
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! `get_set` does not coordinate concurrent callers: on simultaneous misses
//! every caller computes and writes, and the last write wins.

mod backoff;
mod builder;
mod client;
pub mod codec;
mod config;
mod error;
mod get_set;
mod store;
pub mod stores;
mod utils;

// Re-export public API
pub use backoff::BackoffPolicy;
pub use builder::ClientBuilder;
pub use client::{COUNTER_SEED, Client};
pub use codec::{Codec, JsonCodec, StringCodec};
pub use config::{ClientConfig, DEFAULT_SERVERS};
pub use error::{CacheError, Result};
pub use get_set::Computed;
pub use store::Store;
pub use stores::memcached::{Credentials, MemcachedStore, StoreConfig};
pub use stores::memory::{MemoryStore, MemoryStoreConfig};
pub use utils::MAX_KEY_LENGTH;
