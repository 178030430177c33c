//! Store implementations for the cache library.

pub mod memcached;
pub mod memory;

pub use memcached::{Credentials, MemcachedStore, StoreConfig};
pub use memory::{MemoryStore, MemoryStoreConfig};
