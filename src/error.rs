use std::error::Error as StdError;
use std::sync::Arc;

/// Error type for cache operations.
///
/// Variants are matched structurally. Everything except [`CacheError::Transport`]
/// is permanent and is never retried by the backoff policy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The key has no value in the store.
    #[error("key not found: '{key}'")]
    NotFound { key: String },

    /// A conditional write (add, replace) was rejected by the store.
    #[error("item not stored: '{key}'")]
    NotStored { key: String },

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A value or target type was rejected by the type checks or the codec.
    #[error("Type error: {0}")]
    Type(String),

    /// Network or protocol failure talking to the store.
    #[error("[{store}] transport error for key '{key}': {message}")]
    Transport {
        store: String,
        key: String,
        message: String,
    },

    /// The store understood the command but refused it.
    #[error("[{store}] server error for key '{key}': {message}")]
    Server {
        store: String,
        key: String,
        message: String,
    },

    /// The client was configured with invalid options.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A GetSet compute callback failed.
    #[error("callback failed: {0}")]
    Callback(#[source] Arc<dyn StdError + Send + Sync>),
}

impl CacheError {
    /// Create a new not-found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        CacheError::NotFound { key: key.into() }
    }

    /// Create a new not-stored error.
    pub fn not_stored(key: impl Into<String>) -> Self {
        CacheError::NotStored { key: key.into() }
    }

    /// Create a new transport error.
    pub fn transport(
        store: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Transport {
            store: store.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new server error.
    pub fn server(
        store: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Server {
            store: store.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Wrap an error returned by a compute callback.
    pub fn callback(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        CacheError::Callback(Arc::from(err.into()))
    }

    /// Whether retrying the operation could change the outcome.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, CacheError::Transport { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
