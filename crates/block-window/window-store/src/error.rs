//! Error types for the indexed store.

/// Errors that can occur while reading or writing the index.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis connection or query error
    #[error("Redis error")]
    Redis(#[source] redis::RedisError),

    /// Failed to serialize an entry before writing it
    #[error("Failed to serialize {entity}")]
    Serialize {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Value under a key is not valid JSON for the expected entity
    #[error("Failed to deserialize value stored under '{key}'")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A key in the block family does not end in a block number
    #[error("Malformed block key '{0}'")]
    MalformedBlockKey(String),

    /// Entries must expire
    #[error("TTL must be greater than zero")]
    ZeroTtl,

    /// The blocking task driving a Redis command panicked or was cancelled
    #[error("Blocking Redis task failed")]
    Join(#[source] tokio::task::JoinError),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Redis(err)
    }
}
