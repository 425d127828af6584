use thiserror::Error;

/// Errors from the Redis-backed debounce manager.
#[derive(Debug, Error)]
pub enum DebounceError {
    #[error("redis connection error: {0}")]
    Connection(String),

    #[error("redis command error: {0}")]
    Backend(String),

    #[error("job serialization error: {0}")]
    Serialization(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),
}
