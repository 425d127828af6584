use thiserror::Error;

/// Errors from the request-log/event-log persistence backends.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request log not found for rid {0}")]
    NotFound(uuid::Uuid),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
