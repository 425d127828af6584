use thiserror::Error;

/// Top-level error type for the `adrelay` core data model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A route, upstream, or downstream configuration reference could not be resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A value failed (de)serialization.
    #[error("serialization error: {0}")]
    Serialization(String),
}
