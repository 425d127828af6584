use thiserror::Error;

/// Errors surfaced by the HTTP forwarder and the outbound adapter.
#[derive(Debug, Error)]
pub enum ForwarderError {
    #[error("upstream {0} not found")]
    UpstreamNotFound(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] adrelay_state::StateError),
}
