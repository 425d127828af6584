use thiserror::Error;

/// Errors surfaced while assembling or running a [`crate::gateway::Gateway`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("persistence error: {0}")]
    Persistence(#[from] adrelay_state::StateError),

    #[error("forwarder error: {0}")]
    Forward(#[from] adrelay_forwarder::ForwarderError),

    #[error("debounce error: {0}")]
    Debounce(#[from] adrelay_debounce::DebounceError),

    #[error("configuration error: {0}")]
    Configuration(String),
}
