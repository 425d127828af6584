//! The `adrelay` HTTP server: wires a [`adrelay_gateway::Gateway`] to axum,
//! exposing `/v1/track`, `/cb`, `/healthz`, and an OpenAPI/swagger-ui pair.

pub mod api;
pub mod config;
pub mod error;
pub mod state_factory;

pub use config::AdrelayServerConfig;
pub use error::ServerError;
