pub mod error;
pub mod loader;

pub use error::ConfigError;
pub use loader::{load_config, ConfigLoader, ConfigSource};
