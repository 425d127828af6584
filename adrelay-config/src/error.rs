use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("main config missing required field(s): {0}")]
    MissingField(String),

    #[error("{kind} id '{id}' is declared more than once")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{kind} config id mismatch: declared '{declared}', file declares '{actual}'")]
    IdMismatch {
        kind: &'static str,
        declared: String,
        actual: String,
    },

    #[error("route references unloaded upstream '{upstream_id}' (loaded: {loaded})")]
    DanglingUpstreamReference { upstream_id: String, loaded: String },

    #[error("required {kind} config '{id}' not found at {location}")]
    RequiredConfigMissing {
        kind: &'static str,
        id: String,
        location: String,
    },

    #[error("no configuration source available: set CONFIG_DIR, create ./config/main.yaml, or set MAIN_CONFIG_URL")]
    NoSourceAvailable,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML from {source_desc}: {source}")]
    Yaml {
        source_desc: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("failed to fetch remote config from {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}
