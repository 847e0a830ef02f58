//! Error types shared by the suite

use thiserror::Error;

/// Result type alias using the common Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building configuration, logging or test data
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidEnvValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Unknown environment profile: {0}")]
    UnknownEnvironment(String),

    #[error("Logging already initialized")]
    LoggingInitialized,
}
