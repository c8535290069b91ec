//! Error types for the Bruteguard throttling engine.

use thiserror::Error;

/// Main error type for Bruteguard operations.
#[derive(Error, Debug)]
pub enum BruteGuardError {
    /// No entry store backend was supplied when building the engine
    #[error("Missing dependency: {0}")]
    DependencyMissing(String),

    /// A configuration value could not be read as its expected type
    #[error(
        "Invalid value for configuration BruteGuard->{key}. Value \"{value}\" has to be of type {expected}"
    )]
    ConfigurationInvalid {
        key: String,
        expected: &'static str,
        value: String,
    },

    /// The configuration document itself could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The entry store failed to read or write a record
    #[error("Store error: {0}")]
    Store(String),

    /// Shared cache payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Bruteguard operations.
pub type Result<T> = std::result::Result<T, BruteGuardError>;
