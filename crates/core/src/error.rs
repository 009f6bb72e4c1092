//! Error types shared by the renderer crates.

use thiserror::Error;

/// Main error type for configuration and host-side failures.
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration documents
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration values that parse but are out of range
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
