//! Error types for pixelflood

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, FloodError>;

/// pixelflood error types
#[derive(Error, Debug)]
pub enum FloodError {
    /// I/O error (sockets, files, thread spawn)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image could not be opened or decoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Wire line that is not a valid draw command
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for FloodError {
    fn from(e: toml::de::Error) -> Self {
        FloodError::Config(e.to_string())
    }
}
