//! # Error Types
//!
//! Custom error types for Servo Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Servo Bridge
#[derive(Debug, Error)]
pub enum ServoBridgeError {
    /// Channel id or channel value outside its domain
    #[error("Out of range: {0}")]
    Range(String),

    /// Caller supplied an argument the engine cannot act on
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation needs an open link
    #[error("Link is not connected")]
    NotConnected,

    /// REPL token could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Telemetry was disabled for this engine
    #[error("Telemetry is disabled")]
    TelemetryDisabled,

    /// A configured wait expired
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Servo Bridge
pub type Result<T> = std::result::Result<T, ServoBridgeError>;
