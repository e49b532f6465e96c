//! Error types for hostaudit.
//!
//! Uses `thiserror` for ergonomic error definitions. Transport errors
//! (`ScanError`) never escape a probe; they are absorbed into "no finding"
//! at the probe boundary. Input and configuration errors are surfaced to the
//! caller before any scanning begins.

use std::path::PathBuf;
use thiserror::Error;

/// Transport-level failure while talking to a target.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Connection to {target}:{port} failed: {reason}")]
    ConnectionFailed {
        target: String,
        port: u16,
        reason: String,
    },

    #[error("Connection timed out")]
    Timeout,

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for transport operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Invalid caller input, detected before the scan starts.
#[derive(Error, Debug)]
pub enum InputError {
    #[error(transparent)]
    Port(#[from] crate::types::PortError),

    #[error(transparent)]
    Target(#[from] crate::types::TargetError),

    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

/// Result type alias for input validation.
pub type InputResult<T> = Result<T, InputError>;

/// Settings file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine configuration directory")]
    DirectoryNotFound,

    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("Invalid settings format: {0}")]
    InvalidFormat(String),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortError;

    #[test]
    fn test_input_error_wraps_port_error() {
        let err: InputError = PortError::InvalidRange(100, 50).into();
        assert_eq!(err.to_string(), "invalid port range: start (100) > end (50)");
    }

    #[test]
    fn test_connection_failed_message() {
        let err = ScanError::ConnectionFailed {
            target: "10.0.0.1".to_string(),
            port: 22,
            reason: "reset".to_string(),
        };
        assert_eq!(err.to_string(), "Connection to 10.0.0.1:22 failed: reset");
    }
}
