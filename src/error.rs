// src/error.rs
//! Error types for NMEA acquisition and fusion

use std::fmt;

pub type Result<T> = std::result::Result<T, FixError>;

#[derive(Debug)]
pub enum FixError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Config(String),
    /// `start()` or `enable_watchdog()` was called outside a tokio runtime.
    NoRuntime,
    /// `disable_watchdog()` was called while no watchdog was armed.
    WatchdogNotEnabled,
    /// A watchdog interval of zero, or one too large to represent.
    InvalidInterval(std::time::Duration),
    Other(String),
}

impl fmt::Display for FixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixError::Io(e) => write!(f, "IO error: {}", e),
            FixError::Serial(e) => write!(f, "Serial error: {}", e),
            FixError::Json(e) => write!(f, "JSON error: {}", e),
            FixError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FixError::NoRuntime => write!(f, "No tokio runtime available to spawn tasks on"),
            FixError::WatchdogNotEnabled => write!(f, "Watchdog is not enabled"),
            FixError::InvalidInterval(d) => write!(f, "Invalid watchdog interval: {:?}", d),
            FixError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for FixError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FixError::Io(e) => Some(e),
            FixError::Serial(e) => Some(e),
            FixError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FixError {
    fn from(error: std::io::Error) -> Self {
        FixError::Io(error)
    }
}

impl From<tokio_serial::Error> for FixError {
    fn from(error: tokio_serial::Error) -> Self {
        FixError::Serial(error)
    }
}

impl From<serde_json::Error> for FixError {
    fn from(error: serde_json::Error) -> Self {
        FixError::Json(error)
    }
}

impl From<tokio::runtime::TryCurrentError> for FixError {
    fn from(_: tokio::runtime::TryCurrentError) -> Self {
        FixError::NoRuntime
    }
}
