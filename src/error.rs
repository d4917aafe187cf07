//! Error types
//!
//! Crate-wide error and result types. Per-device and per-message failures are
//! logged where they happen and never reach these types; only startup
//! configuration problems and handle misuse are surfaced as errors.

use std::path::PathBuf;

use crate::registry::RegistryError;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Startup configuration is missing or invalid
    Config(ConfigError),
    /// I/O error
    Io(std::io::Error),
    /// Transport (pub/sub session) error
    Transport(String),
    /// State registry error
    Registry(RegistryError),
    /// The monitor loop has stopped and no longer accepts commands
    MonitorClosed,
}

/// Startup configuration errors
///
/// These are fatal: they abort startup before any device connection is attempted.
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Configuration file is not valid JSON for the expected shape
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// No devices configured
    NoDevices,
    /// Two device records share an id
    DuplicateDevice(String),
    /// A required device field is empty
    MissingField {
        device: String,
        field: &'static str,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::MonitorClosed => write!(f, "Monitor is not running"),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
            ConfigError::NoDevices => write!(f, "no devices configured"),
            ConfigError::DuplicateDevice(id) => write!(f, "duplicate device id: {}", id),
            ConfigError::MissingField { device, field } => {
                write!(f, "device {} is missing required field '{}'", device, field)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Transport(_) | Error::MonitorClosed => None,
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}
