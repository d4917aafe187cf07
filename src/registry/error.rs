//! Registry error types

/// Error type for state registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No state exists for this device id
    UnknownDevice(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::UnknownDevice(id) => write!(f, "Unknown device: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
