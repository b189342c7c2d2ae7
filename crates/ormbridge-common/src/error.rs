//! Error types for ormbridge

use thiserror::Error;

/// Result type alias for ormbridge operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Unified error type for all adapter operations
///
/// Absence of a record is never an error: lookups return `Ok(None)` or an
/// empty list instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Malformed connection URL or settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Identifier string that is not a valid native identifier encoding,
    /// or a missing identifier where one is required
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Operator condition whose value has the wrong shape
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Failure reported by the database driver, message forwarded verbatim
    #[error("Driver error: {0}")]
    Driver(String),

    /// Initial connection or health check failure
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AdapterError {
    /// Returns true if the error comes from identifier normalization
    pub fn is_identifier_error(&self) -> bool {
        matches!(self, AdapterError::InvalidIdentifier(_))
    }

    /// Returns true if the error was reported by the driver
    pub fn is_driver_error(&self) -> bool {
        matches!(self, AdapterError::Driver(_) | AdapterError::Connection(_))
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for AdapterError {
    fn from(err: mongodb::error::Error) -> Self {
        AdapterError::Driver(err.to_string())
    }
}
