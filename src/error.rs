//! Error types for the integration bridge runtime.
//!

use thiserror::Error;

use crate::config::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Module {0} is already registered")]
    DuplicateModule(String),
    #[error("Unknown module: {0}")]
    UnknownModule(String),
    #[error("Module {module_id} is unavailable: {reason}")]
    ModuleUnavailable { module_id: String, reason: String },
    #[error("Health probe failed for {service}: {reason}")]
    ProbeError { service: String, reason: String },
    #[error("HTTP transport error: {0}")]
    HttpError(String),
    #[error("Timeout error: {0}")]
    Timeout(String),
    #[error("Cache lock for {key} not acquired and no cached value available")]
    CacheLockTimeout { key: String },
    #[error("Bridge is shutting down")]
    ShuttingDown,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ConfigurationError> for BridgeError {
    fn from(error: ConfigurationError) -> Self {
        BridgeError::ConfigurationError(error.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BridgeError::Timeout(error.to_string())
        } else {
            BridgeError::HttpError(error.to_string())
        }
    }
}

impl BridgeError {
    /// Connectivity-class failures are retried by the bootstrap path.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, BridgeError::HttpError(_) | BridgeError::Timeout(_))
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
