//! Integration module contract used by the bootstrap scheduler.

use async_trait::async_trait;
use std::fmt;

use crate::error::BridgeError;

/// Why a recoverable activation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network or backend availability problem
    Connectivity,
    /// The module explicitly asked to be retried
    Retry,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connectivity => write!(f, "connectivity"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

/// Result of one activation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Activated,
    /// Re-enqueue the ticket and try again on a later tick
    Retryable { cause: String, kind: FailureKind },
    /// Abandon the ticket
    Fatal { cause: String },
}

impl ActivationOutcome {
    pub fn connectivity(cause: impl Into<String>) -> Self {
        Self::Retryable {
            cause: cause.into(),
            kind: FailureKind::Connectivity,
        }
    }

    pub fn retry(cause: impl Into<String>) -> Self {
        Self::Retryable {
            cause: cause.into(),
            kind: FailureKind::Retry,
        }
    }

    pub fn fatal(cause: impl Into<String>) -> Self {
        Self::Fatal {
            cause: cause.into(),
        }
    }

    /// Classify a crate error: connectivity failures are retryable, everything else is fatal
    pub fn from_error(error: &BridgeError) -> Self {
        if error.is_connectivity() {
            Self::connectivity(error.to_string())
        } else {
            Self::fatal(error.to_string())
        }
    }
}

impl From<Result<(), BridgeError>> for ActivationOutcome {
    fn from(result: Result<(), BridgeError>) -> Self {
        match result {
            Ok(()) => Self::Activated,
            Err(error) => Self::from_error(&error),
        }
    }
}

/// A pluggable integration activated by the bridge
#[async_trait]
pub trait IntegrationModule: Send + Sync {
    /// Configuration type this module implements
    fn module_type(&self) -> &str;

    /// Authenticate and register the module
    async fn activate(&self, module_id: &str) -> ActivationOutcome;

    /// Release resources held by an active module
    async fn destroy(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let outcome = ActivationOutcome::from_error(&BridgeError::HttpError("refused".to_string()));
        assert!(matches!(
            outcome,
            ActivationOutcome::Retryable {
                kind: FailureKind::Connectivity,
                ..
            }
        ));

        let outcome = ActivationOutcome::from(Err(BridgeError::InvalidConfiguration(
            "missing token".to_string(),
        )));
        assert!(matches!(outcome, ActivationOutcome::Fatal { .. }));

        assert_eq!(ActivationOutcome::from(Ok(())), ActivationOutcome::Activated);
    }
}
