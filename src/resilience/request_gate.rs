//! # Request Gate
//!
//! Front door for module request handling. The handler only runs while the module's
//! circuit is closed; forbidden and stop-sending failures open the circuit.

use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::circuit_breaker::ModuleCircuitBreaker;
use crate::error::BridgeError;
use crate::health::HealthManager;

/// Failure reported by a module request handler
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError<E> {
    /// The backend refused the module's credentials
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The module asked to stop receiving traffic, e.g. it was disabled
    #[error("stop sending: {0}")]
    StopSending(String),

    /// Any other handler failure; does not affect the circuit
    #[error("{0}")]
    Failed(E),
}

/// Errors returned by [`RequestGate::call`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError<E> {
    /// The circuit is open and the handler was not invoked
    #[error("module {module_id} is unavailable: {reason}")]
    Unavailable { module_id: String, reason: String },

    /// The handler was refused by the backend; the circuit is now open
    #[error("module {module_id} was forbidden: {reason}")]
    Forbidden { module_id: String, reason: String },

    /// The handler signalled stop-sending; the circuit is now open
    #[error("module {module_id} stopped sending: {reason}")]
    StopSending { module_id: String, reason: String },

    #[error("request handler failed: {0}")]
    Handler(E),
}

impl<E> GateError<E> {
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<GateError<BridgeError>> for BridgeError {
    fn from(error: GateError<BridgeError>) -> Self {
        match error {
            GateError::Unavailable { module_id, reason }
            | GateError::Forbidden { module_id, reason }
            | GateError::StopSending { module_id, reason } => {
                BridgeError::ModuleUnavailable { module_id, reason }
            }
            GateError::Handler(inner) => inner,
        }
    }
}

/// Circuit-guarded entry point for one module's request handling
#[derive(Debug, Clone)]
pub struct RequestGate {
    breaker: Arc<ModuleCircuitBreaker>,
    health: Arc<HealthManager>,
}

impl RequestGate {
    pub fn new(breaker: Arc<ModuleCircuitBreaker>, health: Arc<HealthManager>) -> Self {
        Self { breaker, health }
    }

    pub fn module_id(&self) -> &str {
        self.breaker.module_id()
    }

    pub fn breaker(&self) -> &Arc<ModuleCircuitBreaker> {
        &self.breaker
    }

    /// Run `operation` unless the circuit is open
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RequestError<E>>>,
    {
        let module_id = self.module_id().to_string();

        if !self.breaker.is_closed() {
            let reason = match self.breaker.snapshot().remaining_open {
                Some(remaining) => format!("circuit open for another {}ms", remaining.as_millis()),
                None => "circuit open".to_string(),
            };
            debug!(module_id = %module_id, "Request rejected, circuit open");
            return Err(GateError::Unavailable { module_id, reason });
        }

        match operation().await {
            Ok(value) => {
                self.health.record_post(&module_id);
                Ok(value)
            }
            Err(RequestError::Forbidden(reason)) => {
                warn!(module_id = %module_id, reason = %reason, "Module request forbidden");
                self.health.record_forbidden(&module_id);
                self.breaker.open(&reason);
                Err(GateError::Forbidden { module_id, reason })
            }
            Err(RequestError::StopSending(reason)) => {
                warn!(module_id = %module_id, reason = %reason, "Module requested stop sending");
                self.breaker.open(&reason);
                Err(GateError::StopSending { module_id, reason })
            }
            Err(RequestError::Failed(error)) => Err(GateError::Handler(error)),
        }
    }
}
