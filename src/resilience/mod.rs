//! # Resilience Module
//!
//! Per-module circuit breaking for request handling.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use integration_bridge::resilience::{ModuleCircuitBreaker, RequestError, RequestGate};
//! # use integration_bridge::health::HealthManager;
//! # use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(health: Arc<HealthManager>) {
//! let breaker = ModuleCircuitBreaker::with_health_manager(
//!     "jira-1",
//!     Duration::from_secs(10),
//!     Arc::clone(&health),
//! );
//! let gate = RequestGate::new(breaker, health);
//!
//! let result = gate
//!     .call(|| async {
//!         // Forward the webhook payload here
//!         Ok::<_, RequestError<String>>("posted")
//!     })
//!     .await;
//! # }
//! ```

pub mod circuit_breaker;
pub mod request_gate;

pub use circuit_breaker::{CircuitSnapshot, CircuitState, ModuleCircuitBreaker};
pub use request_gate::{GateError, RequestError, RequestGate};
