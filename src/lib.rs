#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Integration Bridge
//!
//! Runtime core for an integration bridge hosting pluggable integration modules.
//!
//! ## Overview
//!
//! Modules discovered at startup are activated by a periodic bootstrap scheduler that
//! retries recoverable failures. Each active module handles requests behind its own
//! circuit breaker. Dependent services are probed concurrently, with cached results and
//! minimum version checks, and the bridge publishes one aggregated health verdict.
//!
//! ## Module Organization
//!
//! - [`bootstrap`] - Retry tickets, the bootstrap registry and scheduler
//! - [`bridge`] - Assembly and lifecycle of the runtime
//! - [`cache`] - TTL cache with single-flight refresh
//! - [`config`] - Configuration loading and module provisioning
//! - [`error`] - Structured error handling
//! - [`health`] - Service probes, aggregation and the health state machine
//! - [`logging`] - Structured logging setup
//! - [`resilience`] - Per-module circuit breaking
//! - [`web`] - `GET /health` endpoint
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integration_bridge::bridge::IntegrationBridgeBuilder;
//! use integration_bridge::config::{BridgeConfig, ModuleSettings, ServiceProbeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig {
//!     services: vec![ServiceProbeConfig::new("pod", "http://pod:8080", "1.45.0")],
//!     modules: vec![ModuleSettings::provisioned("jiraWebHookIntegration")],
//!     ..BridgeConfig::default()
//! };
//!
//! let bridge = IntegrationBridgeBuilder::new(config).build()?;
//! bridge.start()?;
//!
//! let health = bridge.health().await;
//! assert_eq!(health.message, "no active integration");
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod resilience;
pub mod web;

pub use bootstrap::{ActivationOutcome, IntegrationModule, RetryPolicy};
pub use bridge::{IntegrationBridge, IntegrationBridgeBuilder};
pub use config::{BridgeConfig, ConfigManager};
pub use error::{BridgeError, BridgeResult};
pub use health::{AggregateHealth, HealthManager, HealthStatus};
pub use resilience::{GateError, RequestError, RequestGate};
