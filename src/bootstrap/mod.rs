//! # Bootstrap Module
//!
//! Discovery-to-activation pipeline for integration modules.
//!
//! ```text
//! discover() ──offer──► BootstrapRegistry ──poll──► BootstrapScheduler tick
//!                              ▲                          │ dispatch (bounded pool)
//!                              │                          ▼
//!                              └──── Retryable ──── IntegrationModule::activate
//!                                                         │
//!                                     Activated ──► ActiveModules + HealthManager
//! ```

pub mod directory;
pub mod module;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod ticket;

pub use directory::ActiveModules;
pub use module::{ActivationOutcome, FailureKind, IntegrationModule};
pub use policy::{Backoff, RetryPolicy};
pub use registry::BootstrapRegistry;
pub use scheduler::{BootstrapScheduler, TickSummary};
pub use ticket::RetryTicket;
