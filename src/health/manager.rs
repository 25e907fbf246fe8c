//! # Health Manager
//!
//! Owns the per-module status map and combines it with the service view into one
//! bridge-level verdict. The verdict is recomputed on every query:
//!
//! 1. Module view: `Down("no active integration")` unless at least one module is `Active`
//! 2. Service view: `Down("services unavailable")` if any probe is `Down` or incompatible
//!
//! The bridge is `Up` with message `"Success"` only when both views are up; otherwise the
//! message of the first failing view wins, module view first.
//!
//! ## Transitions
//!
//! [`HealthManager::update_module_status`] is last-writer-wins. The bootstrap path uses
//! the guarded transitions instead:
//!
//! | From \ To         | Active | Retrying | FailedBootstrap |
//! |-------------------|--------|----------|-----------------|
//! | Inactive          | yes    | yes      | yes             |
//! | Retrying          | yes    | yes      | yes             |
//! | Active            | yes    | no       | no              |
//! | FailedBootstrap   | no     | no       | yes             |

use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::aggregator::ServiceHealthView;
use super::types::{
    AggregateHealth, FlagValue, HealthStatus, ModuleFlags, ModuleRecord, ModuleStatus,
    ServiceHealthReport,
};

pub const SUCCESS_MESSAGE: &str = "Success";
pub const NO_ACTIVE_INTEGRATION: &str = "no active integration";
pub const SERVICES_UNAVAILABLE: &str = "services unavailable";

/// Bridge health state machine, shared by `Arc`
pub struct HealthManager {
    modules: DashMap<String, ModuleRecord>,
    services: Arc<dyn ServiceHealthView>,
    version: String,
}

impl std::fmt::Debug for HealthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthManager")
            .field("modules", &self.modules.len())
            .field("version", &self.version)
            .finish()
    }
}

impl HealthManager {
    pub fn new(services: Arc<dyn ServiceHealthView>) -> Self {
        Self {
            modules: DashMap::new(),
            services,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the reported bridge build version
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    // =========================================================================
    // Module Map
    // =========================================================================

    /// Insert or replace a module record
    pub fn update_module_status(&self, mut record: ModuleRecord) {
        record.last_updated = Utc::now();
        debug!(
            module_id = %record.id,
            status = %record.status,
            "Module status updated"
        );
        self.modules.insert(record.id.clone(), record);
    }

    /// Create an `Inactive` record unless one exists
    pub fn register_module(&self, module_id: &str, module_type: &str) {
        self.modules
            .entry(module_id.to_string())
            .or_insert_with(|| {
                ModuleRecord::new(module_id, module_type, ModuleStatus::Inactive, "")
            });
    }

    pub fn remove_module(&self, module_id: &str) -> Option<ModuleRecord> {
        let removed = self.modules.remove(module_id).map(|(_, record)| record);
        if removed.is_some() {
            info!(module_id = %module_id, "Module removed from health view");
        }
        removed
    }

    pub fn clear_modules(&self) {
        self.modules.clear();
    }

    pub fn module(&self, module_id: &str) -> Option<ModuleRecord> {
        self.modules.get(module_id).map(|r| r.value().clone())
    }

    pub fn modules(&self) -> BTreeMap<String, ModuleRecord> {
        self.modules
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    // =========================================================================
    // Guarded Transitions
    // =========================================================================

    /// Mark a module active; ignored once it has failed bootstrap
    pub fn mark_active(&self, module_id: &str, module_type: &str) -> bool {
        self.transition(module_id, module_type, |record| {
            if record.status == ModuleStatus::FailedBootstrap {
                return false;
            }
            record.status = ModuleStatus::Active;
            record.message = SUCCESS_MESSAGE.to_string();
            record.flags.user_authenticated = FlagValue::Ok;
            true
        })
    }

    /// Mark a module retrying after a recoverable failure
    pub fn mark_retrying(
        &self,
        module_id: &str,
        module_type: &str,
        attempt_count: u32,
        message: impl Into<String>,
    ) -> bool {
        let message = message.into();
        self.transition(module_id, module_type, |record| {
            if matches!(
                record.status,
                ModuleStatus::Active | ModuleStatus::FailedBootstrap
            ) {
                return false;
            }
            record.status = ModuleStatus::Retrying;
            record.message = message;
            record.attempt_count = attempt_count;
            true
        })
    }

    /// Mark a module as permanently failed; ignored once it is active
    pub fn mark_failed(&self, module_id: &str, module_type: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        self.transition(module_id, module_type, |record| {
            if record.status == ModuleStatus::Active {
                return false;
            }
            record.status = ModuleStatus::FailedBootstrap;
            record.message = message;
            true
        })
    }

    /// Mark a module inactive, e.g. after it was destroyed or has no implementation
    pub fn mark_inactive(&self, module_id: &str, module_type: &str, message: impl Into<String>) {
        let message = message.into();
        self.transition(module_id, module_type, |record| {
            record.status = ModuleStatus::Inactive;
            record.message = message;
            true
        });
    }

    fn transition<F>(&self, module_id: &str, module_type: &str, apply: F) -> bool
    where
        F: FnOnce(&mut ModuleRecord) -> bool,
    {
        let mut entry = self
            .modules
            .entry(module_id.to_string())
            .or_insert_with(|| {
                ModuleRecord::new(module_id, module_type, ModuleStatus::Inactive, "")
            });

        let previous = entry.status;
        let applied = apply(entry.value_mut());
        if applied {
            entry.last_updated = Utc::now();
            debug!(
                module_id = %module_id,
                from = %previous,
                to = %entry.status,
                "Module status transition"
            );
        } else {
            debug!(
                module_id = %module_id,
                status = %previous,
                "Module status transition ignored"
            );
        }
        applied
    }

    // =========================================================================
    // Module Detail
    // =========================================================================

    /// Reflect the module's circuit breaker state
    pub fn record_circuit_state(&self, module_id: &str, open: bool) {
        if let Some(mut record) = self.modules.get_mut(module_id) {
            record.circuit_open = open;
            record.last_updated = Utc::now();
        }
    }

    /// Record that a module's credentials were refused
    pub fn record_forbidden(&self, module_id: &str) {
        self.update_flags(module_id, |flags| flags.user_authenticated = FlagValue::Nok);
    }

    /// Record a successfully handled request
    pub fn record_post(&self, module_id: &str) {
        if let Some(mut record) = self.modules.get_mut(module_id) {
            record.latest_post_timestamp = Some(Utc::now());
        }
    }

    pub fn update_flags<F>(&self, module_id: &str, update: F)
    where
        F: FnOnce(&mut ModuleFlags),
    {
        if let Some(mut record) = self.modules.get_mut(module_id) {
            update(&mut record.flags);
            record.last_updated = Utc::now();
        }
    }

    // =========================================================================
    // Verdict
    // =========================================================================

    /// Recompute the full bridge health
    pub async fn health(&self) -> AggregateHealth {
        let modules = self.modules();
        let report = self.services.service_health().await;
        let (status, message) = Self::verdict(&modules, &report);

        AggregateHealth {
            status,
            message: message.to_string(),
            version: self.version.clone(),
            checked_at: Utc::now(),
            services: report.services,
            modules,
        }
    }

    pub async fn status(&self) -> HealthStatus {
        self.health().await.status
    }

    /// Requests are accepted only while the bridge is up
    pub async fn is_request_allowed(&self) -> bool {
        self.status().await == HealthStatus::Up
    }

    fn verdict(
        modules: &BTreeMap<String, ModuleRecord>,
        report: &ServiceHealthReport,
    ) -> (HealthStatus, &'static str) {
        if !modules.values().any(ModuleRecord::is_active) {
            return (HealthStatus::Down, NO_ACTIVE_INTEGRATION);
        }

        if !report.is_up() {
            return (HealthStatus::Down, SERVICES_UNAVAILABLE);
        }

        (HealthStatus::Up, SUCCESS_MESSAGE)
    }
}
