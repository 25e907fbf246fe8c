//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use integration_bridge::bootstrap::{ActivationOutcome, IntegrationModule};
use integration_bridge::config::{BridgeConfig, ModuleSettings};
use integration_bridge::health::{
    Compatibility, Connectivity, ProbeResult, ServiceHealthReport, ServiceHealthView,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Module that replays a script of outcomes, then activates
pub struct ScriptedModule {
    module_type: String,
    outcomes: Mutex<VecDeque<ActivationOutcome>>,
    pub activations: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl ScriptedModule {
    pub fn new(module_type: &str, outcomes: Vec<ActivationOutcome>) -> Arc<Self> {
        Arc::new(Self {
            module_type: module_type.to_string(),
            outcomes: Mutex::new(outcomes.into()),
            activations: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        })
    }

    pub fn activation_count(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntegrationModule for ScriptedModule {
    fn module_type(&self) -> &str {
        &self.module_type
    }

    async fn activate(&self, _module_id: &str) -> ActivationOutcome {
        self.activations.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or(ActivationOutcome::Activated)
    }

    async fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Module whose activation waits until the test releases it
pub struct GatedModule {
    module_type: String,
    pub release: tokio::sync::Notify,
    pub destroyed: AtomicUsize,
}

impl GatedModule {
    pub fn new(module_type: &str) -> Arc<Self> {
        Arc::new(Self {
            module_type: module_type.to_string(),
            release: tokio::sync::Notify::new(),
            destroyed: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl IntegrationModule for GatedModule {
    fn module_type(&self) -> &str {
        &self.module_type
    }

    async fn activate(&self, _module_id: &str) -> ActivationOutcome {
        self.release.notified().await;
        ActivationOutcome::Activated
    }

    async fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Module whose activation panics
pub struct PanickingModule;

#[async_trait]
impl IntegrationModule for PanickingModule {
    fn module_type(&self) -> &str {
        "jira"
    }

    async fn activate(&self, _module_id: &str) -> ActivationOutcome {
        panic!("activation exploded")
    }
}

/// Service view whose results tests can flip
pub struct FixedServices {
    results: Mutex<BTreeMap<String, ProbeResult>>,
}

impl FixedServices {
    pub fn up() -> Arc<Self> {
        let services = Arc::new(Self {
            results: Mutex::new(BTreeMap::new()),
        });
        services.set("pod", Connectivity::Up, Compatibility::Ok);
        services
    }

    pub fn set(&self, name: &str, connectivity: Connectivity, compatibility: Compatibility) {
        self.results.lock().insert(
            name.to_string(),
            ProbeResult {
                service_name: name.to_string(),
                connectivity,
                current_version: Some("1.45.0".to_string()),
                min_version: "1.45.0".to_string(),
                compatibility,
            },
        );
    }
}

#[async_trait]
impl ServiceHealthView for FixedServices {
    async fn service_health(&self) -> ServiceHealthReport {
        ServiceHealthReport::from_results(self.results.lock().clone())
    }
}

/// Configuration with the given module types provisioned and a fast poll
pub fn config_with_modules(types: &[&str]) -> BridgeConfig {
    let mut config = BridgeConfig {
        modules: types.iter().map(|t| ModuleSettings::provisioned(*t)).collect(),
        ..BridgeConfig::default()
    };
    config.bootstrap.poll_wait_ms = 10;
    config
}
