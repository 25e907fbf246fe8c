//! # Integration Bridge
//!
//! Assembles the runtime from configuration and owns its lifecycle.
//!
//! ```text
//! IntegrationBridgeBuilder
//!   ├── TtlCache ─► ServiceHealthProbe* ─► CompositeProbeAggregator
//!   ├── HealthManager (service view + module map)
//!   ├── BootstrapRegistry ◄─ discover()
//!   ├── BootstrapScheduler ─► ActiveModules
//!   └── ModuleCircuitBreaker per gated module
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use integration_bridge::bridge::IntegrationBridgeBuilder;
//! use integration_bridge::config::ConfigManager;
//! # use integration_bridge::bootstrap::IntegrationModule;
//! # use std::sync::Arc;
//!
//! # async fn example(jira: Arc<dyn IntegrationModule>) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let bridge = IntegrationBridgeBuilder::new(manager.config().clone()).build()?;
//!
//! bridge.discover("jira-1", jira)?;
//! bridge.start()?;
//!
//! let health = bridge.health().await;
//! println!("{:?}: {}", health.status, health.message);
//!
//! bridge.shutdown().await;
//! # Ok(())
//! # }
//! ```

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bootstrap::{
    ActiveModules, BootstrapRegistry, BootstrapScheduler, IntegrationModule, RetryPolicy,
    RetryTicket,
};
use crate::cache::TtlCache;
use crate::config::{BridgeConfig, DynamicModuleConfiguration, ModuleConfiguration};
use crate::error::{BridgeError, BridgeResult};
use crate::health::{
    AggregateHealth, CompositeProbeAggregator, HealthFetcher, HealthManager, HealthProbe,
    ModuleRecord, ReqwestFetcher, ServiceHealthProbe, ServiceHealthView, ServiceVersionUpdated,
};
use crate::resilience::{ModuleCircuitBreaker, RequestGate};

/// Message recorded for provisioned module types nobody implements
pub const NO_IMPLEMENTATION_MESSAGE: &str = "No implementation available for module type";

/// Prefix of module-view keys for unimplemented types, kept apart from module ids
pub const UNIMPLEMENTED_TYPE_PREFIX: &str = "type:";

/// Module-view key under which an unimplemented module type is reported
pub fn unimplemented_type_key(module_type: &str) -> String {
    format!("{UNIMPLEMENTED_TYPE_PREFIX}{module_type}")
}

const VERSION_EVENT_CAPACITY: usize = 64;

/// Builder wiring the bridge components together
pub struct IntegrationBridgeBuilder {
    config: BridgeConfig,
    module_configuration: Option<Arc<dyn ModuleConfiguration>>,
    fetcher: Option<Arc<dyn HealthFetcher>>,
    extra_probes: Vec<Arc<dyn HealthProbe>>,
    service_view: Option<Arc<dyn ServiceHealthView>>,
    retry_policy: Option<RetryPolicy>,
    version: Option<String>,
}

impl IntegrationBridgeBuilder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            module_configuration: None,
            fetcher: None,
            extra_probes: Vec::new(),
            service_view: None,
            retry_policy: None,
            version: None,
        }
    }

    /// Source of provisioned module types; defaults to the configured `modules` list
    #[must_use]
    pub fn module_configuration(mut self, modules: Arc<dyn ModuleConfiguration>) -> Self {
        self.module_configuration = Some(modules);
        self
    }

    /// HTTP client used by the configured service probes
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn HealthFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Add a probe besides the configured services
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.extra_probes.push(probe);
        self
    }

    /// Replace the probe aggregator as the service side of the verdict
    #[must_use]
    pub fn service_view(mut self, view: Arc<dyn ServiceHealthView>) -> Self {
        self.service_view = Some(view);
        self
    }

    /// Override the retry policy from `bootstrap.retry`
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Bridge version reported in the health verdict
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn build(self) -> BridgeResult<IntegrationBridge> {
        self.config.validate()?;

        let config = self.config;
        let (version_events, _) = broadcast::channel(VERSION_EVENT_CAPACITY);

        let fetcher: Arc<dyn HealthFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new(
                config.health.connect_timeout(),
                config.health.read_timeout(),
            )?),
        };

        let cache = Arc::new(TtlCache::new(
            config.health.cache_ttl(),
            config.health.cache_lock_timeout(),
        ));

        let service_probes: Vec<Arc<ServiceHealthProbe>> = config
            .services
            .iter()
            .map(|service| {
                Arc::new(ServiceHealthProbe::new(
                    service.clone(),
                    Arc::clone(&fetcher),
                    Arc::clone(&cache),
                    version_events.clone(),
                ))
            })
            .collect();

        let service_view: Arc<dyn ServiceHealthView> = match self.service_view {
            Some(view) => view,
            None => {
                let mut aggregator = CompositeProbeAggregator::from_config(&config.health);
                for probe in &service_probes {
                    aggregator.add_probe(Arc::clone(probe) as Arc<dyn HealthProbe>);
                }
                for probe in self.extra_probes {
                    aggregator.add_probe(probe);
                }
                Arc::new(aggregator)
            }
        };

        let mut health = HealthManager::new(service_view);
        if let Some(version) = self.version {
            health = health.with_version(version);
        }
        let health = Arc::new(health);

        let module_configuration: Arc<dyn ModuleConfiguration> = match self.module_configuration {
            Some(modules) => modules,
            None => Arc::new(DynamicModuleConfiguration::with_types(
                config.provisioned_module_types(),
            )),
        };

        let registry = Arc::new(BootstrapRegistry::new());
        let active = Arc::new(ActiveModules::new());
        let policy = self
            .retry_policy
            .unwrap_or_else(|| RetryPolicy::from_config(&config.bootstrap.retry));

        let scheduler = Arc::new(BootstrapScheduler::new(
            config.bootstrap.clone(),
            policy,
            Arc::clone(&registry),
            Arc::clone(&health),
            Arc::clone(&active),
            Arc::clone(&module_configuration),
        ));

        info!(
            services = config.services.len(),
            provisioned = config.modules.len(),
            "Integration bridge assembled"
        );

        Ok(IntegrationBridge {
            config,
            health,
            registry,
            active,
            scheduler,
            module_configuration,
            service_probes,
            version_events,
            discovered: DashMap::new(),
            breakers: DashMap::new(),
            listeners: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        })
    }
}

/// Running bridge: discovered modules, their bootstrap and the health view
pub struct IntegrationBridge {
    config: BridgeConfig,
    health: Arc<HealthManager>,
    registry: Arc<BootstrapRegistry>,
    active: Arc<ActiveModules>,
    scheduler: Arc<BootstrapScheduler>,
    module_configuration: Arc<dyn ModuleConfiguration>,
    service_probes: Vec<Arc<ServiceHealthProbe>>,
    version_events: broadcast::Sender<ServiceVersionUpdated>,
    /// Discovered module id to module type
    discovered: DashMap<String, String>,
    breakers: DashMap<String, Arc<ModuleCircuitBreaker>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for IntegrationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationBridge")
            .field("discovered", &self.discovered.len())
            .field("active", &self.active.len())
            .field("pending_tickets", &self.registry.len())
            .field("started", &self.started.load(Ordering::Acquire))
            .finish()
    }
}

impl IntegrationBridge {
    pub fn builder(config: BridgeConfig) -> IntegrationBridgeBuilder {
        IntegrationBridgeBuilder::new(config)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Register a discovered module and queue it for activation
    pub fn discover(
        &self,
        module_id: impl Into<String>,
        module: Arc<dyn IntegrationModule>,
    ) -> BridgeResult<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BridgeError::ShuttingDown);
        }

        let module_id = module_id.into();
        let module_type = module.module_type().to_string();

        match self.discovered.entry(module_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!(module_id = %module_id, "Module discovered twice, rejecting");
                return Err(BridgeError::DuplicateModule(module_id));
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(module_type.clone());
            }
        }

        self.health.register_module(&module_id, &module_type);
        self.registry.offer(RetryTicket::new(module_id.clone(), module));

        info!(module_id = %module_id, module_type = %module_type, "Module discovered");
        Ok(())
    }

    /// Start version propagation and the bootstrap scheduler
    pub fn start(&self) -> BridgeResult<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BridgeError::ShuttingDown);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::Internal(
                "integration bridge already started".to_string(),
            ));
        }

        {
            let mut listeners = self.listeners.lock();
            for probe in &self.service_probes {
                if let Some(handle) =
                    probe.spawn_version_listener(self.version_events.subscribe())
                {
                    listeners.push(handle);
                }
            }
        }

        self.report_unimplemented_types();
        self.scheduler.start()?;

        info!(
            discovered = self.discovered.len(),
            "Integration bridge started"
        );
        Ok(())
    }

    fn report_unimplemented_types(&self) {
        let implemented: HashSet<String> = self
            .discovered
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut missing: Vec<String> = self
            .module_configuration
            .configured_module_types()
            .into_iter()
            .filter(|module_type| !implemented.contains(module_type))
            .collect();
        missing.sort();

        for module_type in missing {
            warn!(module_type = %module_type, "Provisioned module type has no implementation");
            self.health.mark_inactive(
                &unimplemented_type_key(&module_type),
                &module_type,
                NO_IMPLEMENTATION_MESSAGE,
            );
        }
    }

    /// Stop bootstrapping and release every active module
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down integration bridge");
        self.scheduler.shutdown().await;

        for (module_id, module) in self.active.drain() {
            debug!(module_id = %module_id, "Destroying module");
            module.destroy().await;
            self.health
                .mark_inactive(&module_id, module.module_type(), "Module destroyed");
        }

        for handle in self.listeners.lock().drain(..) {
            handle.abort();
        }

        for entry in self.breakers.iter() {
            entry.value().close();
        }

        info!("Integration bridge stopped");
    }

    // =========================================================================
    // Modules
    // =========================================================================

    pub fn module(&self, module_id: &str) -> Option<ModuleRecord> {
        self.health.module(module_id)
    }

    pub fn is_active(&self, module_id: &str) -> bool {
        self.active.contains(module_id)
    }

    /// Forget a module: pending tickets, active instance, breaker and health record
    pub async fn remove_module(&self, module_id: &str) -> BridgeResult<ModuleRecord> {
        if self.discovered.remove(module_id).is_none() {
            return Err(BridgeError::UnknownModule(module_id.to_string()));
        }

        let dropped = self.registry.withdraw(module_id);
        if let Some(module) = self.active.remove(module_id) {
            module.destroy().await;
        }
        self.breakers.remove(module_id);

        info!(module_id = %module_id, dropped_tickets = dropped, "Module removed");

        self.health
            .remove_module(module_id)
            .ok_or_else(|| BridgeError::UnknownModule(module_id.to_string()))
    }

    /// Circuit-guarded request entry point for a discovered module
    pub fn gate(&self, module_id: &str) -> BridgeResult<RequestGate> {
        if !self.discovered.contains_key(module_id) {
            return Err(BridgeError::UnknownModule(module_id.to_string()));
        }

        let breaker = self
            .breakers
            .entry(module_id.to_string())
            .or_insert_with(|| {
                ModuleCircuitBreaker::with_health_manager(
                    module_id,
                    self.config.circuit_breaker.open_timeout(),
                    Arc::clone(&self.health),
                )
            })
            .clone();

        Ok(RequestGate::new(breaker, Arc::clone(&self.health)))
    }

    // =========================================================================
    // Health
    // =========================================================================

    pub async fn health(&self) -> AggregateHealth {
        self.health.health().await
    }

    pub fn health_manager(&self) -> &Arc<HealthManager> {
        &self.health
    }

    /// Version change notifications from the service probes
    pub fn subscribe_versions(&self) -> broadcast::Receiver<ServiceVersionUpdated> {
        self.version_events.subscribe()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BootstrapRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<BootstrapScheduler> {
        &self.scheduler
    }

    pub fn module_configuration(&self) -> &Arc<dyn ModuleConfiguration> {
        &self.module_configuration
    }
}
