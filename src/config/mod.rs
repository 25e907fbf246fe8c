//! # Bridge Configuration System
//!
//! Explicit, validated configuration for the bridge runtime. Every section carries the
//! documented defaults so a partial TOML file (or none at all) yields a working setup.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use integration_bridge::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/bridge.toml")?;
//!
//! let period = manager.config().bootstrap.period();
//! let probes = &manager.config().services;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod modules;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;
pub use modules::{DynamicModuleConfiguration, ModuleConfiguration};

/// Root configuration structure mirroring `bridge.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Module bootstrap scheduling
    pub bootstrap: BootstrapConfig,

    /// Probe caching, pooling and timeouts
    pub health: HealthConfig,

    /// Per-module circuit breaker settings
    pub circuit_breaker: CircuitBreakerConfig,

    /// Health endpoint binding
    pub web: WebConfig,

    /// Dependent services probed for connectivity
    pub services: Vec<ServiceProbeConfig>,

    /// Provisioned integration modules
    pub modules: Vec<ModuleSettings>,
}

/// Bootstrap scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub initial_delay_ms: u64,
    pub period_ms: u64,
    /// Concurrent activation attempts
    pub worker_pool_size: usize,
    /// Per-item wait while draining the registry
    pub poll_wait_ms: u64,
    /// Grace period for in-flight activations on shutdown
    pub shutdown_drain_ms: u64,
    pub retry: RetryConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 50,
            period_ms: 60_000,
            worker_pool_size: 10,
            poll_wait_ms: 5_000,
            shutdown_drain_ms: 5_000,
            retry: RetryConfig::default(),
        }
    }
}

impl BootstrapConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_ms)
    }
}

/// Backoff strategy applied between recoverable activation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Retry on the next tick
    #[default]
    None,
    /// Wait `base_delay_ms` between attempts
    Fixed,
    /// Double `base_delay_ms` per attempt, capped at `max_delay_ms`
    Exponential,
}

/// Retry settings for recoverable bootstrap failures
///
/// The defaults keep retrying forever with no backoff: operators are expected to fix
/// the external cause (network, credentials) and the bridge picks the module up again.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 0 means unbounded
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff: BackoffStrategy::None,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
        }
    }
}

/// Health probing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Time a probe result stays fresh in the cache
    pub cache_ttl_ms: u64,
    /// Bounded wait for the per-service refresh lock
    pub cache_lock_timeout_ms: u64,
    pub probe_pool_size: usize,
    /// Hard deadline for each probe within one aggregation
    pub probe_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 20_000,
            cache_lock_timeout_ms: 5_000,
            probe_pool_size: 15,
            probe_timeout_ms: 10_000,
            connect_timeout_ms: 1_000,
            read_timeout_ms: 5_000,
        }
    }
}

impl HealthConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn cache_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_lock_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Circuit breaker configuration shared by all module breakers
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Time an opened breaker stays open before closing again
    pub open_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: 10_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

/// Health endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One dependent service checked by a health probe
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServiceProbeConfig {
    /// Service name, also the cache key and the detail key in health reports
    pub name: String,
    pub base_url: String,
    /// Path appended to `base_url`
    #[serde(default)]
    pub health_path: String,
    /// Minimum compatible version, `Major.Minor[.Patch][-SNAPSHOT]`
    pub min_version: String,
    /// Boolean JSON field that reports the service as up; absent means any 200 is up
    #[serde(default)]
    pub health_field: Option<String>,
    #[serde(default = "default_version_field")]
    pub version_field: String,
    /// Take the current version from another service's version notifications
    #[serde(default)]
    pub version_from: Option<String>,
}

fn default_version_field() -> String {
    "version".to_string()
}

impl ServiceProbeConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, min_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            health_path: String::new(),
            min_version: min_version.into(),
            health_field: None,
            version_field: default_version_field(),
            version_from: None,
        }
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    pub fn with_health_field(mut self, field: impl Into<String>) -> Self {
        self.health_field = Some(field.into());
        self
    }

    pub fn with_version_from(mut self, service: impl Into<String>) -> Self {
        self.version_from = Some(service.into());
        self
    }

    /// Full health-check URL
    pub fn health_check_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.health_path.is_empty() {
            base.to_string()
        } else if self.health_path.starts_with('/') {
            format!("{base}{}", self.health_path)
        } else {
            format!("{base}/{}", self.health_path)
        }
    }
}

/// Provisioning state of a module type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    #[default]
    Provisioned,
    Removed,
}

/// A module type known to the configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModuleSettings {
    pub module_type: String,
    #[serde(default)]
    pub state: ProvisioningState,
}

impl ModuleSettings {
    pub fn provisioned(module_type: impl Into<String>) -> Self {
        Self {
            module_type: module_type.into(),
            state: ProvisioningState::Provisioned,
        }
    }
}

impl BridgeConfig {
    /// Module types currently provisioned
    pub fn provisioned_module_types(&self) -> HashSet<String> {
        self.modules
            .iter()
            .filter(|m| m.state == ProvisioningState::Provisioned)
            .map(|m| m.module_type.clone())
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bootstrap.worker_pool_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "bootstrap.worker_pool_size",
                "0",
                "worker pool must allow at least one activation",
            ));
        }

        if self.bootstrap.period_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "bootstrap.period_ms",
                "0",
                "period must be greater than 0",
            ));
        }

        if self.health.probe_pool_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.probe_pool_size",
                "0",
                "probe pool must allow at least one probe",
            ));
        }

        if self.health.probe_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "health.probe_timeout_ms",
                "0",
                "probe timeout must be greater than 0",
            ));
        }

        if self.circuit_breaker.open_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.open_timeout_ms",
                "0",
                "open timeout must be greater than 0",
            ));
        }

        if self.bootstrap.retry.backoff != BackoffStrategy::None
            && self.bootstrap.retry.base_delay_ms > self.bootstrap.retry.max_delay_ms
        {
            return Err(ConfigurationError::validation_error(
                "bootstrap.retry.base_delay_ms must not exceed max_delay_ms",
            ));
        }

        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "name",
                    "services entry",
                ));
            }
            if service.base_url.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "base_url",
                    format!("service '{}'", service.name),
                ));
            }
            if !names.insert(service.name.as_str()) {
                return Err(ConfigurationError::validation_error(format!(
                    "service '{}' is declared more than once",
                    service.name
                )));
            }
        }

        for service in &self.services {
            if let Some(source) = &service.version_from {
                if !names.contains(source.as_str()) || source == &service.name {
                    return Err(ConfigurationError::invalid_value(
                        "version_from",
                        source.clone(),
                        format!("service '{}' must reference another declared service", service.name),
                    ));
                }
            }
        }

        Ok(())
    }
}
