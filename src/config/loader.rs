//! Configuration Loader
//!
//! Environment-aware configuration loading. A TOML file provides the base values and
//! `BRIDGE__`-prefixed environment variables override individual keys, for example
//! `BRIDGE__BOOTSTRAP__PERIOD_MS=30000`.

use super::error::{ConfigResult, ConfigurationError};
use super::modules::ModuleConfiguration;
use super::BridgeConfig;
use config::{Config, Environment, File, FileFormat};
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "BRIDGE";
const ENV_SEPARATOR: &str = "__";
const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";

/// Loaded and validated bridge configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: BridgeConfig,
    environment: String,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from `BRIDGE_CONFIG`, falling back to `config/bridge.toml` and
    /// then to built-in defaults when neither exists
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        match env::var("BRIDGE_CONFIG") {
            Ok(path) => Self::load_from_file(path),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                Self::load_from_file(DEFAULT_CONFIG_PATH)
            }
            Err(_) => {
                debug!("No configuration file found, using defaults with environment overrides");
                let config = Self::build(None, None)?;
                Self::finish(config, None)
            }
        }
    }

    /// Load configuration from a TOML file with environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigurationError::config_file_not_found(path));
        }

        let config = Self::build(Some(path), None)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    /// Load configuration from a TOML file with an explicit override map instead of the
    /// process environment
    ///
    /// Keys use the same shape as environment variables (`BRIDGE__HEALTH__CACHE_TTL_MS`).
    /// This is useful for testing without modifying global environment variables.
    pub fn load_with_overrides(
        path: impl AsRef<Path>,
        overrides: HashMap<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigurationError::config_file_not_found(path));
        }

        let config = Self::build(Some(path), Some(overrides))?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    /// Parse configuration from an in-memory TOML document, ignoring the environment
    pub fn from_toml_str(contents: &str) -> ConfigResult<Arc<ConfigManager>> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .and_then(|raw| raw.try_deserialize::<BridgeConfig>())
            .map_err(|e| ConfigurationError::load_error("inline TOML", e))?;

        Self::finish(config, None)
    }

    /// Wrap an already constructed configuration after validating it
    pub fn from_config(config: BridgeConfig) -> ConfigResult<Arc<ConfigManager>> {
        Self::finish(config, None)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the configuration was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Detect the deployment environment from `BRIDGE_ENV` or `APP_ENV`
    pub fn detect_environment() -> String {
        env::var("BRIDGE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn build(
        path: Option<&Path>,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<BridgeConfig> {
        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(overrides);

        builder
            .add_source(environment)
            .build()
            .and_then(|raw| raw.try_deserialize::<BridgeConfig>())
            .map_err(|e| ConfigurationError::load_error(source_name, e))
    }

    fn finish(config: BridgeConfig, source: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;

        let environment = Self::detect_environment();
        info!(
            environment = %environment,
            services = config.services.len(),
            modules = config.modules.len(),
            worker_pool_size = config.bootstrap.worker_pool_size,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source,
        }))
    }
}

impl ModuleConfiguration for ConfigManager {
    fn configured_module_types(&self) -> HashSet<String> {
        self.config.provisioned_module_types()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_toml() -> &'static str {
        r#"
[bootstrap]
period_ms = 30000
worker_pool_size = 4

[bootstrap.retry]
max_attempts = 5
backoff = "exponential"
base_delay_ms = 500
max_delay_ms = 8000

[health]
cache_ttl_ms = 1000

[[services]]
name = "pod"
base_url = "https://pod.example.com"
health_path = "/webcontroller/HealthCheck/version"
min_version = "1.45.0"

[[services]]
name = "session_auth"
base_url = "https://pod.example.com"
health_path = "/sessionauth/HealthCheck"
min_version = "1.45.0"
health_field = "sessionauth"
version_from = "pod"

[[modules]]
module_type = "jiraWebHookIntegration"

[[modules]]
module_type = "githubWebHookIntegration"
state = "removed"
"#
    }

    #[test]
    fn test_from_toml_str_applies_values_and_defaults() {
        let manager = ConfigManager::from_toml_str(sample_toml()).unwrap();
        let config = manager.config();

        assert_eq!(config.bootstrap.period(), Duration::from_secs(30));
        assert_eq!(config.bootstrap.worker_pool_size, 4);
        assert_eq!(config.bootstrap.initial_delay_ms, 50);
        assert_eq!(config.bootstrap.retry.max_attempts, 5);
        assert_eq!(config.health.cache_ttl_ms, 1000);
        assert_eq!(config.health.probe_pool_size, 15);
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].version_from.as_deref(), Some("pod"));
        assert_eq!(config.services[0].version_field, "version");
    }

    #[test]
    fn test_configured_module_types_only_provisioned() {
        let manager = ConfigManager::from_toml_str(sample_toml()).unwrap();
        let types = manager.configured_module_types();

        assert_eq!(types.len(), 1);
        assert!(types.contains("jiraWebHookIntegration"));
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bridge.toml");
        fs::write(&path, sample_toml()).unwrap();

        let mut overrides = HashMap::new();
        overrides.insert("BRIDGE__BOOTSTRAP__PERIOD_MS".to_string(), "1000".to_string());

        let manager = ConfigManager::load_with_overrides(&path, overrides).unwrap();
        assert_eq!(manager.config().bootstrap.period_ms, 1000);
        assert_eq!(manager.config().bootstrap.worker_pool_size, 4);
        assert_eq!(manager.source(), Some(path.as_path()));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let result = ConfigManager::load_from_file(dir.path().join("missing.toml"));

        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let result = ConfigManager::from_toml_str("[bootstrap]\nworker_pool_size = 0\n");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_malformed_toml_is_a_load_error() {
        let result = ConfigManager::from_toml_str("[bootstrap\nperiod_ms = ");
        assert!(matches!(result, Err(ConfigurationError::LoadError { .. })));
    }
}
