//! Loading a full bridge configuration from disk and assembling the bridge from it.

use integration_bridge::config::{BackoffStrategy, ConfigManager, ModuleConfiguration};
use integration_bridge::IntegrationBridgeBuilder;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const BRIDGE_TOML: &str = r#"
[bootstrap]
initial_delay_ms = 100
period_ms = 30000
worker_pool_size = 4

[bootstrap.retry]
max_attempts = 10
backoff = "exponential"
base_delay_ms = 500
max_delay_ms = 60000

[health]
cache_ttl_ms = 15000
probe_pool_size = 8

[circuit_breaker]
open_timeout_ms = 5000

[web]
bind_address = "127.0.0.1:9090"

[[services]]
name = "pod"
base_url = "http://pod:8080"
health_path = "/health"
min_version = "1.45.0"

[[services]]
name = "pod-agent"
base_url = "http://agent:8080"
health_path = "/health"
min_version = "1.45.0"
health_field = "pod"
version_from = "pod"

[[modules]]
module_type = "jiraWebHookIntegration"

[[modules]]
module_type = "serviceNowIntegration"
state = "removed"
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_configuration() {
    let file = write_config(BRIDGE_TOML);
    let manager = ConfigManager::load_with_overrides(file.path(), HashMap::new()).unwrap();
    let config = manager.config();

    assert_eq!(config.bootstrap.period(), Duration::from_secs(30));
    assert_eq!(config.bootstrap.worker_pool_size, 4);
    assert_eq!(config.bootstrap.poll_wait_ms, 5000);
    assert_eq!(config.bootstrap.retry.backoff, BackoffStrategy::Exponential);
    assert_eq!(config.health.cache_ttl(), Duration::from_secs(15));
    assert_eq!(config.health.probe_timeout(), Duration::from_secs(10));
    assert_eq!(config.circuit_breaker.open_timeout(), Duration::from_secs(5));
    assert_eq!(config.web.bind_address, "127.0.0.1:9090");

    assert_eq!(config.services.len(), 2);
    assert_eq!(config.services[0].health_check_url(), "http://pod:8080/health");
    assert_eq!(config.services[1].version_from.as_deref(), Some("pod"));

    let types = manager.configured_module_types();
    assert!(types.contains("jiraWebHookIntegration"));
    assert!(!types.contains("serviceNowIntegration"));
    assert_eq!(manager.source(), Some(file.path()));
}

#[test]
fn test_overrides_replace_file_values() {
    let file = write_config(BRIDGE_TOML);
    let overrides = HashMap::from([
        ("BRIDGE__BOOTSTRAP__PERIOD_MS".to_string(), "1000".to_string()),
        ("BRIDGE__HEALTH__PROBE_TIMEOUT_MS".to_string(), "2500".to_string()),
    ]);

    let manager = ConfigManager::load_with_overrides(file.path(), overrides).unwrap();
    assert_eq!(manager.config().bootstrap.period_ms, 1000);
    assert_eq!(manager.config().health.probe_timeout_ms, 2500);
    assert_eq!(manager.config().bootstrap.worker_pool_size, 4);
}

#[test]
fn test_invalid_files_are_rejected() {
    let zero_pool = write_config("[bootstrap]\nworker_pool_size = 0\n");
    assert!(ConfigManager::load_with_overrides(zero_pool.path(), HashMap::new()).is_err());

    let dangling_source = write_config(
        r#"
[[services]]
name = "agent"
base_url = "http://agent"
min_version = "1.45.0"
version_from = "missing"
"#,
    );
    assert!(ConfigManager::load_with_overrides(dangling_source.path(), HashMap::new()).is_err());

    assert!(ConfigManager::load_from_file("/nonexistent/bridge.toml").is_err());
}

#[tokio::test]
async fn test_bridge_builds_from_loaded_configuration() {
    let file = write_config(BRIDGE_TOML);
    let manager = ConfigManager::load_with_overrides(file.path(), HashMap::new()).unwrap();

    let bridge = IntegrationBridgeBuilder::new(manager.config().clone())
        .build()
        .unwrap();
    assert!(bridge
        .module_configuration()
        .configured_module_types()
        .contains("jiraWebHookIntegration"));
    assert_eq!(bridge.config().services.len(), 2);
}
