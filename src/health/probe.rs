//! # Service Health Probes
//!
//! One probe per dependent service. A probe fetches the service's health payload over
//! HTTP, derives connectivity and the current version, checks the version against the
//! configured minimum and caches the result per service name.
//!
//! ## Payload Interpretation
//!
//! - Transport error or non-200 status: `Down`
//! - 200 with a configured `health_field`: `Up` iff that JSON field is boolean `true`
//! - 200 without a `health_field`: `Up`
//!
//! Whenever the observed version changes a [`ServiceVersionUpdated`] event is broadcast.
//! A probe configured with `version_from` ignores its own payload version and adopts the
//! versions announced for the named service instead.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{Connectivity, ProbeResult};
use super::version::check_compatibility;
use crate::cache::TtlCache;
use crate::config::ServiceProbeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::log_probe;

const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

// =============================================================================
// Probe Abstractions
// =============================================================================

/// A health check that produces one [`ProbeResult`]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Service name, used as the detail key in aggregate reports
    fn name(&self) -> &str;

    /// Minimum version reported when the probe cannot produce a result
    fn min_version(&self) -> &str;

    async fn probe(&self) -> BridgeResult<ProbeResult>;
}

/// Raw HTTP response handed to the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP GET transport used by service probes
#[async_trait]
pub trait HealthFetcher: Send + Sync + fmt::Debug {
    async fn fetch(&self, url: &str) -> BridgeResult<FetchResponse>;
}

/// `reqwest`-backed fetcher with connect and read timeouts
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(connect_timeout + read_timeout)
            .user_agent(concat!("integration-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::HttpError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HealthFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> BridgeResult<FetchResponse> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(FetchResponse { status, body })
    }
}

// =============================================================================
// Version Notifications
// =============================================================================

/// Broadcast when a service reports a version different from the last one observed
///
/// Versions are semantic, i.e. with any `-SNAPSHOT` suffix removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceVersionUpdated {
    pub service_name: String,
    pub old_version: Option<String>,
    pub new_version: String,
}

fn semantic_version(version: &str) -> String {
    version.replace(SNAPSHOT_SUFFIX, "")
}

// =============================================================================
// Service Health Probe
// =============================================================================

/// HTTP health probe for one configured service
pub struct ServiceHealthProbe {
    config: ServiceProbeConfig,
    fetcher: Arc<dyn HealthFetcher>,
    cache: Arc<TtlCache<String, ProbeResult>>,
    events: broadcast::Sender<ServiceVersionUpdated>,
    observed_version: Mutex<Option<String>>,
    adopted_version: Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for ServiceHealthProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHealthProbe")
            .field("service", &self.config.name)
            .field("url", &self.config.health_check_url())
            .field("version_from", &self.config.version_from)
            .finish()
    }
}

impl ServiceHealthProbe {
    pub fn new(
        config: ServiceProbeConfig,
        fetcher: Arc<dyn HealthFetcher>,
        cache: Arc<TtlCache<String, ProbeResult>>,
        events: broadcast::Sender<ServiceVersionUpdated>,
    ) -> Self {
        Self {
            config,
            fetcher,
            cache,
            events,
            observed_version: Mutex::new(None),
            adopted_version: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &ServiceProbeConfig {
        &self.config
    }

    /// Last version observed in this service's own payload
    pub fn observed_version(&self) -> Option<String> {
        self.observed_version.lock().clone()
    }

    /// Set the version used when this probe follows another service
    pub fn adopt_version(&self, version: impl Into<String>) {
        *self.adopted_version.write() = Some(version.into());
        self.cache.invalidate(&self.config.name);
    }

    /// Follow version announcements of the `version_from` service
    ///
    /// Returns `None` when the probe reports its own version.
    pub fn spawn_version_listener(
        &self,
        mut receiver: broadcast::Receiver<ServiceVersionUpdated>,
    ) -> Option<JoinHandle<()>> {
        let source = self.config.version_from.clone()?;
        let service = self.config.name.clone();
        let adopted = Arc::clone(&self.adopted_version);
        let cache = Arc::clone(&self.cache);

        Some(tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.service_name == source => {
                        debug!(
                            service = %service,
                            source = %source,
                            version = %event.new_version,
                            "Adopting version from source service"
                        );
                        *adopted.write() = Some(event.new_version);
                        cache.invalidate(&service);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(service = %service, skipped, "Version listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Probe the service without consulting the cache
    pub async fn check(&self) -> ProbeResult {
        let url = self.config.health_check_url();

        let response = match self.fetcher.fetch(&url).await {
            Ok(response) => response,
            Err(e) => {
                log_probe!(warn, "FETCH_FAILED", service: self.config.name, url: url, error: e.to_string());
                return self.result(Connectivity::Down, self.followed_version());
            }
        };

        if response.status != 200 {
            log_probe!(warn, "UNEXPECTED_STATUS", service: self.config.name, url: url, status: response.status);
            return self.result(Connectivity::Down, self.followed_version());
        }

        let payload = serde_json::from_str::<serde_json::Value>(&response.body).ok();

        let connectivity = match (&self.config.health_field, &payload) {
            (None, _) => Connectivity::Up,
            (Some(field), Some(body)) if body.get(field).and_then(|v| v.as_bool()) == Some(true) => {
                Connectivity::Up
            }
            (Some(_), _) => Connectivity::Down,
        };

        let version = if self.config.version_from.is_some() {
            self.adopted_version.read().clone()
        } else {
            let version = payload
                .as_ref()
                .and_then(|body| body.get(&self.config.version_field))
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if let Some(version) = &version {
                self.record_version(version);
            }
            version
        };

        let result = self.result(connectivity, version);
        log_probe!(
            debug,
            "CHECKED",
            service: result.service_name,
            connectivity: result.connectivity,
            compatibility: result.compatibility,
            version: result.current_version,
        );
        result
    }

    fn followed_version(&self) -> Option<String> {
        if self.config.version_from.is_some() {
            self.adopted_version.read().clone()
        } else {
            None
        }
    }

    fn result(&self, connectivity: Connectivity, current_version: Option<String>) -> ProbeResult {
        let compatibility = check_compatibility(current_version.as_deref(), &self.config.min_version);
        ProbeResult {
            service_name: self.config.name.clone(),
            connectivity,
            current_version,
            min_version: self.config.min_version.clone(),
            compatibility,
        }
    }

    fn record_version(&self, version: &str) {
        let previous = {
            let mut observed = self.observed_version.lock();
            if observed.as_deref() == Some(version) {
                return;
            }
            observed.replace(version.to_string())
        };

        let event = ServiceVersionUpdated {
            service_name: self.config.name.clone(),
            old_version: previous.as_deref().map(semantic_version),
            new_version: semantic_version(version),
        };

        info!(
            service = %event.service_name,
            old_version = ?event.old_version,
            new_version = %event.new_version,
            "Service version changed"
        );

        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl HealthProbe for ServiceHealthProbe {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn min_version(&self) -> &str {
        &self.config.min_version
    }

    async fn probe(&self) -> BridgeResult<ProbeResult> {
        let result = self
            .cache
            .get_or_load(&self.config.name, || async {
                Ok::<_, BridgeError>(self.check().await)
            })
            .await?;
        Ok(result)
    }
}
