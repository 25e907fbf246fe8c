//! # Composite Probe Aggregator
//!
//! Runs independent health probes concurrently on a bounded pool and merges their
//! results. Each probe is spawned as its own task holding a pool permit; all handles are
//! then awaited against one deadline measured from submission. A probe that errors,
//! panics or misses the deadline is reported `Down` and never fails the aggregation.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, warn};

use super::probe::HealthProbe;
use super::types::{ProbeResult, ServiceHealthReport};
use crate::config::HealthConfig;
use crate::error::{BridgeError, BridgeResult};

/// Source of the service side of the bridge verdict
#[async_trait]
pub trait ServiceHealthView: Send + Sync {
    async fn service_health(&self) -> ServiceHealthReport;
}

/// Bounded, deadline-driven probe aggregation
pub struct CompositeProbeAggregator {
    probes: Vec<Arc<dyn HealthProbe>>,
    pool: Arc<Semaphore>,
    probe_timeout: Duration,
}

impl std::fmt::Debug for CompositeProbeAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProbeAggregator")
            .field("probes", &self.probe_names())
            .field("available_permits", &self.pool.available_permits())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

impl CompositeProbeAggregator {
    #[must_use]
    pub fn new(pool_size: usize, probe_timeout: Duration) -> Self {
        Self {
            probes: Vec::new(),
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
            probe_timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &HealthConfig) -> Self {
        Self::new(config.probe_pool_size, config.probe_timeout())
    }

    pub fn add_probe(&mut self, probe: Arc<dyn HealthProbe>) {
        self.probes.push(probe);
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.add_probe(probe);
        self
    }

    pub fn probe_names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// Run every probe and merge the results
    pub async fn check_all(&self) -> ServiceHealthReport {
        let deadline = Instant::now() + self.probe_timeout;

        let pending: Vec<(Arc<dyn HealthProbe>, JoinHandle<BridgeResult<ProbeResult>>)> = self
            .probes
            .iter()
            .map(|probe| {
                let pool = Arc::clone(&self.pool);
                let task_probe = Arc::clone(probe);
                let handle = tokio::spawn(async move {
                    let _permit = pool
                        .acquire_owned()
                        .await
                        .map_err(|_| BridgeError::ShuttingDown)?;
                    task_probe.probe().await
                });
                (Arc::clone(probe), handle)
            })
            .collect();

        let mut services = BTreeMap::new();
        for (probe, mut handle) in pending {
            let name = probe.name().to_string();
            let result = match timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(result))) => result,
                Ok(Ok(Err(e))) => {
                    warn!(service = %name, error = %e, "Health probe failed");
                    ProbeResult::down(&name, probe.min_version())
                }
                Ok(Err(join_error)) => {
                    error!(
                        service = %name,
                        panicked = join_error.is_panic(),
                        "Health probe task did not complete"
                    );
                    ProbeResult::down(&name, probe.min_version())
                }
                Err(_) => {
                    handle.abort();
                    warn!(
                        service = %name,
                        timeout_ms = self.probe_timeout.as_millis() as u64,
                        "Health probe timed out"
                    );
                    ProbeResult::down(&name, probe.min_version())
                }
            };
            services.insert(name, result);
        }

        let report = ServiceHealthReport::from_results(services);
        debug!(
            probes = report.services.len(),
            status = ?report.status,
            "Composite health aggregation complete"
        );
        report
    }
}

#[async_trait]
impl ServiceHealthView for CompositeProbeAggregator {
    async fn service_health(&self) -> ServiceHealthReport {
        self.check_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::types::{Compatibility, Connectivity, HealthStatus};

    enum Behavior {
        Up,
        Fail,
        Panic,
        Hang,
    }

    struct FakeProbe {
        name: String,
        behavior: Behavior,
    }

    impl FakeProbe {
        fn arc(name: &str, behavior: Behavior) -> Arc<dyn HealthProbe> {
            Arc::new(Self {
                name: name.to_string(),
                behavior,
            })
        }
    }

    #[async_trait]
    impl HealthProbe for FakeProbe {
        fn name(&self) -> &str {
            &self.name
        }

        fn min_version(&self) -> &str {
            "1.45.0"
        }

        async fn probe(&self) -> BridgeResult<ProbeResult> {
            match self.behavior {
                Behavior::Up => Ok(ProbeResult {
                    service_name: self.name.clone(),
                    connectivity: Connectivity::Up,
                    current_version: Some("1.45.0".to_string()),
                    min_version: "1.45.0".to_string(),
                    compatibility: Compatibility::Ok,
                }),
                Behavior::Fail => Err(BridgeError::ProbeError {
                    service: self.name.clone(),
                    reason: "boom".to_string(),
                }),
                Behavior::Panic => panic!("probe exploded"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    #[tokio::test]
    async fn test_empty_aggregation_is_up() {
        let aggregator = CompositeProbeAggregator::new(15, Duration::from_secs(10));
        let report = aggregator.check_all().await;
        assert_eq!(report.status, HealthStatus::Up);
        assert!(report.services.is_empty());
    }

    #[tokio::test]
    async fn test_all_up_is_up() {
        let aggregator = CompositeProbeAggregator::new(15, Duration::from_secs(10))
            .with_probe(FakeProbe::arc("pod", Behavior::Up))
            .with_probe(FakeProbe::arc("agent", Behavior::Up));

        let report = aggregator.check_all().await;
        assert!(report.is_up());
        assert_eq!(report.services.len(), 2);
    }

    #[tokio::test]
    async fn test_failures_do_not_hide_other_results() {
        let aggregator = CompositeProbeAggregator::new(2, Duration::from_secs(10))
            .with_probe(FakeProbe::arc("pod", Behavior::Up))
            .with_probe(FakeProbe::arc("km", Behavior::Fail))
            .with_probe(FakeProbe::arc("agent", Behavior::Panic));

        let report = aggregator.check_all().await;
        assert_eq!(report.status, HealthStatus::Down);
        assert_eq!(report.services["pod"].connectivity, Connectivity::Up);
        assert_eq!(report.services["km"].connectivity, Connectivity::Down);
        assert_eq!(report.services["agent"].connectivity, Connectivity::Down);
        assert_eq!(report.services["agent"].min_version, "1.45.0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out_within_deadline() {
        let aggregator = CompositeProbeAggregator::new(15, Duration::from_secs(10))
            .with_probe(FakeProbe::arc("pod", Behavior::Up))
            .with_probe(FakeProbe::arc("agent", Behavior::Hang));

        let started = Instant::now();
        let report = aggregator.check_all().await;

        assert!(started.elapsed() <= Duration::from_secs(10));
        assert_eq!(report.services["pod"].connectivity, Connectivity::Up);
        assert_eq!(report.services["agent"].connectivity, Connectivity::Down);
        assert!(!report.is_up());
    }
}
