//! # Bootstrap Scheduler
//!
//! Recurring task that drains the [`BootstrapRegistry`] and dispatches activation attempts
//! to a bounded worker pool.
//!
//! ## Tick
//!
//! 1. Snapshot the queue length and the configured module types
//! 2. Poll up to that many tickets, each with a bounded wait
//! 3. Drop tickets of withdrawn modules; defer tickets whose module type is not configured or whose backoff has not elapsed
//! 4. Spawn every other ticket as an activation task holding a pool permit
//! 5. Requeue the deferred tickets whose module is still registered
//!
//! ## Activation Outcomes
//!
//! - `Activated`: module joins the active directory, record `Active`, ticket dropped
//! - `Retryable`: attempt counted, record `Retrying`, ticket re-offered (or abandoned with
//!   `FailedBootstrap` once the retry policy is exhausted)
//! - `Fatal` or panic: record `FailedBootstrap`, ticket dropped
//!
//! Outcomes of modules withdrawn while their activation ran are discarded; an instance
//! that activated anyway is destroyed.
//!
//! ## Shutdown
//!
//! The tick loop is stopped, the pool is closed to new work, and in-flight activations get
//! a bounded drain period before they are aborted.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::directory::ActiveModules;
use super::module::ActivationOutcome;
use super::policy::RetryPolicy;
use super::registry::BootstrapRegistry;
use super::ticket::RetryTicket;
use crate::config::{BootstrapConfig, ModuleConfiguration};
use crate::error::{BridgeError, BridgeResult};
use crate::health::HealthManager;
use crate::log_module;

/// Counters for one drain of the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub polled: usize,
    pub dispatched: usize,
    pub deferred_unconfigured: usize,
    pub deferred_not_due: usize,
}

/// Shared state used by activation tasks
struct Dispatcher {
    registry: Arc<BootstrapRegistry>,
    health: Arc<HealthManager>,
    active: Arc<ActiveModules>,
    policy: RetryPolicy,
}

impl Dispatcher {
    async fn activate(&self, mut ticket: RetryTicket) {
        let module_id = ticket.module_id().to_string();
        let module_type = ticket.module_type().to_string();
        let module = Arc::clone(ticket.module());

        debug!(
            module_id = %module_id,
            module_type = %module_type,
            attempt = ticket.attempt_count(),
            "Activating module"
        );

        let outcome = match AssertUnwindSafe(module.activate(&module_id))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => ActivationOutcome::fatal(format!(
                "Activation panicked: {}",
                panic_message(panic.as_ref())
            )),
        };

        match outcome {
            ActivationOutcome::Activated => {
                let applied = self.registry.with_current(&ticket, || {
                    self.active.insert(module_id.clone(), Arc::clone(&module));
                    self.health.mark_active(&module_id, &module_type);
                });
                if applied.is_none() {
                    Self::discard(&module_id);
                    module.destroy().await;
                    return;
                }
                log_module!(
                    info,
                    "ACTIVATED",
                    module_id: module_id,
                    module_type: module_type,
                    attempts: ticket.attempt_count(),
                );
            }
            ActivationOutcome::Retryable { cause, kind } => {
                let attempts = ticket.record_attempt();

                if self.policy.is_exhausted(attempts) {
                    let message = format!("Retry limit reached after {attempts} attempts: {cause}");
                    let applied = self.registry.with_current(&ticket, || {
                        self.health.mark_failed(&module_id, &module_type, &message);
                    });
                    if applied.is_none() {
                        Self::discard(&module_id);
                        return;
                    }
                    log_module!(
                        error,
                        "RETRY_LIMIT_REACHED",
                        module_id: module_id,
                        module_type: module_type,
                        attempts: attempts,
                        cause: cause,
                    );
                    return;
                }

                if let Some(delay) = self.policy.delay_for(attempts) {
                    ticket.defer_until(Instant::now() + delay);
                }

                let applied = self.registry.with_current(&ticket, || {
                    self.health
                        .mark_retrying(&module_id, &module_type, attempts, cause.clone());
                });
                if applied.is_none() || !self.registry.requeue(ticket) {
                    Self::discard(&module_id);
                    return;
                }
                log_module!(
                    warn,
                    "RETRYING",
                    module_id: module_id,
                    module_type: module_type,
                    attempt: attempts,
                    kind: kind,
                    cause: cause,
                );
            }
            ActivationOutcome::Fatal { cause } => {
                let applied = self.registry.with_current(&ticket, || {
                    self.health.mark_failed(&module_id, &module_type, &cause);
                });
                if applied.is_none() {
                    Self::discard(&module_id);
                    return;
                }
                log_module!(
                    error,
                    "FAILED_BOOTSTRAP",
                    module_id: module_id,
                    module_type: module_type,
                    attempts: ticket.attempt_count(),
                    cause: cause,
                );
            }
        }
    }

    fn discard(module_id: &str) {
        debug!(module_id = %module_id, "Module withdrawn during activation, outcome discarded");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Periodic bootstrap driver
pub struct BootstrapScheduler {
    dispatcher: Arc<Dispatcher>,
    modules: Arc<dyn ModuleConfiguration>,
    config: BootstrapConfig,
    pool: Arc<Semaphore>,
    in_flight: Mutex<JoinSet<()>>,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for BootstrapScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapScheduler")
            .field("pending_tickets", &self.dispatcher.registry.len())
            .field("in_flight", &self.in_flight.lock().len())
            .field("available_workers", &self.pool.available_permits())
            .field("shutting_down", &self.shutting_down.load(Ordering::Acquire))
            .finish()
    }
}

impl BootstrapScheduler {
    pub fn new(
        config: BootstrapConfig,
        policy: RetryPolicy,
        registry: Arc<BootstrapRegistry>,
        health: Arc<HealthManager>,
        active: Arc<ActiveModules>,
        modules: Arc<dyn ModuleConfiguration>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            dispatcher: Arc::new(Dispatcher {
                registry,
                health,
                active,
                policy,
            }),
            modules,
            pool: Arc::new(Semaphore::new(config.worker_pool_size.max(1))),
            config,
            in_flight: Mutex::new(JoinSet::new()),
            shutdown_tx,
            loop_handle: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of activation tasks not yet reaped
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Start the recurring tick task
    pub fn start(self: &Arc<Self>) -> BridgeResult<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BridgeError::ShuttingDown);
        }

        let mut loop_handle = self.loop_handle.lock();
        if loop_handle.is_some() {
            return Err(BridgeError::Internal(
                "bootstrap scheduler already started".to_string(),
            ));
        }

        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let start = Instant::now() + self.config.initial_delay();
        let period = self.config.period();

        info!(
            initial_delay_ms = self.config.initial_delay_ms,
            period_ms = self.config.period_ms,
            worker_pool_size = self.config.worker_pool_size,
            "Starting bootstrap scheduler"
        );

        *loop_handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.run_tick().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Bootstrap scheduler loop stopping");
                            break;
                        }
                    }
                }
            }
        }));

        Ok(())
    }

    /// Drain the registry once
    pub async fn run_tick(&self) -> TickSummary {
        let trace_id = Uuid::new_v4();
        let span = info_span!("bootstrap_tick", trace_id = %trace_id);
        self.drain_registry().instrument(span).await
    }

    async fn drain_registry(&self) -> TickSummary {
        self.reap_finished();

        let registry = &self.dispatcher.registry;
        let snapshot = registry.len();
        let configured = self.modules.configured_module_types();
        let now = Instant::now();
        let mut summary = TickSummary::default();
        let mut deferred = Vec::new();

        debug!(pending = snapshot, configured = configured.len(), "Verifying pending modules");

        for _ in 0..snapshot {
            let Some(ticket) = registry.poll(self.config.poll_wait()).await else {
                break;
            };
            summary.polled += 1;

            if !registry.is_current(&ticket) {
                debug!(module_id = %ticket.module_id(), "Dropping ticket of withdrawn module");
                continue;
            }

            if self.shutting_down.load(Ordering::Acquire) {
                deferred.push(ticket);
                continue;
            }

            if !configured.contains(ticket.module_type()) {
                debug!(
                    module_id = %ticket.module_id(),
                    module_type = %ticket.module_type(),
                    "Module type not configured, deferring"
                );
                summary.deferred_unconfigured += 1;
                deferred.push(ticket);
                continue;
            }

            if !ticket.is_due(now) {
                summary.deferred_not_due += 1;
                deferred.push(ticket);
                continue;
            }

            self.dispatch(ticket);
            summary.dispatched += 1;
        }

        for ticket in deferred {
            registry.requeue(ticket);
        }

        debug!(
            polled = summary.polled,
            dispatched = summary.dispatched,
            deferred_unconfigured = summary.deferred_unconfigured,
            deferred_not_due = summary.deferred_not_due,
            "Bootstrap tick complete"
        );

        summary
    }

    fn dispatch(&self, ticket: RetryTicket) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let pool = Arc::clone(&self.pool);

        let task = async move {
            let Ok(_permit) = pool.acquire_owned().await else {
                debug!(module_id = %ticket.module_id(), "Worker pool closed, dropping activation");
                return;
            };
            dispatcher.activate(ticket).await;
        };

        self.in_flight.lock().spawn(task.instrument(Span::current()));
    }

    fn reap_finished(&self) {
        let mut in_flight = self.in_flight.lock();
        while let Some(result) = in_flight.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Activation task failed to complete");
            }
        }
    }

    /// Wait until every activation dispatched so far has finished
    pub async fn wait_for_idle(&self) {
        let mut tasks = std::mem::take(&mut *self.in_flight.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Activation task failed to complete");
            }
        }
    }

    /// Stop ticking, close the pool and drain in-flight activations
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down bootstrap scheduler");
        let _ = self.shutdown_tx.send(true);

        let loop_handle = self.loop_handle.lock().take();
        if let Some(handle) = loop_handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Bootstrap scheduler loop failed");
                }
            }
        }

        self.pool.close();

        let mut tasks = std::mem::take(&mut *self.in_flight.lock());
        let drain_period = self.config.shutdown_drain();
        let drained = tokio::time::timeout(drain_period, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                drain_ms = self.config.shutdown_drain_ms,
                "Aborting activations still running after drain period"
            );
            tasks.shutdown().await;
        }

        info!("Bootstrap scheduler stopped");
    }
}
