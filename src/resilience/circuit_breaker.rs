//! # Module Circuit Breaker
//!
//! Per-module breaker with two states. A qualifying failure (forbidden credentials or a
//! module "stop sending" signal) opens the circuit; a one-shot timer closes it again after
//! a fixed timeout. The breaker never retries the failed call itself.
//!
//! While open, `reopen_at` is set and exactly one close task is pending. Every open bumps
//! a generation counter and the timer only closes the generation it was scheduled for.
//! The state check also closes an overdue circuit when the timer could not run.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::health::HealthManager;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Requests are handled
    Closed = 0,
    /// Requests are rejected without reaching the handler
    Open = 1,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            _ => CircuitState::Open,
        }
    }
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub module_id: String,
    pub state: CircuitState,
    /// Time left until the circuit closes, when open
    pub remaining_open: Option<Duration>,
    pub reset_pending: bool,
}

/// Circuit breaker guarding one integration module
#[derive(Debug)]
pub struct ModuleCircuitBreaker {
    module_id: String,
    state: AtomicU8,
    open_timeout: Duration,
    reopen_at: Mutex<Option<Instant>>,
    reset_pending: AtomicBool,
    generation: AtomicU64,
    reset_task: Mutex<Option<JoinHandle<()>>>,
    health: Option<Arc<HealthManager>>,
}

impl ModuleCircuitBreaker {
    pub fn new(module_id: impl Into<String>, open_timeout: Duration) -> Arc<Self> {
        Self::build(module_id.into(), open_timeout, None)
    }

    /// Breaker that mirrors its state into the module's health record
    pub fn with_health_manager(
        module_id: impl Into<String>,
        open_timeout: Duration,
        health: Arc<HealthManager>,
    ) -> Arc<Self> {
        Self::build(module_id.into(), open_timeout, Some(health))
    }

    fn build(module_id: String, open_timeout: Duration, health: Option<Arc<HealthManager>>) -> Arc<Self> {
        debug!(
            module_id = %module_id,
            open_timeout_ms = open_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Arc::new(Self {
            module_id,
            state: AtomicU8::new(CircuitState::Closed as u8),
            open_timeout,
            reopen_at: Mutex::new(None),
            reset_pending: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            reset_task: Mutex::new(None),
            health,
        })
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Current state, closing an overdue circuit first
    pub fn state(&self) -> CircuitState {
        let state = CircuitState::from(self.state.load(Ordering::Acquire));
        if state == CircuitState::Open {
            let overdue = self
                .reopen_at
                .lock()
                .map_or(true, |reopen_at| Instant::now() >= reopen_at);
            if overdue {
                self.close();
                return CircuitState::Closed;
            }
        }
        state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Open the circuit and schedule it to close after the timeout
    ///
    /// Opening an already open circuit keeps the pending close time.
    pub fn open(self: &Arc<Self>, reason: &str) {
        if self.reset_pending.swap(true, Ordering::AcqRel) {
            debug!(module_id = %self.module_id, reason = %reason, "Circuit already open");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let reopen_at = Instant::now() + self.open_timeout;
        *self.reopen_at.lock() = Some(reopen_at);
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        warn!(
            module_id = %self.module_id,
            reason = %reason,
            open_timeout_ms = self.open_timeout.as_millis() as u64,
            "Circuit breaker opened"
        );

        if let Some(health) = &self.health {
            health.record_circuit_state(&self.module_id, true);
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let breaker: Weak<Self> = Arc::downgrade(self);
                let handle = runtime.spawn(async move {
                    tokio::time::sleep_until(reopen_at).await;
                    if let Some(breaker) = breaker.upgrade() {
                        breaker.close_generation(generation);
                    }
                });
                if let Some(stale) = self.reset_task.lock().replace(handle) {
                    stale.abort();
                }
            }
            Err(_) => {
                debug!(
                    module_id = %self.module_id,
                    "No runtime available for close timer, circuit closes on next check"
                );
            }
        }
    }

    /// Close the circuit immediately, cancelling the pending close task
    pub fn close(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = self.reset_task.lock().take() {
            handle.abort();
        }
        self.mark_closed();
    }

    /// Timer path: close only if no newer open or close happened since scheduling
    fn close_generation(&self, generation: u64) {
        if self
            .generation
            .compare_exchange(generation, generation + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.reset_task.lock().take();
            self.mark_closed();
        } else {
            debug!(module_id = %self.module_id, "Stale close timer ignored");
        }
    }

    fn mark_closed(&self) {
        let was_open = self.state.swap(CircuitState::Closed as u8, Ordering::AcqRel)
            == CircuitState::Open as u8;
        *self.reopen_at.lock() = None;
        self.reset_pending.store(false, Ordering::Release);

        if was_open {
            info!(module_id = %self.module_id, "Circuit breaker closed");
            if let Some(health) = &self.health {
                health.record_circuit_state(&self.module_id, false);
            }
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state();
        let remaining_open = self
            .reopen_at
            .lock()
            .map(|reopen_at| reopen_at.saturating_duration_since(Instant::now()));

        CircuitSnapshot {
            module_id: self.module_id.clone(),
            state,
            remaining_open,
            reset_pending: self.reset_pending.load(Ordering::Acquire),
        }
    }
}

impl Drop for ModuleCircuitBreaker {
    fn drop(&mut self) {
        if let Some(handle) = self.reset_task.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_open_then_timer_closes() {
        let breaker = ModuleCircuitBreaker::new("jira", Duration::from_secs(10));
        assert!(breaker.is_closed());

        breaker.open("forbidden");
        assert_eq!(breaker.state(), CircuitState::Open);
        let snapshot = breaker.snapshot();
        assert!(snapshot.reset_pending);
        assert_eq!(snapshot.remaining_open, Some(Duration::from_secs(10)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!breaker.snapshot().reset_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopening_keeps_single_pending_close() {
        let breaker = ModuleCircuitBreaker::new("jira", Duration::from_secs(10));
        breaker.open("forbidden");

        tokio::time::sleep(Duration::from_secs(8)).await;
        breaker.open("stop sending");
        assert_eq!(
            breaker.snapshot().remaining_open,
            Some(Duration::from_secs(2))
        );

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(breaker.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_can_reopen_after_close() {
        let breaker = ModuleCircuitBreaker::new("jira", Duration::from_secs(1));
        breaker.open("forbidden");
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(breaker.is_closed());

        breaker.open("forbidden again");
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_close_cancels_stale_timer() {
        let breaker = ModuleCircuitBreaker::new("jira", Duration::from_secs(10));
        breaker.open("forbidden");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.is_closed());

        breaker.open("forbidden again");
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(
            breaker.snapshot().remaining_open,
            Some(Duration::from_secs(10))
        );

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(breaker.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_does_not_close() {
        let breaker = ModuleCircuitBreaker::new("jira", Duration::from_secs(10));
        breaker.open("forbidden");
        let stale = breaker.generation.load(Ordering::Acquire);

        breaker.close();
        breaker.open("forbidden again");
        breaker.close_generation(stale);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_overdue_circuit_closes_without_runtime() {
        let breaker = ModuleCircuitBreaker::new("jira", Duration::ZERO);
        breaker.open("forbidden");
        assert!(breaker.is_closed());
    }

    #[test]
    fn test_state_from_u8() {
        assert_eq!(CircuitState::from(0), CircuitState::Closed);
        assert_eq!(CircuitState::from(1), CircuitState::Open);
        assert_eq!(CircuitState::from(7), CircuitState::Open);
    }
}
