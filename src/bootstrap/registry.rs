//! # Bootstrap Registry
//!
//! Lock-free FIFO of retry tickets shared by discovery, the scheduler tick and the
//! activation workers. A [`Notify`] wakes consumers waiting in [`BootstrapRegistry::poll`].
//!
//! The registry also remembers the current ticket of every offered module. Withdrawing a
//! module forgets it, so outcomes of activations still running for it are discarded and
//! its stragglers are never queued again.

use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use super::ticket::RetryTicket;

#[derive(Debug, Default)]
pub struct BootstrapRegistry {
    queue: SegQueue<RetryTicket>,
    notify: Notify,
    /// Module id to the ticket currently responsible for it
    current: DashMap<String, Uuid>,
}

impl BootstrapRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new ticket, making it the current one for its module, and wake one consumer
    pub fn offer(&self, ticket: RetryTicket) {
        self.current
            .insert(ticket.module_id().to_string(), ticket.ticket_id());
        self.push(ticket);
    }

    /// Put a ticket back unless its module was withdrawn or rediscovered meanwhile
    pub fn requeue(&self, ticket: RetryTicket) -> bool {
        let Some(current) = self.current.get(ticket.module_id()) else {
            return false;
        };
        if *current != ticket.ticket_id() {
            return false;
        }
        self.push(ticket);
        true
    }

    /// Run `apply` while `ticket` is still current for its module
    ///
    /// A concurrent [`withdraw`](Self::withdraw) of the module waits until `apply` returns.
    pub fn with_current<R>(&self, ticket: &RetryTicket, apply: impl FnOnce() -> R) -> Option<R> {
        let current = self.current.get(ticket.module_id())?;
        (*current == ticket.ticket_id()).then(apply)
    }

    pub fn is_current(&self, ticket: &RetryTicket) -> bool {
        self.with_current(ticket, || ()).is_some()
    }

    /// Forget a module and drop its queued tickets
    ///
    /// Returns the number of tickets removed from the queue.
    pub fn withdraw(&self, module_id: &str) -> usize {
        self.current.remove(module_id);
        self.retain(|ticket| ticket.module_id() != module_id)
    }

    fn push(&self, ticket: RetryTicket) {
        self.queue.push(ticket);
        self.notify.notify_one();
    }

    /// Take the next ticket, waiting up to `wait` for one to arrive
    pub async fn poll(&self, wait: Duration) -> Option<RetryTicket> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(ticket) = self.queue.pop() {
                return Some(ticket);
            }
            if timeout_at(deadline, notified).await.is_err() {
                return self.queue.pop();
            }
        }
    }

    /// Take the next ticket without waiting
    pub fn try_poll(&self) -> Option<RetryTicket> {
        self.queue.pop()
    }

    /// Drop queued tickets rejected by `keep`, preserving the order of the rest
    ///
    /// Returns the number of tickets removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&RetryTicket) -> bool,
    {
        let mut removed = 0;
        for _ in 0..self.queue.len() {
            let Some(ticket) = self.queue.pop() else {
                break;
            };
            if keep(&ticket) {
                self.queue.push(ticket);
            } else {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::module::{ActivationOutcome, IntegrationModule};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl IntegrationModule for Noop {
        fn module_type(&self) -> &str {
            "noop"
        }

        async fn activate(&self, _module_id: &str) -> ActivationOutcome {
            ActivationOutcome::Activated
        }
    }

    fn ticket(id: &str) -> RetryTicket {
        RetryTicket::new(id, Arc::new(Noop))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let registry = BootstrapRegistry::new();
        registry.offer(ticket("a"));
        registry.offer(ticket("b"));
        assert_eq!(registry.len(), 2);

        let wait = Duration::from_millis(10);
        assert_eq!(registry.poll(wait).await.unwrap().module_id(), "a");
        assert_eq!(registry.poll(wait).await.unwrap().module_id(), "b");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_poll_pending_until_offer() {
        let registry = BootstrapRegistry::new();
        let mut poll = tokio_test::task::spawn(registry.poll(Duration::from_secs(5)));
        tokio_test::assert_pending!(poll.poll());

        registry.offer(ticket("woken"));
        assert!(poll.is_woken());
        let polled = tokio_test::assert_ready!(poll.poll());
        assert_eq!(polled.unwrap().module_id(), "woken");
    }

    #[tokio::test]
    async fn test_retain_removes_matching_tickets() {
        let registry = BootstrapRegistry::new();
        registry.offer(ticket("a"));
        registry.offer(ticket("b"));
        registry.offer(ticket("c"));

        assert_eq!(registry.retain(|t| t.module_id() != "b"), 1);
        assert_eq!(registry.try_poll().unwrap().module_id(), "a");
        assert_eq!(registry.try_poll().unwrap().module_id(), "c");
        assert!(registry.try_poll().is_none());
    }

    #[tokio::test]
    async fn test_withdraw_forgets_module() {
        let registry = BootstrapRegistry::new();
        registry.offer(ticket("a"));
        registry.offer(ticket("b"));

        let in_flight = registry.try_poll().unwrap();
        assert!(registry.is_current(&in_flight));

        assert_eq!(registry.withdraw("a"), 0);
        assert!(!registry.is_current(&in_flight));
        assert!(registry.with_current(&in_flight, || "applied").is_none());
        assert!(!registry.requeue(in_flight));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.withdraw("b"), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_rediscovery_supersedes_old_ticket() {
        let registry = BootstrapRegistry::new();
        registry.offer(ticket("a"));
        let old = registry.try_poll().unwrap();

        registry.offer(ticket("a"));
        assert!(!registry.is_current(&old));
        assert!(!registry.requeue(old));

        let new = registry.try_poll().unwrap();
        assert!(registry.is_current(&new));
        assert!(registry.requeue(new));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_when_empty() {
        let registry = BootstrapRegistry::new();
        assert!(registry.poll(Duration::from_secs(5)).await.is_none());
    }

    #[tokio::test]
    async fn test_poll_wakes_on_offer() {
        let registry = Arc::new(BootstrapRegistry::new());
        let consumer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.poll(Duration::from_secs(5)).await })
        };

        tokio::task::yield_now().await;
        registry.offer(ticket("late"));

        let polled = consumer.await.unwrap();
        assert_eq!(polled.unwrap().module_id(), "late");
    }
}
