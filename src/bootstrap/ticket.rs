//! Retry tickets: the unit of bootstrap work.

use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use super::module::IntegrationModule;

/// One module awaiting (re)activation
#[derive(Clone)]
pub struct RetryTicket {
    ticket_id: Uuid,
    module_id: String,
    module_type: String,
    attempt_count: u32,
    not_before: Option<Instant>,
    module: Arc<dyn IntegrationModule>,
}

impl fmt::Debug for RetryTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTicket")
            .field("ticket_id", &self.ticket_id)
            .field("module_id", &self.module_id)
            .field("module_type", &self.module_type)
            .field("attempt_count", &self.attempt_count)
            .field("not_before", &self.not_before)
            .finish()
    }
}

impl RetryTicket {
    pub fn new(module_id: impl Into<String>, module: Arc<dyn IntegrationModule>) -> Self {
        Self {
            ticket_id: Uuid::new_v4(),
            module_id: module_id.into(),
            module_type: module.module_type().to_string(),
            attempt_count: 0,
            not_before: None,
            module,
        }
    }

    /// Identity kept across retries of the same discovery
    pub fn ticket_id(&self) -> Uuid {
        self.ticket_id
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn module_type(&self) -> &str {
        &self.module_type
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn module(&self) -> &Arc<dyn IntegrationModule> {
        &self.module
    }

    /// Count a failed attempt, saturating at `u32::MAX`
    pub fn record_attempt(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }

    /// Hold the ticket back until `instant`
    pub fn defer_until(&mut self, instant: Instant) {
        self.not_before = Some(instant);
    }

    pub fn not_before(&self) -> Option<Instant> {
        self.not_before
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |not_before| now >= not_before)
    }
}
