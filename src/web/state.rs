//! # Web Application State

use std::sync::Arc;

use crate::health::HealthManager;

/// Shared state handed to every request handler
#[derive(Clone, Debug)]
pub struct AppState {
    /// Source of the bridge verdict
    pub health: Arc<HealthManager>,
}

impl AppState {
    pub fn new(health: Arc<HealthManager>) -> Self {
        Self { health }
    }
}
