//! # Web Module
//!
//! Axum router exposing the read-only health surface of the bridge.
//!
//! - [`handlers`] - Request handlers
//! - [`state`] - Shared application state

pub mod handlers;
pub mod state;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;

use crate::health::HealthManager;
use state::AppState;

/// Health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::bridge_health))
}

/// Create the application router
pub fn create_app(health: Arc<HealthManager>) -> Router {
    Router::new()
        .merge(health_routes())
        .with_state(AppState::new(health))
}
