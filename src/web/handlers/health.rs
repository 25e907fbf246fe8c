//! # Health Check Handlers
//!
//! Read-only bridge health for load balancers and operators.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::debug;

use crate::health::{AggregateHealth, HealthStatus};
use crate::web::state::AppState;

/// Bridge health: GET /health
///
/// Recomputes the verdict on every call. Responds 200 when the bridge is up and 503
/// otherwise; the body is the full [`AggregateHealth`] either way.
pub async fn bridge_health(State(state): State<AppState>) -> (StatusCode, Json<AggregateHealth>) {
    let health = state.health.health().await;
    debug!(status = ?health.status, message = %health.message, "Health queried");

    (status_code(health.status), Json(health))
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}
