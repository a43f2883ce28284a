//! API route definitions
//!
//! Operator query surface:
//! - /api/v1/health - engine-level health summary
//! - /api/v1/targets - all per-target health states
//! - /api/v1/targets/{id} - one target's state
//! - /api/v1/targets/{id}/reset - clear attempt counter, re-arm remediation
//! - /api/v1/events - recent remediation audit events

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

/// Create all API routes for the operator surface
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/targets", get(handlers::get_targets))
        .route("/targets/:id", get(handlers::get_target))
        .route("/targets/:id/reset", post(handlers::reset_target))
        .route("/events", get(handlers::get_events))
        .with_state(state)
}
