//! Operator endpoints: engine health, target states, events, manual reset

use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::registry::TargetRegistry;
use crate::storage::StateStore;
use crate::types::{HealthState, RemediationEvent, TargetHealthState};

/// Shared state for all operator endpoints.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<TargetRegistry>,
    pub store: Arc<dyn StateStore>,
    pub notify_tx: mpsc::UnboundedSender<RemediationEvent>,
    pub cycles: Arc<AtomicU64>,
}

/// Read a target's current state from the store (the engine persists after
/// every mutation, so this is the latest without contending for the
/// per-target lock).
fn current_state(state: &ApiState, target_id: &str) -> TargetHealthState {
    match state.store.load_state(target_id) {
        Ok(Some(st)) => st,
        Ok(None) => TargetHealthState::new(target_id),
        Err(e) => {
            warn!(target = target_id, error = %e, "Could not load state for API read");
            TargetHealthState::new(target_id)
        }
    }
}

// ============================================================================
// Engine Health
// ============================================================================

/// Engine-level summary for dashboards and liveness checks
#[derive(Debug, Serialize)]
pub struct EngineHealth {
    /// Worst state across all targets
    pub overall: String,
    pub targets_total: usize,
    pub targets_healthy: usize,
    pub targets_degraded: usize,
    /// FAILED / FALLBACK_ACTIVE targets awaiting operator reset
    pub targets_terminal: usize,
    pub check_cycles: u64,
}

fn state_rank(state: HealthState) -> u8 {
    match state {
        HealthState::Healthy => 0,
        HealthState::Degraded | HealthState::Remediating | HealthState::CoolingDown => 1,
        HealthState::Failed | HealthState::FallbackActive => 2,
    }
}

/// GET /api/v1/health
pub async fn get_health(State(state): State<ApiState>) -> Response {
    let mut worst = HealthState::Healthy;
    let mut healthy = 0;
    let mut degraded = 0;
    let mut terminal = 0;

    for mt in state.registry.targets() {
        let st = current_state(&state, &mt.target.id);
        match state_rank(st.state) {
            0 => healthy += 1,
            1 => degraded += 1,
            _ => terminal += 1,
        }
        if state_rank(st.state) > state_rank(worst) {
            worst = st.state;
        }
    }

    ApiResponse::ok(EngineHealth {
        overall: worst.to_string(),
        targets_total: state.registry.len(),
        targets_healthy: healthy,
        targets_degraded: degraded,
        targets_terminal: terminal,
        check_cycles: state.cycles.load(Ordering::Relaxed),
    })
}

// ============================================================================
// Target States
// ============================================================================

/// GET /api/v1/targets
pub async fn get_targets(State(state): State<ApiState>) -> Response {
    let states: Vec<TargetHealthState> = state
        .registry
        .targets()
        .iter()
        .map(|mt| current_state(&state, &mt.target.id))
        .collect();
    ApiResponse::ok(states)
}

/// GET /api/v1/targets/{id}
pub async fn get_target(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    if state.registry.get(&id).is_none() {
        return ApiErrorResponse::not_found(format!("unknown target: {}", id));
    }
    ApiResponse::ok(current_state(&state, &id))
}

/// POST /api/v1/targets/{id}/reset
///
/// Operator recovery: clears the attempt counter and returns the target to
/// HEALTHY, re-arming automatic remediation for FAILED / FALLBACK_ACTIVE
/// targets. Waits for any in-flight evaluation to finish first.
pub async fn reset_target(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let Some(mt) = state.registry.get(&id) else {
        return ApiErrorResponse::not_found(format!("unknown target: {}", id));
    };

    let now = Utc::now();
    let mut st = mt.state.lock().await;
    let from_state = st.state;
    st.reset(now);

    if let Err(e) = state.store.save_state(&st) {
        return ApiErrorResponse::internal(format!("failed to persist reset: {}", e));
    }

    let event = RemediationEvent {
        target_id: id.clone(),
        timestamp: now,
        from_state,
        to_state: HealthState::Healthy,
        severity: st.current_severity,
        action_taken: None,
        outcome: None,
    };
    if let Err(e) = state.store.append_event(&event) {
        warn!(target = %id, error = %e, "Failed to audit manual reset");
    }
    let _ = state.notify_tx.send(event);

    info!(target = %id, from = %from_state, "Operator reset");
    ApiResponse::ok(st.clone())
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
    pub target: Option<String>,
}

/// GET /api/v1/events?limit=N&target=id
pub async fn get_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50).min(1000);

    let result = match query.target {
        Some(target_id) => state.store.events_for_target(&target_id, limit),
        None => state.store.recent_events(limit),
    };

    match result {
        Ok(events) => ApiResponse::ok(events),
        Err(e) => ApiErrorResponse::internal(format!("failed to read events: {}", e)),
    }
}
