//! Remediation state machine — the decision core
//!
//! Drives one target per evaluation: sample → classify → transition → act.
//! Escalation walks the policy ladder strictly in order; severity alone never
//! jumps to a more aggressive action. Failed actions retry the same rung,
//! successful-but-insufficient actions escalate, and every action charges the
//! attempt budget. Exhausting the budget is the only terminal condition.
//!
//! Anti-thrashing guarantee: while a target is cooling down, degraded
//! observations are recorded but ignored — no new action is dispatched before
//! `cooldown_duration` has elapsed since the last one.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::registry::MonitoredTarget;
use crate::storage::StateStore;
use crate::types::{
    ActionOutcome, HealthState, RemediationEvent, Severity, TargetHealthState,
};

/// Evaluates targets and owns all mutations of their health state.
pub struct RemediationEngine {
    store: Arc<dyn StateStore>,
    notify_tx: mpsc::UnboundedSender<RemediationEvent>,
}

impl RemediationEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        notify_tx: mpsc::UnboundedSender<RemediationEvent>,
    ) -> Self {
        Self { store, notify_tx }
    }

    /// Run one evaluation of one target.
    ///
    /// Skips silently if the target's previous evaluation is still in flight;
    /// state transitions for a single target are strictly serialized.
    pub async fn evaluate(&self, mt: &MonitoredTarget, now: DateTime<Utc>) {
        let mut st = match mt.state.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(target = %mt.target.id, "Evaluation still in flight — skipping tick");
                return;
            }
        };

        let severity = self.observe(mt).await;
        st.current_severity = severity;
        st.updated_at = now;

        match st.state {
            // Terminal states keep sampling for observability but issue no
            // actions until an operator resets the target.
            HealthState::Failed | HealthState::FallbackActive => {
                debug!(target = %mt.target.id, state = %st.state, severity = %severity, "Terminal target observed");
                self.persist(&st);
            }

            HealthState::Healthy => {
                if severity.is_degraded() {
                    self.transition(mt, &mut st, HealthState::Degraded, None, None, now);
                    self.remediate(mt, &mut st, now).await;
                } else {
                    self.persist(&st);
                }
            }

            HealthState::Degraded => {
                if severity.is_degraded() {
                    self.remediate(mt, &mut st, now).await;
                } else {
                    // Cleared up before any action was dispatched
                    st.attempt_count = 0;
                    st.last_action_index = 0;
                    self.transition(mt, &mut st, HealthState::Healthy, None, None, now);
                }
            }

            // Only reachable if a restore missed normalization; treat the
            // interrupted action as spent and cool down.
            HealthState::Remediating => {
                warn!(target = %mt.target.id, "Found in-flight REMEDIATING state — cooling down");
                self.transition(mt, &mut st, HealthState::CoolingDown, None, None, now);
            }

            HealthState::CoolingDown => {
                if !st.cooldown_elapsed(now, mt.policy.cooldown) {
                    // Anti-thrash: the observation is recorded, nothing dispatched
                    debug!(target = %mt.target.id, severity = %severity, "In cooldown — no action dispatched");
                    self.persist(&st);
                } else if severity.is_degraded() {
                    self.transition(mt, &mut st, HealthState::Degraded, None, None, now);
                    self.remediate(mt, &mut st, now).await;
                } else {
                    st.attempt_count = 0;
                    st.last_action_index = 0;
                    self.transition(mt, &mut st, HealthState::Healthy, None, None, now);
                }
            }
        }
    }

    /// Sample and classify. An unreachable source classifies as the target's
    /// configured unavailable severity, never as missing data.
    async fn observe(&self, mt: &MonitoredTarget) -> Severity {
        match mt.probe.sample(&mt.target).await {
            Ok(sample) => classify(sample.value, &mt.thresholds),
            Err(e) => {
                warn!(target = %mt.target.id, error = %e, "Metric source unavailable");
                mt.unavailable_severity
            }
        }
    }

    /// Select and execute the next remediation action, or go terminal when
    /// the attempt budget is spent. Called only with degraded severity.
    async fn remediate(&self, mt: &MonitoredTarget, st: &mut TargetHealthState, now: DateTime<Utc>) {
        if st.attempt_count >= mt.policy.max_attempts {
            match mt.policy.fallback_action {
                Some(fallback) => {
                    // Executed exactly once, on entry; the terminal state
                    // guard above prevents any re-execution.
                    info!(target = %mt.target.id, action = %fallback, "Attempt budget spent — engaging fallback");
                    let outcome = mt.executor.execute(fallback, &mt.target).await;
                    if !outcome.is_success() {
                        warn!(target = %mt.target.id, outcome = %outcome, "Fallback action did not succeed");
                    }
                    self.transition(
                        mt,
                        st,
                        HealthState::FallbackActive,
                        Some(fallback),
                        Some(outcome),
                        now,
                    );
                }
                None => {
                    warn!(
                        target = %mt.target.id,
                        attempts = st.attempt_count,
                        "Attempt budget spent with no fallback — operator intervention required"
                    );
                    self.transition(mt, st, HealthState::Failed, None, None, now);
                }
            }
            return;
        }

        let Some(action) = mt.policy.action_at(st.last_action_index) else {
            // Config validation forbids empty ladders; fail closed if one
            // slips through.
            warn!(target = %mt.target.id, "No action available in ladder");
            self.transition(mt, st, HealthState::Failed, None, None, now);
            return;
        };

        // Stamp the action time before persisting the REMEDIATING transition
        // so the cooldown survives even a crash mid-action.
        st.last_action_at = Some(now);
        self.transition(mt, st, HealthState::Remediating, Some(action), None, now);

        let outcome = mt.executor.execute(action, &mt.target).await;

        if outcome.is_success() {
            // Recheck: did the action actually clear the problem?
            let recheck = self.observe(mt).await;
            st.current_severity = recheck;

            if recheck == Severity::Normal {
                st.attempt_count = 0;
                st.last_action_index = 0;
                self.transition(mt, st, HealthState::Healthy, Some(action), Some(outcome), now);
            } else {
                // Action worked but the problem persists — escalate
                st.attempt_count += 1;
                st.last_action_index += 1;
                self.transition(
                    mt,
                    st,
                    HealthState::CoolingDown,
                    Some(action),
                    Some(outcome),
                    now,
                );
            }
        } else {
            // Failure or timeout: charge the budget but stay on the same
            // rung, so the tier gets another try after the cooldown.
            st.attempt_count += 1;
            self.transition(
                mt,
                st,
                HealthState::CoolingDown,
                Some(action),
                Some(outcome),
                now,
            );
        }
    }

    /// Apply a state transition: mutate, persist, audit, notify.
    fn transition(
        &self,
        mt: &MonitoredTarget,
        st: &mut TargetHealthState,
        to: HealthState,
        action: Option<crate::types::Action>,
        outcome: Option<ActionOutcome>,
        now: DateTime<Utc>,
    ) {
        let event = RemediationEvent {
            target_id: mt.target.id.clone(),
            timestamp: now,
            from_state: st.state,
            to_state: to,
            severity: st.current_severity,
            action_taken: action,
            outcome,
        };

        info!(
            target = %mt.target.id,
            from = %event.from_state,
            to = %event.to_state,
            severity = %event.severity,
            action = event.action_taken.map(|a| a.to_string()).unwrap_or_default(),
            "State transition"
        );

        st.state = to;
        st.updated_at = now;
        self.persist(st);

        if let Err(e) = self.store.append_event(&event) {
            warn!(target = %mt.target.id, error = %e, "Failed to append audit event");
        }

        // Fire-and-forget: a full or closed notifier never blocks remediation
        let _ = self.notify_tx.send(event);
    }

    fn persist(&self, st: &TargetHealthState) {
        if let Err(e) = self.store.save_state(st) {
            warn!(target = %st.target_id, error = %e, "Failed to persist health state");
        }
    }
}
