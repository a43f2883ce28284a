//! Per-target mutable health state
//!
//! One `TargetHealthState` exists per target for the process lifetime. It is
//! mutated only by the remediation engine (single owner per target) and is
//! written to durable storage after every transition so attempt counts and
//! cooldown timestamps survive a crash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Severity;

/// Lifecycle state of a monitored target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthState {
    /// Last classification was NORMAL; no remediation pending
    Healthy,
    /// Severity at or above WARNING observed; evaluating remediation
    Degraded,
    /// An action is currently executing
    Remediating,
    /// Waiting out the post-action cooldown before re-evaluating
    CoolingDown,
    /// Attempt budget spent, no fallback configured. Operator reset required.
    Failed,
    /// Attempt budget spent, fallback engaged. Operator reset required.
    FallbackActive,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "HEALTHY"),
            HealthState::Degraded => write!(f, "DEGRADED"),
            HealthState::Remediating => write!(f, "REMEDIATING"),
            HealthState::CoolingDown => write!(f, "COOLING_DOWN"),
            HealthState::Failed => write!(f, "FAILED"),
            HealthState::FallbackActive => write!(f, "FALLBACK_ACTIVE"),
        }
    }
}

impl HealthState {
    /// Terminal states take no further automatic actions until operator reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HealthState::Failed | HealthState::FallbackActive)
    }
}

/// Mutable health record for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetHealthState {
    pub target_id: String,
    pub state: HealthState,
    pub current_severity: Severity,
    /// Actions spent on the current problem; reset to 0 on any HEALTHY transition
    pub attempt_count: u32,
    /// When the most recent action was dispatched
    pub last_action_at: Option<DateTime<Utc>>,
    /// Next escalation-ladder index to attempt
    pub last_action_index: usize,
    pub updated_at: DateTime<Utc>,
}

impl TargetHealthState {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            state: HealthState::Healthy,
            current_severity: Severity::Normal,
            attempt_count: 0,
            last_action_at: None,
            last_action_index: 0,
            updated_at: Utc::now(),
        }
    }

    /// Whether the post-action cooldown has elapsed at `now`.
    ///
    /// With no action dispatched yet there is nothing to cool down from.
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_action_at {
            None => true,
            Some(at) => {
                let elapsed = now.signed_duration_since(at);
                elapsed >= chrono::Duration::from_std(cooldown).unwrap_or(chrono::TimeDelta::MAX)
            }
        }
    }

    /// Clear counters and return to HEALTHY. Operator-initiated only.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.state = HealthState::Healthy;
        self.current_severity = Severity::Normal;
        self.attempt_count = 0;
        self.last_action_index = 0;
        self.last_action_at = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_healthy() {
        let st = TargetHealthState::new("geth");
        assert_eq!(st.state, HealthState::Healthy);
        assert_eq!(st.attempt_count, 0);
        assert!(st.last_action_at.is_none());
    }

    #[test]
    fn cooldown_without_prior_action_is_elapsed() {
        let st = TargetHealthState::new("geth");
        assert!(st.cooldown_elapsed(Utc::now(), Duration::from_secs(300)));
    }

    #[test]
    fn cooldown_elapses_with_time() {
        let mut st = TargetHealthState::new("geth");
        let t0 = Utc::now();
        st.last_action_at = Some(t0);

        let cooldown = Duration::from_secs(300);
        assert!(!st.cooldown_elapsed(t0 + chrono::Duration::seconds(299), cooldown));
        assert!(st.cooldown_elapsed(t0 + chrono::Duration::seconds(300), cooldown));
    }

    #[test]
    fn reset_clears_counters() {
        let mut st = TargetHealthState::new("geth");
        st.state = HealthState::Failed;
        st.attempt_count = 3;
        st.last_action_index = 2;
        st.last_action_at = Some(Utc::now());

        st.reset(Utc::now());
        assert_eq!(st.state, HealthState::Healthy);
        assert_eq!(st.attempt_count, 0);
        assert_eq!(st.last_action_index, 0);
        assert!(st.last_action_at.is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(HealthState::Failed.is_terminal());
        assert!(HealthState::FallbackActive.is_terminal());
        assert!(!HealthState::CoolingDown.is_terminal());
    }
}
