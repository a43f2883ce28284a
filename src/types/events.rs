//! Remediation audit events
//!
//! Every state transition produces a `RemediationEvent`. Events are append-only:
//! written by the engine, persisted to the audit log, and fanned out to the
//! notifier. They are never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, HealthState, Severity};

/// Result of one action execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", content = "detail", rename_all = "kebab-case")]
pub enum ActionOutcome {
    Success,
    Failure(String),
    /// Action exceeded its bounded execution window; treated as failure
    Timeout,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success)
    }
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionOutcome::Success => write!(f, "success"),
            ActionOutcome::Failure(detail) => write!(f, "failure: {}", detail),
            ActionOutcome::Timeout => write!(f, "timeout"),
        }
    }
}

/// Append-only audit record of one state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationEvent {
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
    pub from_state: HealthState,
    pub to_state: HealthState,
    pub severity: Severity,
    /// Action dispatched as part of this transition, if any
    pub action_taken: Option<Action>,
    /// Outcome of that action, once known
    pub outcome: Option<ActionOutcome>,
}

impl RemediationEvent {
    /// Signature used for duplicate-alert suppression: two events with the
    /// same signature within the dedup window are considered the same alert.
    pub fn dedup_signature(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.to_state,
            self.severity,
            self.action_taken.map(|a| a.to_string()).unwrap_or_default(),
            self.outcome
                .as_ref()
                .map(|o| match o {
                    ActionOutcome::Success => "success",
                    ActionOutcome::Failure(_) => "failure",
                    ActionOutcome::Timeout => "timeout",
                })
                .unwrap_or_default(),
        )
    }
}
