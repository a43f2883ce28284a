//! Monitored targets and their remediation policies

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What category of thing a target is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// A filesystem path whose usage is watched (e.g. chain data directory)
    FilesystemPath,
    /// System memory as a whole
    MemoryPool,
    /// A named service or process reachable via RPC and restartable via commands
    ManagedService,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::FilesystemPath => write!(f, "filesystem-path"),
            TargetKind::MemoryPool => write!(f, "memory-pool"),
            TargetKind::ManagedService => write!(f, "managed-service"),
        }
    }
}

/// A monitored unit. Created once at startup from configuration, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub kind: TargetKind,
    /// Filesystem path for disk targets
    pub path: Option<PathBuf>,
    /// RPC endpoint URL for managed services
    pub endpoint: Option<String>,
    /// Process name for RSS / existence probes
    pub process_name: Option<String>,
}

/// A remediation action, ordered from least to most disruptive in a ladder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Remove regenerable cache data
    ClearCache,
    /// Rotate / truncate log files
    RotateLogs,
    /// Aggressive cleanup of reclaimable storage
    PurgeStorage,
    /// Stop with bounded wait, then start
    GracefulRestart,
    /// Kill without waiting, then start
    ForceRestart,
    /// Route traffic to a backup endpoint; stays active until operator reset
    EnableFallback,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::ClearCache => write!(f, "clear-cache"),
            Action::RotateLogs => write!(f, "rotate-logs"),
            Action::PurgeStorage => write!(f, "purge-storage"),
            Action::GracefulRestart => write!(f, "graceful-restart"),
            Action::ForceRestart => write!(f, "force-restart"),
            Action::EnableFallback => write!(f, "enable-fallback"),
        }
    }
}

/// Per-target remediation policy.
///
/// The ladder is ordered least → most disruptive; escalation walks it
/// sequentially. Once `max_attempts` is spent the target goes terminal
/// (FAILED, or FALLBACK_ACTIVE when `fallback_action` is set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    pub ladder: Vec<Action>,
    pub fallback_action: Option<Action>,
}

impl RemediationPolicy {
    /// Ladder entry for the given index, clamped to the last entry.
    ///
    /// Severity never jumps the ladder; selection is strictly sequential.
    pub fn action_at(&self, index: usize) -> Option<Action> {
        if self.ladder.is_empty() {
            return None;
        }
        Some(self.ladder[index.min(self.ladder.len() - 1)])
    }
}

/// Serialize `Duration` as whole seconds for config and API payloads.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(ladder: Vec<Action>) -> RemediationPolicy {
        RemediationPolicy {
            max_attempts: 3,
            cooldown: Duration::from_secs(300),
            ladder,
            fallback_action: None,
        }
    }

    #[test]
    fn action_selection_clamps_to_last_rung() {
        let p = policy(vec![Action::ClearCache, Action::RotateLogs]);
        assert_eq!(p.action_at(0), Some(Action::ClearCache));
        assert_eq!(p.action_at(1), Some(Action::RotateLogs));
        assert_eq!(p.action_at(7), Some(Action::RotateLogs));
    }

    #[test]
    fn empty_ladder_selects_nothing() {
        assert_eq!(policy(vec![]).action_at(0), None);
    }

    #[test]
    fn action_kebab_case_round_trip() {
        let json = serde_json::to_string(&Action::GracefulRestart).unwrap();
        assert_eq!(json, "\"graceful-restart\"");
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Action::GracefulRestart);
    }
}
