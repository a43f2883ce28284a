//! Target registry — monitored targets with resolved capabilities
//!
//! Built once at startup from validated configuration. Each entry binds a
//! target to its thresholds, policy, probe, and executor; the probe and
//! executor are resolved here, at configuration time, so nothing dispatches
//! on strings while the engine runs.
//!
//! The per-target async mutex around `TargetHealthState` is the single-owner
//! guarantee: two ticks can never mutate the same target concurrently.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::classify::ThresholdSet;
use crate::config::{ConfigError, TargetConfig, WardenConfig};
use crate::engine::{ActionExecutor, CommandExecutor};
use crate::probe::{
    DiskUsageProbe, JsonRpcProbe, MemoryUsageProbe, MetricSource, ProcessRssProbe, RpcMetricSource,
};
use crate::storage::StateStore;
use crate::types::{
    HealthState, MetricKind, RemediationPolicy, Severity, Target, TargetHealthState,
};

/// One monitored target with its resolved collaborators and owned state.
pub struct MonitoredTarget {
    pub target: Target,
    pub thresholds: ThresholdSet,
    pub policy: RemediationPolicy,
    /// Severity assigned when the probe cannot reach the target
    pub unavailable_severity: Severity,
    pub probe: Arc<dyn MetricSource>,
    pub executor: Arc<dyn ActionExecutor>,
    /// Exclusive owner of this target's mutable health state
    pub state: Mutex<TargetHealthState>,
}

/// All monitored targets, keyed by id.
pub struct TargetRegistry {
    targets: Vec<Arc<MonitoredTarget>>,
}

impl TargetRegistry {
    /// Build the registry from configuration, restoring persisted state.
    pub fn from_config(
        config: &WardenConfig,
        store: &dyn StateStore,
    ) -> Result<Self, ConfigError> {
        let mut targets = Vec::with_capacity(config.targets.len());

        for tc in &config.targets {
            let target = tc.target();
            let probe = resolve_probe(tc)?;
            let executor: Arc<dyn ActionExecutor> = Arc::new(CommandExecutor::new(
                tc.commands.clone(),
                tc.process_name.clone(),
                Duration::from_secs(tc.action_timeout_secs),
                Duration::from_secs(tc.graceful_wait_secs),
            ));
            let policy = tc.remediation_policy();
            let state = restore_state(&target.id, &policy, store);

            targets.push(Arc::new(MonitoredTarget {
                target,
                thresholds: tc.thresholds(),
                policy,
                unavailable_severity: tc.unavailable_severity.into(),
                probe,
                executor,
                state: Mutex::new(state),
            }));
        }

        info!(targets = targets.len(), "Target registry built");
        Ok(Self { targets })
    }

    /// Registry from pre-built targets (tests and embedding).
    pub fn from_targets(targets: Vec<Arc<MonitoredTarget>>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[Arc<MonitoredTarget>] {
        &self.targets
    }

    pub fn get(&self, id: &str) -> Option<&Arc<MonitoredTarget>> {
        self.targets.iter().find(|t| t.target.id == id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Resolve the probe capability for a target's metric kind.
fn resolve_probe(tc: &TargetConfig) -> Result<Arc<dyn MetricSource>, ConfigError> {
    let missing = |what: &str| {
        ConfigError::Invalid(format!("target {}: missing {} for {}", tc.id, what, tc.metric))
    };

    let probe: Arc<dyn MetricSource> = match tc.metric {
        MetricKind::Disk => {
            let path = tc.path.clone().ok_or_else(|| missing("path"))?;
            Arc::new(DiskUsageProbe::new(path))
        }
        MetricKind::Memory => Arc::new(MemoryUsageProbe),
        MetricKind::ProcessRss => {
            let name = tc.process_name.clone().ok_or_else(|| missing("process-name"))?;
            Arc::new(ProcessRssProbe::new(name))
        }
        MetricKind::RpcLatency | MetricKind::SyncLag | MetricKind::PeerCount => {
            let endpoint = tc.endpoint.as_deref().ok_or_else(|| missing("endpoint"))?;
            let rpc = JsonRpcProbe::new(endpoint, Duration::from_secs(tc.probe_timeout_secs));
            Arc::new(RpcMetricSource::new(rpc, tc.metric))
        }
    };
    Ok(probe)
}

/// Load a target's persisted state, or create a fresh HEALTHY one.
///
/// A state persisted as REMEDIATING means the previous process died mid-action.
/// The interrupted action counts as a failed attempt and the target cools
/// down, so a crash loop cannot defeat the attempt budget.
fn restore_state(
    target_id: &str,
    policy: &RemediationPolicy,
    store: &dyn StateStore,
) -> TargetHealthState {
    match store.load_state(target_id) {
        Ok(Some(mut state)) => {
            if state.state == HealthState::Remediating {
                warn!(
                    target = target_id,
                    "Persisted state was REMEDIATING — counting interrupted action as failed"
                );
                state.attempt_count = (state.attempt_count + 1).min(policy.max_attempts);
                state.state = HealthState::CoolingDown;
            }
            info!(
                target = target_id,
                state = %state.state,
                attempts = state.attempt_count,
                "Restored persisted health state"
            );
            state
        }
        Ok(None) => TargetHealthState::new(target_id),
        Err(e) => {
            warn!(target = target_id, error = %e, "Could not load persisted state — starting fresh");
            TargetHealthState::new(target_id)
        }
    }
}
