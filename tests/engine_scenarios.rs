//! Remediation Engine Scenario Tests
//!
//! Exercises the full monitor → classify → remediate → verify loop against
//! scripted probes and executors: escalation, attempt budgets, fallback
//! engagement, probe outages, and durability of anti-thrashing state across
//! a simulated restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use node_warden::{
    classify::{Direction, ThresholdSet},
    ActionExecutor, MetricSource, MonitoredTarget, ProbeError, RemediationEngine, TargetRegistry,
};
use node_warden::{
    Action, ActionOutcome, HealthState, InMemoryStore, MetricKind, MetricSample,
    RemediationPolicy, Severity, SledStore, StateStore, Target, TargetHealthState, TargetKind,
};

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Probe that replays a scripted sequence of readings, repeating the last.
struct ScriptedProbe {
    readings: Mutex<VecDeque<Result<f64, ()>>>,
    last: Mutex<Result<f64, ()>>,
    kind: MetricKind,
}

impl ScriptedProbe {
    fn new(kind: MetricKind, readings: Vec<Result<f64, ()>>) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().collect()),
            last: Mutex::new(Ok(0.0)),
            kind,
        }
    }
}

#[async_trait]
impl MetricSource for ScriptedProbe {
    async fn sample(&self, target: &Target) -> Result<MetricSample, ProbeError> {
        let reading = {
            let mut readings = self.readings.lock().unwrap();
            let r = readings.pop_front().unwrap_or(*self.last.lock().unwrap());
            *self.last.lock().unwrap() = r;
            r
        };
        match reading {
            Ok(v) => Ok(MetricSample::new(&target.id, self.kind, v)),
            Err(()) => Err(ProbeError::Unavailable("scripted outage".to_string())),
        }
    }
}

/// Executor that records every dispatched action and replays scripted
/// outcomes, defaulting to failure once the script runs out.
struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<ActionOutcome>>,
    dispatched: Mutex<Vec<Action>>,
}

impl ScriptedExecutor {
    fn new(outcomes: Vec<ActionOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    fn dispatched(&self) -> Vec<Action> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute(&self, action: Action, _target: &Target) -> ActionOutcome {
        self.dispatched.lock().unwrap().push(action);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ActionOutcome::Failure("scripted failure".to_string()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    target: Arc<MonitoredTarget>,
    executor: Arc<ScriptedExecutor>,
    engine: RemediationEngine,
    store: Arc<InMemoryStore>,
    _notify_rx: mpsc::UnboundedReceiver<node_warden::RemediationEvent>,
}

fn disk_thresholds() -> ThresholdSet {
    ThresholdSet {
        metric_kind: MetricKind::Disk,
        direction: Direction::HigherIsWorse,
        warning: 80.0,
        critical: 90.0,
        emergency: None,
    }
}

fn fixture(
    probe: ScriptedProbe,
    outcomes: Vec<ActionOutcome>,
    ladder: Vec<Action>,
    fallback: Option<Action>,
) -> Fixture {
    let executor = Arc::new(ScriptedExecutor::new(outcomes));
    let target = Arc::new(MonitoredTarget {
        target: Target {
            id: "t1".to_string(),
            kind: TargetKind::FilesystemPath,
            path: None,
            endpoint: None,
            process_name: None,
        },
        thresholds: disk_thresholds(),
        policy: RemediationPolicy {
            max_attempts: 3,
            cooldown: Duration::from_secs(300),
            ladder,
            fallback_action: fallback,
        },
        unavailable_severity: Severity::Critical,
        probe: Arc::new(probe),
        executor: executor.clone(),
        state: tokio::sync::Mutex::new(TargetHealthState::new("t1")),
    });

    let store = Arc::new(InMemoryStore::new());
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = RemediationEngine::new(store.clone(), tx);

    Fixture {
        target,
        executor,
        engine,
        store,
        _notify_rx: rx,
    }
}

fn ts(base: DateTime<Utc>, offset_secs: i64) -> DateTime<Utc> {
    base + chrono::Duration::seconds(offset_secs)
}

fn count_transitions_to(events: &[node_warden::RemediationEvent], state: HealthState) -> usize {
    events.iter().filter(|e| e.to_state == state).count()
}

// ============================================================================
// Scenario A: warning-level disk usage cleared by the first rung
// ============================================================================

#[tokio::test]
async fn scenario_a_disk_warning_cleared_by_cache_clear() {
    // 82% against {warning: 80, critical: 90} → WARNING; clear-cache runs,
    // recheck reads 75% → HEALTHY with the attempt counter reset.
    let fx = fixture(
        ScriptedProbe::new(MetricKind::Disk, vec![Ok(82.0), Ok(75.0)]),
        vec![ActionOutcome::Success],
        vec![Action::ClearCache, Action::RotateLogs],
        None,
    );

    fx.engine.evaluate(&fx.target, Utc::now()).await;

    let st = fx.target.state.lock().await;
    assert_eq!(st.state, HealthState::Healthy);
    assert_eq!(st.attempt_count, 0);
    assert_eq!(st.last_action_index, 0);
    assert_eq!(fx.executor.dispatched(), vec![Action::ClearCache]);

    let events = fx.store.events_for_target("t1", 100).unwrap();
    assert_eq!(count_transitions_to(&events, HealthState::Degraded), 1);
    assert_eq!(count_transitions_to(&events, HealthState::Remediating), 1);
    assert_eq!(count_transitions_to(&events, HealthState::Healthy), 1);
}

// ============================================================================
// Scenario B: attempt budget exhausted with no fallback
// ============================================================================

#[tokio::test]
async fn scenario_b_three_failed_restarts_go_terminal() {
    let fx = fixture(
        ScriptedProbe::new(MetricKind::RpcLatency, vec![Err(())]),
        Vec::new(), // every restart fails
        vec![Action::GracefulRestart],
        None,
    );

    let base = Utc::now();
    for i in 0..5 {
        fx.engine.evaluate(&fx.target, ts(base, i * 301)).await;
    }

    let st = fx.target.state.lock().await;
    assert_eq!(st.state, HealthState::Failed);
    assert_eq!(st.attempt_count, 3);

    let events = fx.store.events_for_target("t1", 100).unwrap();
    assert_eq!(count_transitions_to(&events, HealthState::Remediating), 3);
    assert_eq!(count_transitions_to(&events, HealthState::Failed), 1);
}

// ============================================================================
// Scenario C: fallback engages exactly once after budget exhaustion
// ============================================================================

#[tokio::test]
async fn scenario_c_fallback_engages_exactly_once() {
    let fx = fixture(
        ScriptedProbe::new(MetricKind::RpcLatency, vec![Err(())]),
        Vec::new(),
        vec![Action::GracefulRestart],
        Some(Action::EnableFallback),
    );

    let base = Utc::now();
    for i in 0..5 {
        fx.engine.evaluate(&fx.target, ts(base, i * 301)).await;
    }

    {
        let st = fx.target.state.lock().await;
        assert_eq!(st.state, HealthState::FallbackActive);
    }

    // Forced second evaluation after entering the terminal state: the
    // fallback must not run again.
    fx.engine.evaluate(&fx.target, ts(base, 10_000)).await;

    let fallbacks = fx
        .executor
        .dispatched()
        .into_iter()
        .filter(|a| *a == Action::EnableFallback)
        .count();
    assert_eq!(fallbacks, 1);

    let st = fx.target.state.lock().await;
    assert_eq!(st.state, HealthState::FallbackActive);
}

// ============================================================================
// Scenario D: probe outage never crashes the loop for other targets
// ============================================================================

#[tokio::test]
async fn scenario_d_unavailable_probe_is_contained() {
    let down = fixture(
        ScriptedProbe::new(MetricKind::RpcLatency, vec![Err(()), Err(())]),
        vec![ActionOutcome::Success],
        vec![Action::GracefulRestart],
        None,
    );
    let up_probe = ScriptedProbe::new(MetricKind::Disk, vec![Ok(40.0)]);
    let up_executor = Arc::new(ScriptedExecutor::new(Vec::new()));
    let up = Arc::new(MonitoredTarget {
        target: Target {
            id: "t2".to_string(),
            kind: TargetKind::FilesystemPath,
            path: None,
            endpoint: None,
            process_name: None,
        },
        thresholds: disk_thresholds(),
        policy: RemediationPolicy {
            max_attempts: 3,
            cooldown: Duration::from_secs(300),
            ladder: vec![Action::ClearCache],
            fallback_action: None,
        },
        unavailable_severity: Severity::Critical,
        probe: Arc::new(up_probe),
        executor: up_executor,
        state: tokio::sync::Mutex::new(TargetHealthState::new("t2")),
    });

    let registry = Arc::new(TargetRegistry::from_targets(vec![
        down.target.clone(),
        up.clone(),
    ]));
    let (tx, _rx) = mpsc::unbounded_channel();
    let engine = Arc::new(RemediationEngine::new(down.store.clone(), tx));
    let scheduler = node_warden::Scheduler::new(
        registry,
        engine,
        Duration::from_secs(30),
        tokio_util::sync::CancellationToken::new(),
    );

    scheduler.run_cycle().await;
    scheduler.run_cycle().await;

    // Both outage ticks classified CRITICAL, target degraded but not terminal
    let down_st = down.target.state.lock().await;
    assert_eq!(down_st.current_severity, Severity::Critical);
    assert!(matches!(
        down_st.state,
        HealthState::Degraded | HealthState::Remediating | HealthState::CoolingDown
    ));

    // The healthy target was evaluated both cycles, unaffected
    let up_st = up.state.lock().await;
    assert_eq!(up_st.state, HealthState::Healthy);
    assert_eq!(up_st.current_severity, Severity::Normal);
}

// ============================================================================
// Escalation ladder ordering
// ============================================================================

#[tokio::test]
async fn ladder_index_is_monotone_until_recovery() {
    // Metric stays degraded; every action succeeds but does not clear it.
    let fx = fixture(
        ScriptedProbe::new(MetricKind::Disk, vec![Ok(85.0)]),
        vec![
            ActionOutcome::Success,
            ActionOutcome::Success,
            ActionOutcome::Success,
        ],
        vec![Action::ClearCache, Action::RotateLogs, Action::PurgeStorage],
        None,
    );

    let base = Utc::now();
    fx.engine.evaluate(&fx.target, ts(base, 0)).await;
    fx.engine.evaluate(&fx.target, ts(base, 301)).await;
    fx.engine.evaluate(&fx.target, ts(base, 602)).await;

    assert_eq!(
        fx.executor.dispatched(),
        vec![Action::ClearCache, Action::RotateLogs, Action::PurgeStorage]
    );
}

#[tokio::test]
async fn cooldown_blocks_actions_until_elapsed() {
    let fx = fixture(
        ScriptedProbe::new(MetricKind::Disk, vec![Ok(85.0)]),
        vec![ActionOutcome::Success, ActionOutcome::Success],
        vec![Action::ClearCache, Action::RotateLogs],
        None,
    );

    let base = Utc::now();
    fx.engine.evaluate(&fx.target, ts(base, 0)).await;
    // Within cooldown: both observations ignored for action purposes
    fx.engine.evaluate(&fx.target, ts(base, 60)).await;
    fx.engine.evaluate(&fx.target, ts(base, 250)).await;
    assert_eq!(fx.executor.dispatched().len(), 1);

    // After cooldown: the next rung fires
    fx.engine.evaluate(&fx.target, ts(base, 301)).await;
    assert_eq!(fx.executor.dispatched().len(), 2);
}

// ============================================================================
// Durability: anti-thrashing survives a restart
// ============================================================================

#[tokio::test]
async fn attempt_count_and_cooldown_survive_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("warden.db");
    let base = Utc::now();

    // Phase 1: one failed action, state persisted to sled
    {
        let store: Arc<SledStore> = Arc::new(SledStore::open(&db_path, 1000).unwrap());
        let executor = Arc::new(ScriptedExecutor::new(Vec::new()));
        let target = Arc::new(MonitoredTarget {
            target: Target {
                id: "t1".to_string(),
                kind: TargetKind::FilesystemPath,
                path: None,
                endpoint: None,
                process_name: None,
            },
            thresholds: disk_thresholds(),
            policy: RemediationPolicy {
                max_attempts: 3,
                cooldown: Duration::from_secs(300),
                ladder: vec![Action::ClearCache],
                fallback_action: None,
            },
            unavailable_severity: Severity::Critical,
            probe: Arc::new(ScriptedProbe::new(MetricKind::Disk, vec![Ok(85.0)])),
            executor: executor.clone(),
            state: tokio::sync::Mutex::new(TargetHealthState::new("t1")),
        });

        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = RemediationEngine::new(store.clone(), tx);
        engine.evaluate(&target, base).await;

        assert_eq!(executor.dispatched().len(), 1);
    }

    // Phase 2: "restart" — reopen the store and restore the state
    let store: Arc<SledStore> = Arc::new(SledStore::open(&db_path, 1000).unwrap());
    let restored = store.load_state("t1").unwrap().unwrap();
    assert_eq!(restored.state, HealthState::CoolingDown);
    assert_eq!(restored.attempt_count, 1);

    let executor = Arc::new(ScriptedExecutor::new(Vec::new()));
    let target = Arc::new(MonitoredTarget {
        target: Target {
            id: "t1".to_string(),
            kind: TargetKind::FilesystemPath,
            path: None,
            endpoint: None,
            process_name: None,
        },
        thresholds: disk_thresholds(),
        policy: RemediationPolicy {
            max_attempts: 3,
            cooldown: Duration::from_secs(300),
            ladder: vec![Action::ClearCache],
            fallback_action: None,
        },
        unavailable_severity: Severity::Critical,
        probe: Arc::new(ScriptedProbe::new(MetricKind::Disk, vec![Ok(85.0)])),
        executor: executor.clone(),
        state: tokio::sync::Mutex::new(restored),
    });

    let (tx, _rx) = mpsc::unbounded_channel();
    let engine = RemediationEngine::new(store.clone(), tx);

    // Still inside the pre-restart cooldown: no action may fire
    engine.evaluate(&target, ts(base, 60)).await;
    assert!(executor.dispatched().is_empty());

    // After the cooldown from before the restart: remediation resumes
    engine.evaluate(&target, ts(base, 301)).await;
    assert_eq!(executor.dispatched().len(), 1);
}
