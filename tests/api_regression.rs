//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the operator surface with `tower::ServiceExt::oneshot()` against a live
//! engine: terminal states stay visible until explicitly reset, and a reset
//! re-arms automatic remediation.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

use node_warden::api::{create_app, ApiState};
use node_warden::classify::{Direction, ThresholdSet};
use node_warden::{
    Action, ActionExecutor, ActionOutcome, InMemoryStore, MetricKind, MetricSample,
    MetricSource, MonitoredTarget, ProbeError, RemediationEngine, RemediationPolicy, Severity,
    Target, TargetHealthState, TargetKind, TargetRegistry,
};

struct FixedProbe(f64);

#[async_trait]
impl MetricSource for FixedProbe {
    async fn sample(&self, target: &Target) -> Result<MetricSample, ProbeError> {
        Ok(MetricSample::new(&target.id, MetricKind::Disk, self.0))
    }
}

struct CountingExecutor {
    dispatched: Mutex<u32>,
}

#[async_trait]
impl ActionExecutor for CountingExecutor {
    async fn execute(&self, _action: Action, _target: &Target) -> ActionOutcome {
        *self.dispatched.lock().unwrap() += 1;
        ActionOutcome::Failure("still broken".to_string())
    }
}

fn make_target(executor: Arc<CountingExecutor>) -> Arc<MonitoredTarget> {
    Arc::new(MonitoredTarget {
        target: Target {
            id: "geth".to_string(),
            kind: TargetKind::FilesystemPath,
            path: None,
            endpoint: None,
            process_name: None,
        },
        thresholds: ThresholdSet {
            metric_kind: MetricKind::Disk,
            direction: Direction::HigherIsWorse,
            warning: 80.0,
            critical: 90.0,
            emergency: None,
        },
        policy: RemediationPolicy {
            max_attempts: 1,
            cooldown: Duration::from_secs(300),
            ladder: vec![Action::GracefulRestart],
            fallback_action: None,
        },
        unavailable_severity: Severity::Critical,
        probe: Arc::new(FixedProbe(95.0)),
        executor,
        state: tokio::sync::Mutex::new(TargetHealthState::new("geth")),
    })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn failed_target_stays_visible_until_reset_then_rearms() {
    let executor = Arc::new(CountingExecutor {
        dispatched: Mutex::new(0),
    });
    let target = make_target(executor.clone());
    let registry = Arc::new(TargetRegistry::from_targets(vec![target.clone()]));
    let store = Arc::new(InMemoryStore::new());

    let (tx, _rx) = mpsc::unbounded_channel();
    let engine = RemediationEngine::new(store.clone(), tx.clone());

    // Drive the target to FAILED: one failed attempt, then budget exhaustion
    let base = Utc::now();
    engine.evaluate(&target, base).await;
    engine
        .evaluate(&target, base + chrono::Duration::seconds(301))
        .await;
    assert_eq!(*executor.dispatched.lock().unwrap(), 1);

    let app = create_app(ApiState {
        registry: registry.clone(),
        store: store.clone(),
        notify_tx: tx,
        cycles: Arc::new(AtomicU64::new(2)),
    });

    // FAILED state is visible on the query surface
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/targets/geth")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let v = body_json(response).await;
    assert_eq!(v["data"]["state"], "Failed");
    assert_eq!(v["data"]["attempt_count"], 1);

    // Engine health reflects the terminal target
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let v = body_json(response).await;
    assert_eq!(v["data"]["targets_terminal"], serde_json::json!(1));

    // Operator reset clears the counter and returns the target to HEALTHY
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/targets/geth/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let v = body_json(response).await;
    assert_eq!(v["data"]["state"], "Healthy");
    assert_eq!(v["data"]["attempt_count"], 0);

    // The reset is audited
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/events?target=geth&limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let v = body_json(response).await;
    let newest = &v["data"][0];
    assert_eq!(newest["from_state"], "Failed");
    assert_eq!(newest["to_state"], "Healthy");

    // Remediation is re-armed: the next degraded evaluation dispatches again
    engine
        .evaluate(&target, base + chrono::Duration::seconds(900))
        .await;
    assert_eq!(*executor.dispatched.lock().unwrap(), 2);
}

#[tokio::test]
async fn target_listing_covers_all_registered_targets() {
    let executor = Arc::new(CountingExecutor {
        dispatched: Mutex::new(0),
    });
    let target = make_target(executor);
    let registry = Arc::new(TargetRegistry::from_targets(vec![target]));
    let store = Arc::new(InMemoryStore::new());
    let (tx, _rx) = mpsc::unbounded_channel();

    let app = create_app(ApiState {
        registry,
        store,
        notify_tx: tx,
        cycles: Arc::new(AtomicU64::new(0)),
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/targets")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let v = body_json(response).await;
    // Never evaluated yet: the listing still shows a fresh HEALTHY record
    assert_eq!(v["data"].as_array().unwrap().len(), 1);
    assert_eq!(v["data"][0]["target_id"], "geth");
    assert_eq!(v["data"][0]["state"], "Healthy");
}
