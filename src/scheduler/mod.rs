//! Scheduler — the periodic sampling loop
//!
//! Each tick fans one evaluation task out per target and waits for all of
//! them before the next tick. Per-target failures are contained: a panicking
//! or slow evaluation never blocks the others (slow ones are skipped by the
//! engine's try-lock on the next tick). No new ticks are dispatched after
//! shutdown is requested; the in-flight cycle runs to completion, bounded by
//! the probe and action timeouts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::RemediationEngine;
use crate::registry::TargetRegistry;

pub struct Scheduler {
    registry: Arc<TargetRegistry>,
    engine: Arc<RemediationEngine>,
    interval: Duration,
    cancel: CancellationToken,
    cycles: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<TargetRegistry>,
        engine: Arc<RemediationEngine>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            engine,
            interval,
            cancel,
            cycles: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared cycle counter (for the status API).
    pub fn cycle_handle(&self) -> Arc<AtomicU64> {
        self.cycles.clone()
    }

    /// Run the polling loop until cancellation.
    pub async fn run(self) {
        info!(
            targets = self.registry.len(),
            interval_secs = self.interval.as_secs(),
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Scheduler shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }

        info!(
            cycles = self.cycles.load(Ordering::Relaxed),
            "Scheduler stopped"
        );
    }

    /// Run one evaluation cycle across all targets.
    pub async fn run_cycle(&self) {
        let now = Utc::now();
        let mut set = JoinSet::new();

        for mt in self.registry.targets() {
            let mt = mt.clone();
            let engine = self.engine.clone();
            set.spawn(async move {
                engine.evaluate(&mt, now).await;
            });
        }

        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                // A panicked evaluation is contained to its target
                warn!(error = %e, "Target evaluation task failed");
            }
        }

        self.cycles.fetch_add(1, Ordering::Relaxed);
    }
}
