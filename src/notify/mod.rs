//! Notifier — structured alerts for state transitions
//!
//! Fire-and-forget with respect to the engine: events arrive over an
//! unbounded channel and a dispatcher task fans them out to sinks. A sink
//! failure is logged and dropped; it can never block or fail remediation.
//!
//! Identical consecutive alerts for a target are suppressed within a dedup
//! window, so a persistently degraded metric produces one alert per episode
//! rather than one per polling cycle.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::defaults::WEBHOOK_TIMEOUT_SECS;
use crate::types::RemediationEvent;

/// A destination for alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &RemediationEvent);
}

// ============================================================================
// Sinks
// ============================================================================

/// Structured log sink — always active.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &RemediationEvent) {
        if event.to_state.is_terminal() {
            // Budget exhaustion is the one persistent, non-auto-clearing alert
            error!(
                target = %event.target_id,
                state = %event.to_state,
                severity = %event.severity,
                "ALERT: attempt budget exhausted — operator intervention required"
            );
        } else {
            info!(
                target = %event.target_id,
                from = %event.from_state,
                to = %event.to_state,
                severity = %event.severity,
                action = event.action_taken.map(|a| a.to_string()).unwrap_or_default(),
                outcome = event.outcome.as_ref().map(ToString::to_string).unwrap_or_default(),
                "ALERT: state transition"
            );
        }
    }
}

/// Webhook sink — POSTs the event as JSON to a configured URL.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &RemediationEvent) {
        let result = self.http.post(&self.url).json(event).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(target = %event.target_id, "Webhook alert delivered");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Webhook returned non-success status");
            }
            Err(e) => {
                warn!(error = %e, "Webhook delivery failed");
            }
        }
    }
}

// ============================================================================
// Dedup filter
// ============================================================================

/// Suppresses identical consecutive alerts per target within a window.
///
/// Two events are "identical" when their dedup signature matches (same
/// to-state, severity, action, and outcome class). A changed signature or an
/// expired window always lets the alert through.
pub struct DedupFilter {
    window: Duration,
    last_sent: HashMap<String, (String, DateTime<Utc>)>,
}

impl DedupFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    /// Whether this event should be delivered, updating the filter state.
    pub fn should_deliver(&mut self, event: &RemediationEvent) -> bool {
        let signature = event.dedup_signature();
        let window =
            chrono::Duration::from_std(self.window).unwrap_or_else(|_| chrono::Duration::zero());

        match self.last_sent.get(&event.target_id) {
            Some((last_sig, last_at))
                if *last_sig == signature && event.timestamp - *last_at < window =>
            {
                false
            }
            _ => {
                self.last_sent
                    .insert(event.target_id.clone(), (signature, event.timestamp));
                true
            }
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Drains the engine's event channel and fans out to all sinks.
///
/// Runs until the channel closes (all senders dropped at shutdown).
pub async fn run_dispatcher(
    mut rx: mpsc::UnboundedReceiver<RemediationEvent>,
    sinks: Vec<Box<dyn Notifier>>,
    dedup_window: Duration,
) {
    let mut filter = DedupFilter::new(dedup_window);
    info!(sinks = sinks.len(), "Notifier dispatcher started");

    while let Some(event) = rx.recv().await {
        if !filter.should_deliver(&event) {
            debug!(target = %event.target_id, "Duplicate alert suppressed");
            continue;
        }
        join_all(sinks.iter().map(|sink| sink.notify(&event))).await;
    }

    debug!("Notifier dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, ActionOutcome, HealthState, Severity};

    fn event_at(offset_secs: i64, to_state: HealthState) -> RemediationEvent {
        RemediationEvent {
            target_id: "geth".to_string(),
            timestamp: Utc::now() + chrono::Duration::seconds(offset_secs),
            from_state: HealthState::Healthy,
            to_state,
            severity: Severity::Warning,
            action_taken: None,
            outcome: None,
        }
    }

    #[test]
    fn duplicate_within_window_is_suppressed() {
        let mut filter = DedupFilter::new(Duration::from_secs(300));
        assert!(filter.should_deliver(&event_at(0, HealthState::Degraded)));
        assert!(!filter.should_deliver(&event_at(10, HealthState::Degraded)));
        assert!(!filter.should_deliver(&event_at(200, HealthState::Degraded)));
    }

    #[test]
    fn duplicate_after_window_is_delivered() {
        let mut filter = DedupFilter::new(Duration::from_secs(300));
        assert!(filter.should_deliver(&event_at(0, HealthState::Degraded)));
        assert!(filter.should_deliver(&event_at(301, HealthState::Degraded)));
    }

    #[test]
    fn changed_transition_is_delivered() {
        let mut filter = DedupFilter::new(Duration::from_secs(300));
        assert!(filter.should_deliver(&event_at(0, HealthState::Degraded)));
        assert!(filter.should_deliver(&event_at(1, HealthState::Remediating)));
    }

    #[test]
    fn targets_are_deduplicated_independently() {
        let mut filter = DedupFilter::new(Duration::from_secs(300));
        let a = event_at(0, HealthState::Degraded);
        let mut b = event_at(0, HealthState::Degraded);
        b.target_id = "erigon".to_string();

        assert!(filter.should_deliver(&a));
        assert!(filter.should_deliver(&b));
    }

    #[test]
    fn different_outcomes_are_not_duplicates() {
        let mut filter = DedupFilter::new(Duration::from_secs(300));
        let mut a = event_at(0, HealthState::CoolingDown);
        a.action_taken = Some(Action::ClearCache);
        a.outcome = Some(ActionOutcome::Failure("exit 1".to_string()));
        let mut b = event_at(5, HealthState::CoolingDown);
        b.action_taken = Some(Action::ClearCache);
        b.outcome = Some(ActionOutcome::Success);

        assert!(filter.should_deliver(&a));
        assert!(filter.should_deliver(&b));
    }

    #[test]
    fn dispatcher_drains_until_channel_closes() {
        tokio_test::block_on(async {
            let (tx, rx) = mpsc::unbounded_channel();
            tx.send(event_at(0, HealthState::Degraded)).unwrap();
            drop(tx);

            // Completes once the channel closes — a hang here is a bug
            run_dispatcher(
                rx,
                vec![Box::new(LogNotifier) as Box<dyn Notifier>],
                Duration::from_secs(300),
            )
            .await;
        });
    }
}
