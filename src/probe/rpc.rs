//! JSON-RPC health probe for managed node services
//!
//! One round trip per check: `eth_blockNumber` for responsiveness and latency,
//! then `net_peerCount` and `eth_syncing` for domain metrics. All calls share
//! a bounded client timeout; a dead endpoint costs one timeout, never more.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{HealthProbe, MetricSource, ProbeError, ProbeReport};
use crate::types::{MetricKind, MetricSample, Target};

/// JSON-RPC client for one endpoint.
pub struct JsonRpcProbe {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl JsonRpcProbe {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Single JSON-RPC call, returning the `result` field.
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ProbeError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(self.timeout)
                } else {
                    ProbeError::Unavailable(format!("{}: {}", self.endpoint, e))
                }
            })?;

        if !resp.status().is_success() {
            return Err(ProbeError::Unavailable(format!(
                "{} returned HTTP {}",
                self.endpoint,
                resp.status()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProbeError::Unavailable(format!("invalid RPC response: {}", e)))?;

        if let Some(err) = body.get("error") {
            return Err(ProbeError::Unavailable(format!("RPC error: {}", err)));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| ProbeError::Unavailable("RPC response missing result".to_string()))
    }
}

#[async_trait]
impl HealthProbe for JsonRpcProbe {
    async fn check(&self) -> Result<ProbeReport, ProbeError> {
        let start = Instant::now();
        // The liveness call: if this fails the endpoint is unreachable.
        let block = self.call("eth_blockNumber", serde_json::json!([])).await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut domain_metrics = HashMap::new();
        if let Some(n) = parse_quantity(&block) {
            domain_metrics.insert("block_number".to_string(), n);
        }

        // Secondary metrics are best-effort; a node that answers the liveness
        // call but not these is still responsive.
        match self.call("net_peerCount", serde_json::json!([])).await {
            Ok(v) => {
                if let Some(n) = parse_quantity(&v) {
                    domain_metrics.insert("peer_count".to_string(), n);
                }
            }
            Err(e) => debug!(endpoint = %self.endpoint, error = %e, "net_peerCount not available"),
        }

        match self.call("eth_syncing", serde_json::json!([])).await {
            Ok(v) => {
                let (syncing, lag) = parse_sync_status(&v);
                domain_metrics.insert("syncing".to_string(), if syncing { 1.0 } else { 0.0 });
                domain_metrics.insert("sync_lag".to_string(), lag);
            }
            Err(e) => debug!(endpoint = %self.endpoint, error = %e, "eth_syncing not available"),
        }

        Ok(ProbeReport {
            responsive: true,
            latency_ms,
            domain_metrics,
        })
    }
}

/// Parse a JSON-RPC quantity: hex string ("0x1a"), decimal string, or number.
fn parse_quantity(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).ok().map(|n| n as f64)
            } else {
                s.parse().ok()
            }
        }
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Interpret an `eth_syncing` result: `false` means synced (lag 0), an object
/// carries current/highest block from which the lag is derived.
fn parse_sync_status(v: &serde_json::Value) -> (bool, f64) {
    match v {
        serde_json::Value::Bool(false) => (false, 0.0),
        serde_json::Value::Object(obj) => {
            let current = obj.get("currentBlock").and_then(parse_quantity_ref);
            let highest = obj.get("highestBlock").and_then(parse_quantity_ref);
            match (current, highest) {
                (Some(c), Some(h)) => (true, (h - c).max(0.0)),
                _ => (true, 0.0),
            }
        }
        _ => (false, 0.0),
    }
}

fn parse_quantity_ref(v: &serde_json::Value) -> Option<f64> {
    parse_quantity(v)
}

// ============================================================================
// MetricSource adapter
// ============================================================================

/// Adapts a [`HealthProbe`] report into one metric kind's samples.
pub struct RpcMetricSource {
    probe: JsonRpcProbe,
    kind: MetricKind,
}

impl RpcMetricSource {
    pub fn new(probe: JsonRpcProbe, kind: MetricKind) -> Self {
        Self { probe, kind }
    }

    fn domain_metric(&self, report: &ProbeReport, key: &str) -> Result<f64, ProbeError> {
        report
            .domain_metrics
            .get(key)
            .copied()
            .ok_or_else(|| ProbeError::Unavailable(format!("endpoint did not report {}", key)))
    }
}

#[async_trait]
impl MetricSource for RpcMetricSource {
    async fn sample(&self, target: &Target) -> Result<MetricSample, ProbeError> {
        let report = self.probe.check().await?;

        let value = match self.kind {
            MetricKind::RpcLatency => report.latency_ms,
            MetricKind::PeerCount => self.domain_metric(&report, "peer_count")?,
            MetricKind::SyncLag => self.domain_metric(&report, "sync_lag")?,
            other => {
                return Err(ProbeError::Unavailable(format!(
                    "rpc probe cannot measure {}",
                    other
                )));
            }
        };

        Ok(MetricSample::new(&target.id, self.kind, value))
    }
}
