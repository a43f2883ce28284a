//! Metric samples and severity tiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of signal a probe can measure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    /// Filesystem usage (%)
    Disk,
    /// System memory usage (%)
    Memory,
    /// Resident set size of a named process (MB)
    ProcessRss,
    /// RPC round-trip latency (ms)
    RpcLatency,
    /// Blocks behind the chain head
    SyncLag,
    /// Connected peer count
    PeerCount,
}

impl MetricKind {
    /// Canonical unit for display and sample records
    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Disk | MetricKind::Memory => "%",
            MetricKind::ProcessRss => "MB",
            MetricKind::RpcLatency => "ms",
            MetricKind::SyncLag => "blocks",
            MetricKind::PeerCount => "peers",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Disk => write!(f, "disk"),
            MetricKind::Memory => write!(f, "memory"),
            MetricKind::ProcessRss => write!(f, "process-rss"),
            MetricKind::RpcLatency => write!(f, "rpc-latency"),
            MetricKind::SyncLag => write!(f, "sync-lag"),
            MetricKind::PeerCount => write!(f, "peer-count"),
        }
    }
}

/// One measurement of one target, produced each polling cycle.
///
/// Samples are transient: they are classified and then discarded. Only the
/// derived [`TargetHealthState`](super::TargetHealthState) persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub target_id: String,
    pub metric_kind: MetricKind,
    pub value: f64,
    pub unit: String,
    pub sampled_at: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(target_id: impl Into<String>, metric_kind: MetricKind, value: f64) -> Self {
        Self {
            target_id: target_id.into(),
            metric_kind,
            value,
            unit: metric_kind.unit().to_string(),
            sampled_at: Utc::now(),
        }
    }
}

/// Classified severity tier for a metric value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Normal = 0,
    Warning = 1,
    Critical = 2,
    Emergency = 3,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Normal => write!(f, "NORMAL"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Normal
    }
}

impl Severity {
    /// True for any tier that warrants remediation
    pub fn is_degraded(&self) -> bool {
        *self >= Severity::Warning
    }
}
