//! Metric sources — pull-based probes for resource and service health
//!
//! Each target gets a probe instance resolved at startup. Probes apply a
//! bounded timeout; an unreachable source yields [`ProbeError::Unavailable`]
//! rather than blocking the evaluation cycle, and the engine classifies that
//! as high severity (not as "no data").

mod rpc;
mod system;

pub use rpc::{JsonRpcProbe, RpcMetricSource};
pub use system::{process_exists, DiskUsageProbe, MemoryUsageProbe, ProcessRssProbe};

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::types::{MetricSample, Target};

/// Probe errors
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("metric source unavailable: {0}")]
    Unavailable(String),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// A pull-based source of one measurable signal.
///
/// Implementations are stateless collaborators: they never hold target health
/// state, only the connection details needed to take a reading.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn sample(&self, target: &Target) -> Result<MetricSample, ProbeError>;
}

/// Typed result of one health-check round trip against a service.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub responsive: bool,
    pub latency_ms: f64,
    /// Service-specific readings, e.g. `peer_count`, `sync_lag`, `block_number`
    pub domain_metrics: HashMap<String, f64>,
}

/// Collaborator interface for service health checks.
///
/// The mechanism (HTTP RPC call, process existence check) is owned by the
/// implementation; the engine only consumes the typed report.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<ProbeReport, ProbeError>;
}
