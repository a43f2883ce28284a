//! NODE-WARDEN: Health Monitoring & Escalating Remediation
//!
//! Observes resource and service health for node infrastructure, classifies
//! severity, and drives a per-target state machine that issues escalating
//! remediation actions with cooldown, backoff, and fallback semantics.
//!
//! ## Architecture
//!
//! - **Probes**: pull-based metric sources (disk, memory, process RSS, RPC)
//! - **Classifier**: pure threshold → severity mapping
//! - **Engine**: per-target remediation state machine + bounded action executor
//! - **Scheduler**: periodic fan-out evaluation loop
//! - **Notifier**: deduplicated structured alerts (log + optional webhook)
//! - **Storage**: durable health state and audit log (sled)

pub mod api;
pub mod classify;
pub mod config;
pub mod engine;
pub mod notify;
pub mod probe;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::WardenConfig;

// Re-export commonly used types
pub use types::{
    Action, ActionOutcome, HealthState, MetricKind, MetricSample, RemediationEvent,
    RemediationPolicy, Severity, Target, TargetHealthState, TargetKind,
};

// Re-export the pipeline components
pub use classify::{classify, Direction, ThresholdSet};
pub use engine::{ActionExecutor, CommandExecutor, RemediationEngine};
pub use probe::{HealthProbe, MetricSource, ProbeError, ProbeReport};
pub use registry::{MonitoredTarget, TargetRegistry};
pub use scheduler::Scheduler;

// Re-export storage
pub use storage::{InMemoryStore, ProcessLock, SledStore, StateStore, StorageError};
