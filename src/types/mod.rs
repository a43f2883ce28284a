//! Shared data structures for the health monitoring and remediation engine
//!
//! This module defines the core types flowing through the pipeline:
//! - MetricSample / Severity (probe output, classifier output)
//! - Target / RemediationPolicy (registry entries, built once at startup)
//! - TargetHealthState (the per-target mutable core entity)
//! - RemediationEvent / ActionOutcome (append-only audit trail)

mod events;
mod metrics;
mod state;
mod target;

pub use events::*;
pub use metrics::*;
pub use state::*;
pub use target::*;
