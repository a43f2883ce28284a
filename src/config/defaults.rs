//! System-wide default constants.
//!
//! Centralises magic numbers so policy defaults live in one place. The source
//! deployments varied per service (3 attempts / 300s cooldown in one place,
//! different numbers elsewhere) — these are configuration defaults, not
//! invariants.

// ============================================================================
// Scheduler
// ============================================================================

/// Interval between polling cycles (seconds).
pub const POLL_INTERVAL_SECS: u64 = 30;

// ============================================================================
// Remediation policy
// ============================================================================

/// Actions spent on one problem before the target goes terminal.
pub const MAX_ATTEMPTS: u32 = 3;

/// Minimum wait after an action before the same target is acted on again (seconds).
pub const COOLDOWN_SECS: u64 = 300;

// ============================================================================
// Probes and actions
// ============================================================================

/// Bound on a single probe round-trip (seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Bound on a single remediation action (seconds).
pub const ACTION_TIMEOUT_SECS: u64 = 60;

/// Wait for a graceful stop before escalating to a forceful one (seconds).
pub const GRACEFUL_WAIT_SECS: u64 = 30;

// ============================================================================
// Server and storage
// ============================================================================

/// Default operator API bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Default data directory for durable state.
pub const DATA_DIR: &str = "./data";

/// Maximum retained audit events before the oldest are pruned.
pub const EVENT_RETENTION: usize = 10_000;

// ============================================================================
// Notifier
// ============================================================================

/// Window within which identical consecutive alerts are suppressed (seconds).
pub const DEDUP_WINDOW_SECS: u64 = 300;

/// Bound on a webhook delivery attempt (seconds).
pub const WEBHOOK_TIMEOUT_SECS: u64 = 10;
