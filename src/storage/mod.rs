//! Durable State Storage
//!
//! Persists per-target health state and the remediation audit log using Sled
//! DB so attempt counters and cooldown timestamps survive process restarts.

pub mod lockfile;
pub mod state_store;

pub use lockfile::ProcessLock;
pub use state_store::{InMemoryStore, SledStore, StateStore, StorageError};
