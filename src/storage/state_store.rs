//! StateStore trait — pluggable durability for health state and audit events
//!
//! Abstracts persistence so backends can be swapped without touching engine
//! code:
//! - `SledStore`: durable embedded KV store for deployments
//! - `InMemoryStore`: for tests and throwaway runs
//!
//! Attempt counts and cooldown timestamps must survive a process crash — that
//! is what preserves the anti-thrashing guarantee across restarts.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::{RemediationEvent, TargetHealthState};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Trait for pluggable persistence backends
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks.
pub trait StateStore: Send + Sync {
    /// Persist one target's health state (overwrites prior state)
    fn save_state(&self, state: &TargetHealthState) -> Result<(), StorageError>;

    /// Load a target's persisted health state, if any
    fn load_state(&self, target_id: &str) -> Result<Option<TargetHealthState>, StorageError>;

    /// Append an audit event. Events are never mutated or reordered.
    fn append_event(&self, event: &RemediationEvent) -> Result<(), StorageError>;

    /// Most recent events, newest first
    fn recent_events(&self, limit: usize) -> Result<Vec<RemediationEvent>, StorageError>;

    /// Most recent events for one target, newest first
    fn events_for_target(
        &self,
        target_id: &str,
        limit: usize,
    ) -> Result<Vec<RemediationEvent>, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Sled backend
// ============================================================================

/// Durable store backed by sled.
///
/// Health state lives in a `state` tree keyed by target id. Events live in an
/// `events` tree keyed by big-endian millisecond timestamp plus a database
/// sequence number, so iteration order is chronological and keys never
/// collide. Oldest events are pruned past the retention cap.
///
/// Durability note: sled flushes in the background; on crash at most the last
/// few writes may be lost, which costs one redundant remediation attempt at
/// worst.
pub struct SledStore {
    db: sled::Db,
    state: sled::Tree,
    events: sled::Tree,
    retention: usize,
    /// Approximate event count; `Tree::len` is an O(n) scan.
    event_count: AtomicUsize,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P, retention: usize) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let state = db.open_tree("state")?;
        let events = db.open_tree("events")?;
        let event_count = AtomicUsize::new(events.len());

        Ok(Self {
            db,
            state,
            events,
            retention,
            event_count,
        })
    }

    fn event_key(&self, event: &RemediationEvent) -> Result<[u8; 16], StorageError> {
        let ts = event.timestamp.timestamp_millis().max(0) as u64;
        let seq = self.db.generate_id()?;
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&ts.to_be_bytes());
        key[8..].copy_from_slice(&seq.to_be_bytes());
        Ok(key)
    }

    fn prune_oldest(&self) -> Result<(), StorageError> {
        while self.event_count.load(Ordering::Relaxed) > self.retention {
            match self.events.iter().next() {
                Some(Ok((key, _))) => {
                    self.events.remove(key)?;
                    self.event_count.fetch_sub(1, Ordering::Relaxed);
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        Ok(())
    }
}

impl StateStore for SledStore {
    fn save_state(&self, state: &TargetHealthState) -> Result<(), StorageError> {
        let value = serde_json::to_vec(state)?;
        self.state.insert(state.target_id.as_bytes(), value)?;
        Ok(())
    }

    fn load_state(&self, target_id: &str) -> Result<Option<TargetHealthState>, StorageError> {
        match self.state.get(target_id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn append_event(&self, event: &RemediationEvent) -> Result<(), StorageError> {
        let key = self.event_key(event)?;
        let value = serde_json::to_vec(event)?;
        self.events.insert(key, value)?;
        self.event_count.fetch_add(1, Ordering::Relaxed);
        self.prune_oldest()
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<RemediationEvent>, StorageError> {
        let mut events = Vec::with_capacity(limit.min(256));
        for item in self.events.iter().rev() {
            if events.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            if let Ok(event) = serde_json::from_slice::<RemediationEvent>(&value) {
                events.push(event);
            }
        }
        Ok(events)
    }

    fn events_for_target(
        &self,
        target_id: &str,
        limit: usize,
    ) -> Result<Vec<RemediationEvent>, StorageError> {
        let mut events = Vec::with_capacity(limit.min(256));
        for item in self.events.iter().rev() {
            if events.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            if let Ok(event) = serde_json::from_slice::<RemediationEvent>(&value) {
                if event.target_id == target_id {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory store for testing and throwaway runs. Not durable.
#[derive(Default)]
pub struct InMemoryStore {
    state: std::sync::RwLock<std::collections::HashMap<String, TargetHealthState>>,
    events: std::sync::RwLock<Vec<RemediationEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStore {
    fn save_state(&self, state: &TargetHealthState) -> Result<(), StorageError> {
        let mut map = self
            .state
            .write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        map.insert(state.target_id.clone(), state.clone());
        Ok(())
    }

    fn load_state(&self, target_id: &str) -> Result<Option<TargetHealthState>, StorageError> {
        let map = self
            .state
            .read()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(map.get(target_id).cloned())
    }

    fn append_event(&self, event: &RemediationEvent) -> Result<(), StorageError> {
        let mut events = self
            .events
            .write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        events.push(event.clone());
        Ok(())
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<RemediationEvent>, StorageError> {
        let events = self
            .events
            .read()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    fn events_for_target(
        &self,
        target_id: &str,
        limit: usize,
    ) -> Result<Vec<RemediationEvent>, StorageError> {
        let events = self
            .events
            .read()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.target_id == target_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
