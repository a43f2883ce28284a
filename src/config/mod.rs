//! Warden configuration
//!
//! Static configuration loaded once at startup from TOML.
//!
//! ## Loading Order
//!
//! 1. `WARDEN_CONFIG` environment variable (path to TOML file)
//! 2. `warden.toml` in the current working directory
//! 3. Built-in defaults (no targets — useful only with `--once` smoke checks)
//!
//! Every recognized option is validated at load time: threshold ordering,
//! ladder/command coverage, and metric/kind compatibility. An invalid file is
//! a fatal startup error, not a recoverable condition.

pub mod defaults;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::classify::{Direction, ThresholdSet};
use crate::types::{Action, MetricKind, RemediationPolicy, Severity, Target, TargetKind};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a warden deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WardenConfig {
    /// Polling interval between evaluation cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Operator API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Durable state storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Alert delivery
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Monitored targets
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

fn default_interval() -> u64 {
    defaults::POLL_INTERVAL_SECS
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            notify: NotifyConfig::default(),
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
}

fn default_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Oldest audit events beyond this count are pruned
    #[serde(default = "default_event_retention")]
    pub event_retention: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}

fn default_event_retention() -> usize {
    defaults::EVENT_RETENTION
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            event_retention: default_event_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotifyConfig {
    /// Optional webhook receiving JSON-encoded alerts
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Identical consecutive alerts within this window are suppressed
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
}

fn default_dedup_window() -> u64 {
    defaults::DEDUP_WINDOW_SECS
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            dedup_window_secs: default_dedup_window(),
        }
    }
}

// ============================================================================
// Per-Target Config
// ============================================================================

/// Severity assigned when a probe cannot reach its target at all.
///
/// `emergency` is for probes where absence is existential (a process-existence
/// check finding nothing), `critical` for everything else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UnavailableSeverity {
    Critical,
    Emergency,
}

impl From<UnavailableSeverity> for Severity {
    fn from(u: UnavailableSeverity) -> Self {
        match u {
            UnavailableSeverity::Critical => Severity::Critical,
            UnavailableSeverity::Emergency => Severity::Emergency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetConfig {
    pub id: String,
    pub kind: TargetKind,
    pub metric: MetricKind,
    /// Which direction of this metric is bad. Declared, never inferred.
    pub direction: Direction,
    pub warning: f64,
    pub critical: f64,
    #[serde(default)]
    pub emergency: Option<f64>,

    /// Filesystem path (disk targets)
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// RPC endpoint URL (managed services)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Process name (RSS probes, restart liveness checks)
    #[serde(default)]
    pub process_name: Option<String>,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
    #[serde(default = "default_graceful_wait")]
    pub graceful_wait_secs: u64,
    #[serde(default = "default_unavailable")]
    pub unavailable_severity: UnavailableSeverity,

    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

fn default_probe_timeout() -> u64 {
    defaults::PROBE_TIMEOUT_SECS
}

fn default_action_timeout() -> u64 {
    defaults::ACTION_TIMEOUT_SECS
}

fn default_graceful_wait() -> u64 {
    defaults::GRACEFUL_WAIT_SECS
}

fn default_unavailable() -> UnavailableSeverity {
    UnavailableSeverity::Critical
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// Ordered least → most disruptive
    #[serde(default)]
    pub ladder: Vec<Action>,
    #[serde(default)]
    pub fallback: Option<Action>,
}

fn default_max_attempts() -> u32 {
    defaults::MAX_ATTEMPTS
}

fn default_cooldown() -> u64 {
    defaults::COOLDOWN_SECS
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_secs: default_cooldown(),
            ladder: Vec::new(),
            fallback: None,
        }
    }
}

/// Shell commands backing each action, resolved at startup.
///
/// Restart actions are composite: `stop`/`start` for graceful, `force-stop`
/// for the kill path.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CommandsConfig {
    #[serde(default)]
    pub clear_cache: Option<String>,
    #[serde(default)]
    pub rotate_logs: Option<String>,
    #[serde(default)]
    pub purge_storage: Option<String>,
    #[serde(default)]
    pub enable_fallback: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub force_stop: Option<String>,
}

impl TargetConfig {
    pub fn thresholds(&self) -> ThresholdSet {
        ThresholdSet {
            metric_kind: self.metric,
            direction: self.direction,
            warning: self.warning,
            critical: self.critical,
            emergency: self.emergency,
        }
    }

    pub fn remediation_policy(&self) -> RemediationPolicy {
        RemediationPolicy {
            max_attempts: self.policy.max_attempts,
            cooldown: Duration::from_secs(self.policy.cooldown_secs),
            ladder: self.policy.ladder.clone(),
            fallback_action: self.policy.fallback,
        }
    }

    pub fn target(&self) -> Target {
        Target {
            id: self.id.clone(),
            kind: self.kind,
            path: self.path.clone(),
            endpoint: self.endpoint.clone(),
            process_name: self.process_name.clone(),
        }
    }

    /// Actions this target may ever execute: the ladder plus the fallback.
    fn configured_actions(&self) -> Vec<Action> {
        let mut actions = self.policy.ladder.clone();
        if let Some(fb) = self.policy.fallback {
            actions.push(fb);
        }
        actions
    }
}

// ============================================================================
// Loading and Validation
// ============================================================================

impl WardenConfig {
    /// Load configuration using the standard search order:
    /// 1. `WARDEN_CONFIG` environment variable
    /// 2. `./warden.toml` in the current working directory
    /// 3. Built-in defaults (empty target list)
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("WARDEN_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::load_from_file(&p)?;
                info!(path = %p.display(), targets = config.targets.len(), "Loaded config from WARDEN_CONFIG");
                return Ok(config);
            }
            warn!(path = %path, "WARDEN_CONFIG points to non-existent file, falling back");
        }

        let local = PathBuf::from("warden.toml");
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!(targets = config.targets.len(), "Loaded config from ./warden.toml");
            return Ok(config);
        }

        warn!("No warden.toml found — starting with built-in defaults and no targets");
        Ok(Self::default())
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.notify.dedup_window_secs)
    }

    /// Validate the whole configuration. Fatal on error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval-secs must be positive".into()));
        }

        let mut seen_ids = HashSet::new();
        for t in &self.targets {
            if !seen_ids.insert(t.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate target id: {}", t.id)));
            }
            t.validate()?;
        }
        Ok(())
    }
}

impl TargetConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| ConfigError::Invalid(format!("target {}: {}", self.id, msg));

        self.thresholds().validate().map_err(invalid)?;

        if self.policy.ladder.is_empty() {
            return Err(invalid("escalation ladder must not be empty".into()));
        }
        if self.policy.max_attempts == 0 {
            return Err(invalid("max-attempts must be positive".into()));
        }
        if self.policy.cooldown_secs == 0 {
            return Err(invalid("cooldown-secs must be positive".into()));
        }
        if self.probe_timeout_secs == 0 || self.action_timeout_secs == 0 {
            return Err(invalid("probe and action timeouts must be positive".into()));
        }

        // Metric must make sense for the target kind
        let metric_ok = match self.kind {
            TargetKind::FilesystemPath => self.metric == MetricKind::Disk,
            TargetKind::MemoryPool => self.metric == MetricKind::Memory,
            TargetKind::ManagedService => matches!(
                self.metric,
                MetricKind::ProcessRss
                    | MetricKind::RpcLatency
                    | MetricKind::SyncLag
                    | MetricKind::PeerCount
            ),
        };
        if !metric_ok {
            return Err(invalid(format!(
                "metric {} is not valid for kind {}",
                self.metric, self.kind
            )));
        }

        // Probe parameters required by the metric
        match self.metric {
            MetricKind::Disk if self.path.is_none() => {
                return Err(invalid("disk targets require `path`".into()));
            }
            MetricKind::ProcessRss if self.process_name.is_none() => {
                return Err(invalid("process-rss targets require `process-name`".into()));
            }
            MetricKind::RpcLatency | MetricKind::SyncLag | MetricKind::PeerCount
                if self.endpoint.is_none() =>
            {
                return Err(invalid(format!("{} targets require `endpoint`", self.metric)));
            }
            _ => {}
        }

        // Every configured action must resolve to a command
        for action in self.configured_actions() {
            let covered = match action {
                Action::ClearCache => self.commands.clear_cache.is_some(),
                Action::RotateLogs => self.commands.rotate_logs.is_some(),
                Action::PurgeStorage => self.commands.purge_storage.is_some(),
                Action::EnableFallback => self.commands.enable_fallback.is_some(),
                Action::GracefulRestart => {
                    self.commands.stop.is_some() && self.commands.start.is_some()
                }
                Action::ForceRestart => {
                    self.commands.force_stop.is_some() && self.commands.start.is_some()
                }
            };
            if !covered {
                return Err(invalid(format!(
                    "action {} is in the ladder but has no command configured",
                    action
                )));
            }
        }

        Ok(())
    }
}
