//! Action executor — runs remediation commands against external collaborators
//!
//! Commands are resolved from configuration at startup; nothing is looked up
//! by string at dispatch time. Every invocation is bounded: a command that
//! outlives its window is killed and reported as a timeout, which the state
//! machine treats as a failed attempt.
//!
//! Restarts are two-phase: graceful stop with a bounded wait for the process
//! to exit, then a forceful stop if it is still alive, then start.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CommandsConfig;
use crate::probe::process_exists;
use crate::types::{Action, ActionOutcome, Target};

/// How often the graceful-stop wait polls for process exit
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Executes remediation actions and reports their outcome.
///
/// Implementations are stateless collaborators; idempotence is part of the
/// contract: executing the same action twice must be safe.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: Action, target: &Target) -> ActionOutcome;
}

/// Shell-command-backed executor for one target.
pub struct CommandExecutor {
    commands: CommandsConfig,
    process_name: Option<String>,
    action_timeout: Duration,
    graceful_wait: Duration,
}

impl CommandExecutor {
    pub fn new(
        commands: CommandsConfig,
        process_name: Option<String>,
        action_timeout: Duration,
        graceful_wait: Duration,
    ) -> Self {
        Self {
            commands,
            process_name,
            action_timeout,
            graceful_wait,
        }
    }

    /// Run one shell command with the bounded execution window.
    async fn run(&self, command: &str) -> ActionOutcome {
        debug!(command = command, "Executing remediation command");

        let fut = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.action_timeout, fut).await {
            Err(_) => ActionOutcome::Timeout,
            Ok(Err(e)) => ActionOutcome::Failure(format!("failed to spawn: {}", e)),
            Ok(Ok(output)) if output.status.success() => ActionOutcome::Success,
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                ActionOutcome::Failure(format!(
                    "exit {}: {}",
                    output
                        .status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    stderr.trim()
                ))
            }
        }
    }

    /// Resolve the configured command for a simple (single-command) action.
    fn command_for(&self, action: Action) -> Option<&str> {
        match action {
            Action::ClearCache => self.commands.clear_cache.as_deref(),
            Action::RotateLogs => self.commands.rotate_logs.as_deref(),
            Action::PurgeStorage => self.commands.purge_storage.as_deref(),
            Action::EnableFallback => self.commands.enable_fallback.as_deref(),
            Action::GracefulRestart | Action::ForceRestart => None,
        }
    }

    /// Wait up to `graceful_wait` for the managed process to exit.
    ///
    /// Without a configured process name there is nothing to observe, so the
    /// stop command's exit status is trusted.
    async fn wait_for_exit(&self) -> bool {
        let Some(name) = &self.process_name else {
            return true;
        };

        let deadline = tokio::time::Instant::now() + self.graceful_wait;
        while tokio::time::Instant::now() < deadline {
            if !process_exists(name) {
                return true;
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
        !process_exists(name)
    }

    async fn graceful_restart(&self, target: &Target) -> ActionOutcome {
        let (Some(stop), Some(start)) = (self.commands.stop.as_deref(), self.commands.start.as_deref())
        else {
            return ActionOutcome::Failure("stop/start commands not configured".to_string());
        };

        let stop_outcome = self.run(stop).await;
        if !stop_outcome.is_success() {
            warn!(target = %target.id, outcome = %stop_outcome, "Graceful stop command did not succeed");
        }

        if !self.wait_for_exit().await {
            warn!(target = %target.id, "Process still alive after graceful wait — forcing stop");
            match self.commands.force_stop.as_deref() {
                Some(force) => {
                    let force_outcome = self.run(force).await;
                    if !force_outcome.is_success() {
                        return ActionOutcome::Failure(format!(
                            "process survived graceful stop and force stop failed: {}",
                            force_outcome
                        ));
                    }
                }
                None => {
                    return ActionOutcome::Failure(
                        "process survived graceful stop and no force-stop is configured".to_string(),
                    );
                }
            }
        }

        self.run(start).await
    }

    async fn force_restart(&self, target: &Target) -> ActionOutcome {
        let (Some(force), Some(start)) =
            (self.commands.force_stop.as_deref(), self.commands.start.as_deref())
        else {
            return ActionOutcome::Failure("force-stop/start commands not configured".to_string());
        };

        let force_outcome = self.run(force).await;
        if !force_outcome.is_success() {
            warn!(target = %target.id, outcome = %force_outcome, "Force stop command did not succeed");
        }

        self.run(start).await
    }
}

#[async_trait]
impl ActionExecutor for CommandExecutor {
    async fn execute(&self, action: Action, target: &Target) -> ActionOutcome {
        match action {
            Action::GracefulRestart => self.graceful_restart(target).await,
            Action::ForceRestart => self.force_restart(target).await,
            simple => match self.command_for(simple) {
                Some(cmd) => self.run(cmd).await,
                None => ActionOutcome::Failure(format!("no command configured for {}", simple)),
            },
        }
    }
}
