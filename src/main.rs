//! NODE-WARDEN - Health Monitoring & Escalating Remediation Engine
//!
//! Periodically samples resource and service health for node infrastructure,
//! classifies severity, and applies escalating remediation with cooldown and
//! fallback semantics.
//!
//! # Usage
//!
//! ```bash
//! # Run with ./warden.toml (or WARDEN_CONFIG)
//! cargo run --release
//!
//! # Explicit config path and one-shot evaluation
//! ./node-warden --config /etc/node-warden/warden.toml --once
//! ```
//!
//! # Environment Variables
//!
//! - `WARDEN_CONFIG`: Path to the TOML configuration file
//! - `RUST_LOG`: Logging level (default: info)
//! - `RESET_STATE`: Set to "true" to wipe all persistent data on startup

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use node_warden::api::{create_app, ApiState};
use node_warden::config::WardenConfig;
use node_warden::engine::RemediationEngine;
use node_warden::notify::{LogNotifier, Notifier, WebhookNotifier};
use node_warden::registry::TargetRegistry;
use node_warden::scheduler::Scheduler;
use node_warden::storage::{ProcessLock, SledStore, StateStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "node-warden")]
#[command(about = "Health monitoring and escalating remediation for node infrastructure")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML configuration file
    /// (default: WARDEN_CONFIG env var, then ./warden.toml)
    #[arg(long)]
    config: Option<String>,

    /// Override the API server address (default from config: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the data directory for durable state
    #[arg(long)]
    data_dir: Option<String>,

    /// Run a single evaluation cycle and exit (no API server)
    #[arg(long)]
    once: bool,

    /// Reset all persistent state (health states, audit log) on startup.
    /// WARNING: This is destructive and cannot be undone!
    /// Can also be set via RESET_STATE=true environment variable.
    #[arg(long)]
    reset_state: bool,
}

// ============================================================================
// State Reset
// ============================================================================

/// Check if a state reset is requested via CLI flag or environment variable.
fn should_reset_state(cli_flag: bool) -> bool {
    if cli_flag {
        return true;
    }
    if let Ok(val) = std::env::var("RESET_STATE") {
        let val_lower = val.to_lowercase();
        return val_lower == "true" || val_lower == "1" || val_lower == "yes";
    }
    false
}

/// Safely remove the data directory and all its contents.
fn reset_data_directory(data_dir: &std::path::Path) -> Result<()> {
    if !data_dir.exists() {
        info!("Data directory does not exist, nothing to reset");
        return Ok(());
    }

    warn!("RESET_STATE requested — wiping all persistent data");
    warn!("Removing: {}", data_dir.display());
    std::fs::remove_dir_all(data_dir).context("Failed to remove data directory")?;
    warn!("Data directory removed. Fresh state will be created on startup.");
    Ok(())
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Scheduler,
    Notifier,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::Scheduler => write!(f, "Scheduler"),
            TaskName::Notifier => write!(f, "Notifier"),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Load and validate configuration
    let mut config = match &args.config {
        Some(path) => WardenConfig::load_from_file(std::path::Path::new(path))?,
        None => WardenConfig::load()?,
    };
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    if let Some(data_dir) = &args.data_dir {
        config.storage.data_dir = data_dir.into();
    }

    if config.targets.is_empty() {
        warn!("No targets configured — the engine will idle");
    }

    if should_reset_state(args.reset_state) {
        reset_data_directory(&config.storage.data_dir)?;
    }

    // Single-instance guard: two wardens sharing a database (and restarting
    // the same services) would defeat the anti-thrashing guarantee.
    let _lock = ProcessLock::acquire(&config.storage.data_dir)?;

    // Durable state
    let store: Arc<dyn StateStore> = Arc::new(
        SledStore::open(
            config.storage.data_dir.join("warden.db"),
            config.storage.event_retention,
        )
        .context("Failed to open state store")?,
    );

    // Registry with restored per-target state
    let registry = Arc::new(TargetRegistry::from_config(&config, store.as_ref())?);

    // Engine and notifier channel
    let (notify_tx, notify_rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Arc::new(RemediationEngine::new(store.clone(), notify_tx.clone()));

    let mut sinks: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if let Some(url) = &config.notify.webhook_url {
        info!(url = %url, "Webhook notifier enabled");
        sinks.push(Box::new(WebhookNotifier::new(url)));
    }

    let cancel_token = CancellationToken::new();
    // The scheduler takes sole ownership of the engine so its notifier sender
    // drops (and the dispatcher drains out) once the loop stops.
    let scheduler = Scheduler::new(
        registry.clone(),
        engine,
        config.poll_interval(),
        cancel_token.clone(),
    );
    let cycles = scheduler.cycle_handle();

    // One-shot mode: a single evaluation cycle, then exit
    if args.once {
        info!(targets = registry.len(), "Running single evaluation cycle");
        scheduler.run_cycle().await;
        for mt in registry.targets() {
            let st = mt.state.lock().await;
            info!(
                target = %st.target_id,
                state = %st.state,
                severity = %st.current_severity,
                attempts = st.attempt_count,
                "Target state"
            );
        }
        return Ok(());
    }

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task: notifier dispatcher
    let dedup_window = config.dedup_window();
    task_set.spawn(async move {
        node_warden::notify::run_dispatcher(notify_rx, sinks, dedup_window).await;
        Ok(TaskName::Notifier)
    });

    // Task: scheduler loop
    task_set.spawn(async move {
        scheduler.run().await;
        Ok(TaskName::Scheduler)
    });

    // Task: HTTP API server
    let app = create_app(ApiState {
        registry: registry.clone(),
        store: store.clone(),
        notify_tx,
        cycles,
    });
    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.addr))?;
    info!(addr = %config.server.addr, "HTTP API listening");

    let server_cancel = cancel_token.clone();
    task_set.spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                server_cancel.cancelled().await;
            })
            .await;
        match result {
            Ok(()) => Ok(TaskName::HttpServer),
            Err(e) => Err(anyhow::anyhow!("HTTP server error: {}", e)),
        }
    });

    // Ctrl-C triggers graceful shutdown: no new ticks, in-flight actions
    // complete up to their timeouts.
    let shutdown_cancel = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown_cancel.cancel();
        }
    });

    // Supervisor: if any task exits, wind the rest down.
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(name)) => {
                info!(task = %name, "Task completed");
                cancel_token.cancel();
            }
            Ok(Err(e)) => {
                error!(error = %e, "Task failed — shutting down");
                cancel_token.cancel();
            }
            Err(e) => {
                error!(error = %e, "Task panicked — shutting down");
                cancel_token.cancel();
            }
        }
    }

    info!("node-warden stopped");
    Ok(())
}
