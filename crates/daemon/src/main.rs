// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sv-daemon: the ML-training supervision daemon's entry point. Parses
//! configuration, wires the supervisor and its ingestion server, and runs
//! until SIGTERM/SIGINT.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::Mutex;
use sv_adapters::{ProcessAgent, ProcessAgentConfig};
use sv_core::{RuleEngine, RunState, SystemClock};
use sv_engine::GuardedExecutor;
use sv_engine::Supervisor;
use sv_storage::CheckpointStore;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use sv_daemon::adapter_factory::DaemonAdapterFactory;
use sv_daemon::chat::ChatEntry;
use sv_daemon::config::{Cli, Config};
use sv_daemon::state::AppState;
use sv_daemon::{listener, logging};

/// Env var carrying the agent timeout, in seconds. Not part of the CLI
/// surface because it's a knob on `--agent-command`, not an independent flag.
const AGENT_TIMEOUT_SECS_ENV: &str = "AGENT_TIMEOUT_SECS";
const DEFAULT_AGENT_TIMEOUT_SECS: f64 = 30.0;

/// Env var holding the rule list as a JSON array, consumed by `RuleEngine::from_json`.
const RULES_ENV: &str = "SUPERVISOR_RULES";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("sv-daemon: {e}");
            std::process::exit(1);
        }
    };

    logging::setup_logging();
    info!(socket = %config.socket_path.display(), training_file = %config.training_file, "starting sv-daemon");

    if let Err(e) = listener::prepare_socket_path(&config.socket_path) {
        error!(error = %e, "failed to prepare socket path");
        std::process::exit(1);
    }
    let unix_listener = match UnixListener::bind(&config.socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, path = %config.socket_path.display(), "failed to bind socket");
            std::process::exit(1);
        }
    };

    if config.fresh_run {
        purge_tfevents(&config.run_dir);
    }

    let rule_engine = std::env::var(RULES_ENV).map(|raw| RuleEngine::from_json(&raw)).unwrap_or_default();

    let run_state = Arc::new(Mutex::new(RunState::new(config.training_file.clone(), config.codebase_root.display().to_string())));
    let checkpoints = CheckpointStore::new(config.run_dir.join("checkpoints"));
    let guarded_executor = GuardedExecutor::new(checkpoints);
    let factory = DaemonAdapterFactory::new(&config);
    let agent = build_agent(&config);
    let clock = SystemClock;

    let supervisor = Supervisor::new(factory, agent, clock, guarded_executor, Arc::clone(&run_state), config.supervisor.clone(), config.runtime, config.auto);

    let state = AppState {
        run_state,
        rule_engine: Arc::new(Mutex::new(rule_engine)),
        chat_history: Arc::new(Mutex::new(Vec::<ChatEntry>::new())),
        supervisor: supervisor.clone(),
        clock,
    };

    if config.start_training {
        if let Err(e) = supervisor.start().await {
            error!(error = %e, "failed to start training on boot");
        }
    }

    let watchdog_supervisor = supervisor.clone();
    let heartbeat_check_interval = config.heartbeat_check_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_check_interval);
        loop {
            interval.tick().await;
            watchdog_supervisor.watchdog_tick().await;
        }
    });

    tokio::spawn(listener::run(unix_listener, state));

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            std::process::exit(1);
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    supervisor.stop().await;
    info!("sv-daemon stopped");
}

fn build_agent(config: &Config) -> ProcessAgent {
    let command = config.agent_command.clone().unwrap_or_default();
    let timeout_secs = std::env::var(AGENT_TIMEOUT_SECS_ENV)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_AGENT_TIMEOUT_SECS);
    ProcessAgent::new(ProcessAgentConfig { command, timeout: Duration::from_secs_f64(timeout_secs) })
}

/// Best-effort purge of `*tfevents*` files under `run_dir`, matching
/// `--fresh-run`. Failures to read or remove an entry are logged and
/// otherwise ignored — a fresh run should still proceed without them.
fn purge_tfevents(run_dir: &std::path::Path) {
    let entries = match std::fs::read_dir(run_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, dir = %run_dir.display(), "could not read run-dir for fresh-run purge");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_tfevents = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.contains("tfevents"));
        if is_tfevents {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(error = %e, path = %path.display(), "failed to remove stale tfevents file");
            }
        }
    }
}
