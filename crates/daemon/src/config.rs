// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI flags and the validated [`Config`] built from them.
//!
//! A handful of flags (`--start-training`, `--fresh-run`, `--auto`) accept
//! their env-var form as a bare `=1`, which clap's built-in `env =` bool
//! parsing does not handle (it expects `true`/`false`). Those three are
//! resolved by hand in [`Config::from_cli`] instead of via `#[arg(env = ..)]`.

use std::path::PathBuf;

use clap::Parser;
use sv_core::RuntimeKind;
use sv_engine::{OomPolicyConfig, SupervisorConfig};
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(name = "sv-daemon", version, about = "ML-training supervision daemon")]
pub struct Cli {
    /// Unix socket path. Defaults to `<tmpdir>/sv-supervisor.sock`.
    #[arg(long, env = "SUPERVISOR_SOCKET")]
    pub socket: Option<String>,

    /// Training script path. Required.
    #[arg(long, env = "TRAINING_FILE")]
    pub training_file: Option<String>,

    /// Codebase indexing root.
    #[arg(long, env = "CODEBASE_ROOT")]
    pub codebase_root: Option<String>,

    /// Telemetry event directory.
    #[arg(long, env = "RUN_DIR")]
    pub run_dir: Option<String>,

    /// Explicit launch command, overriding `<interpreter> <training-file>`.
    #[arg(long, env = "TRAINING_CMD")]
    pub training_cmd: Option<String>,

    /// Interpreter used to launch `--training-file` when `--training-cmd` is unset.
    #[arg(long, env = "INTERPRETER", default_value = "python3")]
    pub interpreter: String,

    /// Start the training workload immediately on boot.
    #[arg(long)]
    pub start_training: bool,

    /// Purge `*tfevents*` files under `--run-dir` before starting.
    #[arg(long)]
    pub fresh_run: bool,

    /// Auto-apply refactors proposed by the diagnosing agent.
    #[arg(long)]
    pub auto: bool,

    #[arg(long, env = "RUNTIME", default_value = "local")]
    pub runtime: String,

    /// Shell-quoted command invoked once per diagnosing-agent call.
    #[arg(long, env = "AGENT_COMMAND")]
    pub agent_command: Option<String>,

    #[arg(long, default_value_t = 3)]
    pub max_runtime_retries: u32,

    #[arg(long, default_value_t = 2.0)]
    pub runtime_retry_backoff_secs: f64,

    #[arg(long, default_value_t = 60.0)]
    pub runtime_retry_backoff_max_secs: f64,

    #[arg(long, default_value_t = 120.0)]
    pub runtime_heartbeat_timeout_secs: f64,

    #[arg(long, default_value_t = 5.0)]
    pub runtime_heartbeat_check_secs: f64,

    #[arg(long, default_value = "on")]
    pub oom_policy: String,

    #[arg(long, default_value_t = 1)]
    pub oom_min_batch_size: i64,

    #[arg(long, default_value_t = 32)]
    pub oom_default_batch_size: i64,

    #[arg(long, default_value_t = 64)]
    pub oom_max_grad_accum: i64,

    #[arg(long, default_value_t = 128)]
    pub oom_min_seq_len: i64,

    #[arg(long, default_value = "BATCH,BATCH_SIZE,PER_DEVICE_TRAIN_BATCH_SIZE")]
    pub oom_batch_env_keys: String,

    #[arg(long, default_value = "GRAD_ACCUM,GRADIENT_ACCUMULATION_STEPS")]
    pub oom_accum_env_keys: String,

    #[arg(long, default_value = "SEQ_LEN,MAX_SEQ_LENGTH")]
    pub oom_seq_env_keys: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--training-file (or TRAINING_FILE) is required")]
    MissingTrainingFile,
    #[error("--runtime must be one of local, remote, scaffold, got {0:?}")]
    InvalidRuntime(String),
    #[error("--oom-policy must be on or off, got {0:?}")]
    InvalidOomPolicy(String),
    #[error("invalid value for {field}: {detail}")]
    InvalidValue { field: &'static str, detail: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub socket_path: PathBuf,
    pub training_file: String,
    pub codebase_root: PathBuf,
    pub run_dir: PathBuf,
    pub training_cmd: Option<String>,
    pub interpreter: String,
    pub agent_command: Option<String>,
    pub start_training: bool,
    pub fresh_run: bool,
    pub auto: bool,
    pub runtime: RuntimeKind,
    pub supervisor: SupervisorConfig,
    pub heartbeat_check_secs: f64,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

fn parse_runtime(raw: &str) -> Result<RuntimeKind, ConfigError> {
    match raw {
        "local" => Ok(RuntimeKind::Local),
        "remote" => Ok(RuntimeKind::Remote),
        "scaffold" => Ok(RuntimeKind::Scaffold),
        other => Err(ConfigError::InvalidRuntime(other.to_string())),
    }
}

fn split_env_keys(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn require_at_least(field: &'static str, value: f64, minimum: f64) -> Result<(), ConfigError> {
    if value < minimum {
        return Err(ConfigError::InvalidValue { field, detail: format!("{value} is below the minimum of {minimum}") });
    }
    Ok(())
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let training_file = cli.training_file.ok_or(ConfigError::MissingTrainingFile)?;
        let runtime = parse_runtime(&cli.runtime)?;

        let oom_enabled = match cli.oom_policy.as_str() {
            "on" => true,
            "off" => false,
            other => return Err(ConfigError::InvalidOomPolicy(other.to_string())),
        };

        require_at_least("--max-runtime-retries", cli.max_runtime_retries as f64, 0.0)?;
        require_at_least("--runtime-retry-backoff-secs", cli.runtime_retry_backoff_secs, 0.1)?;
        require_at_least("--runtime-retry-backoff-max-secs", cli.runtime_retry_backoff_max_secs, 0.1)?;
        require_at_least("--runtime-heartbeat-timeout-secs", cli.runtime_heartbeat_timeout_secs, 0.5)?;
        require_at_least("--runtime-heartbeat-check-secs", cli.runtime_heartbeat_check_secs, 0.5)?;
        require_at_least("--oom-min-batch-size", cli.oom_min_batch_size as f64, 1.0)?;
        require_at_least("--oom-default-batch-size", cli.oom_default_batch_size as f64, 1.0)?;
        require_at_least("--oom-max-grad-accum", cli.oom_max_grad_accum as f64, 1.0)?;
        require_at_least("--oom-min-seq-len", cli.oom_min_seq_len as f64, 1.0)?;

        let socket_path = cli
            .socket
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("sv-supervisor.sock"));

        Ok(Self {
            socket_path,
            training_file,
            codebase_root: PathBuf::from(cli.codebase_root.unwrap_or_else(|| ".".to_string())),
            run_dir: PathBuf::from(cli.run_dir.unwrap_or_else(|| ".".to_string())),
            training_cmd: cli.training_cmd,
            interpreter: cli.interpreter,
            agent_command: cli.agent_command,
            start_training: cli.start_training || env_flag("START_TRAINING"),
            fresh_run: cli.fresh_run || env_flag("FRESH_RUN"),
            auto: cli.auto || env_flag("AGENT_AUTO"),
            runtime,
            supervisor: SupervisorConfig {
                max_runtime_retries: cli.max_runtime_retries,
                retry_backoff_secs: cli.runtime_retry_backoff_secs,
                retry_backoff_max_secs: cli.runtime_retry_backoff_max_secs,
                heartbeat_timeout_secs: cli.runtime_heartbeat_timeout_secs,
                oom_policy: OomPolicyConfig {
                    enabled: oom_enabled,
                    min_batch_size: cli.oom_min_batch_size,
                    default_batch_size: cli.oom_default_batch_size,
                    max_grad_accum: cli.oom_max_grad_accum,
                    min_seq_len: cli.oom_min_seq_len,
                    batch_env_keys: split_env_keys(&cli.oom_batch_env_keys),
                    accum_env_keys: split_env_keys(&cli.oom_accum_env_keys),
                    seq_env_keys: split_env_keys(&cli.oom_seq_env_keys),
                },
            },
            heartbeat_check_secs: cli.runtime_heartbeat_check_secs,
        })
    }

    pub fn heartbeat_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.heartbeat_check_secs)
    }
}
