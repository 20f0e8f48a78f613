// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local backend: spawns the training workload as a child process on this
//! host and streams its combined stdout/stderr.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use super::oom_patterns::buffer_matches_oom_pattern;
use super::{build_child_env, resolve_command, RuntimeAdapter, RuntimeError, RuntimeFailure, RuntimeStartResult, SharedCallbacks};

/// Number of most-recent lines kept for OOM-pattern heuristics.
const OOM_BUFFER_LINES: usize = 400;

/// How long `stop` waits after sending a terminate signal before killing.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LocalAdapterConfig {
    pub codebase_root: PathBuf,
    pub training_file: String,
    pub interpreter: String,
    pub explicit_command: Option<String>,
    pub socket_path: String,
    pub run_dir: String,
    pub env_overrides: Vec<(String, String)>,
    /// Announced in a log line and recorded as metadata by `ScaffoldAdapter`;
    /// `None` for a genuine local run.
    pub scaffold_mode: Option<&'static str>,
}

pub struct LocalAdapter {
    config: LocalAdapterConfig,
    callbacks: SharedCallbacks,
    child: Arc<Mutex<Option<Child>>>,
    stop_requested: Arc<AtomicBool>,
    buffer: Arc<Mutex<VecDeque<String>>>,
}

impl LocalAdapter {
    pub fn new(config: LocalAdapterConfig, callbacks: SharedCallbacks) -> Self {
        Self {
            config,
            callbacks,
            child: Arc::new(Mutex::new(None)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(OOM_BUFFER_LINES))),
        }
    }

    fn push_buffer(buffer: &Mutex<VecDeque<String>>, line: &str) {
        let mut buf = buffer.lock();
        if buf.len() == OOM_BUFFER_LINES {
            buf.pop_front();
        }
        buf.push_back(line.to_string());
    }
}

#[async_trait]
impl RuntimeAdapter for LocalAdapter {
    async fn start(&self) -> Result<RuntimeStartResult, RuntimeError> {
        self.close().await;
        self.stop_requested.store(false, Ordering::SeqCst);

        let argv = resolve_command(
            self.config.explicit_command.as_deref(),
            &self.config.interpreter,
            &self.config.training_file,
        )?;
        let (program, args) = argv.split_first().ok_or_else(|| RuntimeError::SpawnFailed("empty command".into()))?;

        let env = build_child_env(&self.config.socket_path, &self.config.run_dir, &self.config.env_overrides);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.config.codebase_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(env);

        let mut child = cmd.spawn().map_err(|e| RuntimeError::SpawnFailed(e.to_string()))?;
        let runtime_id = child.id().map(|pid| pid.to_string()).unwrap_or_else(|| "unknown".to_string());

        if let Some(mode) = self.config.scaffold_mode {
            self.callbacks.on_log(&format!("mode={mode}")).await;
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self.child.lock() = Some(child);

        let callbacks = Arc::clone(&self.callbacks);
        let buffer = Arc::clone(&self.buffer);
        if let Some(stdout) = stdout {
            spawn_line_pump(stdout, Arc::clone(&callbacks), Arc::clone(&buffer));
        }
        if let Some(stderr) = stderr {
            spawn_line_pump(stderr, Arc::clone(&callbacks), Arc::clone(&buffer));
        }

        spawn_wait_task(
            Arc::clone(&self.child),
            Arc::clone(&self.stop_requested),
            Arc::clone(&self.buffer),
            Arc::clone(&self.callbacks),
        );

        Ok(RuntimeStartResult { runtime_id })
    }

    async fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        let pid_and_child = self.child.lock().take();
        if let Some(mut child) = pid_and_child {
            #[cfg(unix)]
            if let Some(pid) = child.id() {
                let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), nix::sys::signal::Signal::SIGTERM);
            }
            let waited = tokio::time::timeout(STOP_GRACE_PERIOD, child.wait()).await;
            if waited.is_err() {
                let _ = child.kill().await;
            }
        }
    }

    async fn close(&self) {
        self.stop().await;
    }
}

/// Reads lines byte-wise rather than via `AsyncBufReadExt::lines()`, which
/// errors on invalid UTF-8. A training process's stdout is not guaranteed
/// to be valid UTF-8 line-by-line, so invalid bytes are lossy-replaced
/// instead of dropping the line or killing the pump.
fn spawn_line_pump<R>(reader: R, callbacks: SharedCallbacks, buffer: Arc<Mutex<VecDeque<String>>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => break,
            }
            while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8_lossy(&raw).into_owned();
            LocalAdapter::push_buffer(&buffer, &line);
            callbacks.on_log(&line).await;
            callbacks.on_heartbeat().await;
        }
    });
}

fn spawn_wait_task(
    child_slot: Arc<Mutex<Option<Child>>>,
    stop_requested: Arc<AtomicBool>,
    buffer: Arc<Mutex<VecDeque<String>>>,
    callbacks: SharedCallbacks,
) {
    tokio::spawn(async move {
        let child_opt = child_slot.lock().take();
        let Some(mut child) = child_opt else { return };
        let wait_result = child.wait().await;
        if stop_requested.load(Ordering::SeqCst) {
            return;
        }

        match wait_result {
            Ok(status) if status.success() => {
                callbacks.on_complete("completed").await;
            }
            Ok(status) => {
                let exit_code = status.code();
                let recent = buffer.lock().iter().cloned().collect::<Vec<_>>();
                let error_type = if buffer_matches_oom_pattern(&recent) {
                    "LOCAL_OOM"
                } else {
                    "LOCAL_EXIT_NONZERO"
                };
                callbacks
                    .on_failure(RuntimeFailure {
                        status: "failed".to_string(),
                        error_type: error_type.to_string(),
                        message: format!("local workload exited with code {exit_code:?}"),
                        exit_code,
                    })
                    .await;
            }
            Err(err) => {
                callbacks
                    .on_failure(RuntimeFailure {
                        status: "failed".to_string(),
                        error_type: "LOCAL_EXIT_NONZERO".to_string(),
                        message: format!("failed to wait on local workload: {err}"),
                        exit_code: None,
                    })
                    .await;
            }
        }
    });
}
