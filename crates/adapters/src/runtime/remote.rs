// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote backend: runs the workload inside a sandbox reached through an
//! opaque [`RemoteSandboxClient`]. The concrete sandbox API is out of
//! scope here — this module only encodes the lifecycle (auth, create,
//! upload, launch, poll, teardown) and the monitor loop around it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::oom_patterns::buffer_matches_oom_pattern;
use super::{RuntimeAdapter, RuntimeError, RuntimeFailure, RuntimeStartResult, SharedCallbacks};

/// Terminal sandbox/job statuses that the monitor loop treats as a failure
/// signal, distinct from a completed job with a non-zero exit code.
const FAILURE_STATUSES: &[&str] = &["ERROR", "TERMINATED", "TIMEOUT", "STOPPED"];

/// Teardown behaviour once the monitor loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownMode {
    /// Sync logs and the checkpoint archive locally before deleting the sandbox.
    Cleanup,
    /// Delete the sandbox without syncing anything back.
    Kill,
}

#[derive(Debug, Clone)]
pub struct RemoteAdapterConfig {
    pub image: String,
    pub cpu: String,
    pub memory: String,
    pub timeout: Duration,
    pub run_tag: String,
    pub training_file: String,
    pub command: Vec<String>,
    pub poll_interval: Duration,
    pub teardown: TeardownMode,
    pub checkpoint_archive: Option<std::path::PathBuf>,
}

/// The opaque boundary to whatever remote sandbox API the deployment uses.
/// Exactly one real implementation exists per deployment target; tests use
/// a fake.
#[async_trait]
pub trait RemoteSandboxClient: Send + Sync + 'static {
    async fn ensure_auth(&self) -> Result<(), RuntimeError>;
    async fn create_sandbox(&self, config: &RemoteAdapterConfig) -> Result<String, RuntimeError>;
    async fn wait_ready(&self, sandbox_id: &str) -> Result<(), RuntimeError>;
    async fn upload_training_file(&self, sandbox_id: &str, training_file: &str) -> Result<(), RuntimeError>;
    async fn launch_job(&self, sandbox_id: &str, command: &[String]) -> Result<String, RuntimeError>;
    async fn sandbox_status(&self, sandbox_id: &str) -> Result<String, RuntimeError>;
    async fn job_status(&self, sandbox_id: &str, job_id: &str) -> Result<JobStatus, RuntimeError>;
    async fn tail_logs(&self, sandbox_id: &str, job_id: &str) -> Result<Vec<String>, RuntimeError>;
    async fn sync_back(&self, sandbox_id: &str, archive: &std::path::Path) -> Result<(), RuntimeError>;
    async fn delete_sandbox(&self, sandbox_id: &str) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone)]
pub struct JobStatus {
    pub completed: bool,
    pub exit_code: Option<i32>,
}

pub struct RemoteAdapter<C: RemoteSandboxClient> {
    config: RemoteAdapterConfig,
    client: Arc<C>,
    callbacks: SharedCallbacks,
    sandbox_id: Mutex<Option<String>>,
    stopped: Arc<AtomicBool>,
}

impl<C: RemoteSandboxClient> RemoteAdapter<C> {
    pub fn new(config: RemoteAdapterConfig, client: Arc<C>, callbacks: SharedCallbacks) -> Self {
        Self {
            config,
            client,
            callbacks,
            sandbox_id: Mutex::new(None),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl<C: RemoteSandboxClient> RuntimeAdapter for RemoteAdapter<C> {
    async fn start(&self) -> Result<RuntimeStartResult, RuntimeError> {
        self.client.ensure_auth().await?;
        let sandbox_id = self.client.create_sandbox(&self.config).await?;
        self.client.wait_ready(&sandbox_id).await?;

        if let Some(archive) = &self.config.checkpoint_archive {
            if archive.exists() {
                let _ = self.client.sync_back(&sandbox_id, archive).await;
            }
        }
        self.client.upload_training_file(&sandbox_id, &self.config.training_file).await?;
        let job_id = self.client.launch_job(&sandbox_id, &self.config.command).await?;

        *self.sandbox_id.lock() = Some(sandbox_id.clone());
        self.stopped.store(false, Ordering::SeqCst);

        spawn_monitor(
            Arc::clone(&self.client),
            sandbox_id.clone(),
            job_id,
            self.config.clone(),
            Arc::clone(&self.callbacks),
            Arc::clone(&self.stopped),
        );

        Ok(RuntimeStartResult { runtime_id: sandbox_id })
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let sandbox_id = self.sandbox_id.lock().take();
        if let Some(sandbox_id) = sandbox_id {
            let _ = self.client.delete_sandbox(&sandbox_id).await;
        }
    }

    async fn close(&self) {
        self.stop().await;
    }
}

fn spawn_monitor<C: RemoteSandboxClient>(
    client: Arc<C>,
    sandbox_id: String,
    job_id: String,
    config: RemoteAdapterConfig,
    callbacks: SharedCallbacks,
    stopped: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let mut prev_tail: Vec<String> = Vec::new();
        let mut consecutive_errors: u32 = 0;
        let mut backoff = config.poll_interval;
        let cap = Duration::from_secs(10);

        loop {
            if stopped.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(backoff).await;
            if stopped.load(Ordering::SeqCst) {
                return;
            }

            let round = async {
                let status = client.sandbox_status(&sandbox_id).await?;
                if FAILURE_STATUSES.contains(&status.as_str()) {
                    return Ok(Some(RuntimeFailure {
                        status: "failed".to_string(),
                        error_type: format!("REMOTE_{status}"),
                        message: format!("sandbox reported status {status}"),
                        exit_code: None,
                    }));
                }

                let tail = client.tail_logs(&sandbox_id, &job_id).await?;
                let fresh = trim_overlap(&prev_tail, &tail);
                for line in &fresh {
                    callbacks.on_log(line).await;
                    callbacks.on_heartbeat().await;
                }
                prev_tail = tail;

                let job_status = client.job_status(&sandbox_id, &job_id).await?;
                if job_status.completed {
                    if job_status.exit_code.unwrap_or(0) == 0 {
                        callbacks.on_complete("completed").await;
                        return Ok(None);
                    }
                    let error_type = if buffer_matches_oom_pattern(&prev_tail) {
                        "REMOTE_OOM"
                    } else {
                        "REMOTE_EXIT_NONZERO"
                    };
                    return Ok(Some(RuntimeFailure {
                        status: "failed".to_string(),
                        error_type: error_type.to_string(),
                        message: format!("remote job exited with code {:?}", job_status.exit_code),
                        exit_code: job_status.exit_code,
                    }));
                }
                Ok::<Option<RuntimeFailure>, RuntimeError>(None)
            }
            .await;

            match round {
                Ok(Some(failure)) => {
                    teardown(&client, &sandbox_id, &config).await;
                    callbacks.on_failure(failure).await;
                    return;
                }
                Ok(None) => {
                    consecutive_errors = 0;
                    backoff = config.poll_interval;
                }
                Err(_) => {
                    consecutive_errors += 1;
                    backoff = (config.poll_interval * consecutive_errors).min(cap);
                    if consecutive_errors >= 3 {
                        teardown(&client, &sandbox_id, &config).await;
                        callbacks
                            .on_failure(RuntimeFailure {
                                status: "failed".to_string(),
                                error_type: "REMOTE_MONITOR_ERROR".to_string(),
                                message: "monitor loop failed 3 consecutive times".to_string(),
                                exit_code: None,
                            })
                            .await;
                        return;
                    }
                }
            }
        }
    });
}

async fn teardown<C: RemoteSandboxClient>(client: &Arc<C>, sandbox_id: &str, config: &RemoteAdapterConfig) {
    if config.teardown == TeardownMode::Cleanup {
        if let Some(archive) = &config.checkpoint_archive {
            let _ = client.sync_back(sandbox_id, archive).await;
        }
    }
    let _ = client.delete_sandbox(sandbox_id).await;
}

/// Trim duplicate lines from a sliding tail window: find the largest `k`
/// such that the last `k` lines of `prev` equal the first `k` lines of
/// `curr`, and return only `curr[k:]`.
pub fn trim_overlap(prev: &[String], curr: &[String]) -> Vec<String> {
    let max_k = prev.len().min(curr.len());
    for k in (0..=max_k).rev() {
        if prev[prev.len() - k..] == curr[..k] {
            return curr[k..].to_vec();
        }
    }
    curr.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn trim_overlap_drops_lines_already_seen() {
        let prev = lines(&["a", "b", "c"]);
        let curr = lines(&["b", "c", "d"]);
        assert_eq!(trim_overlap(&prev, &curr), lines(&["d"]));
    }

    #[test]
    fn trim_overlap_no_overlap_returns_everything() {
        let prev = lines(&["a", "b"]);
        let curr = lines(&["x", "y"]);
        assert_eq!(trim_overlap(&prev, &curr), lines(&["x", "y"]));
    }

    #[test]
    fn trim_overlap_full_overlap_returns_empty() {
        let prev = lines(&["a", "b", "c"]);
        let curr = lines(&["a", "b", "c"]);
        assert!(trim_overlap(&prev, &curr).is_empty());
    }

    #[test]
    fn trim_overlap_empty_prev_returns_all() {
        let prev: Vec<String> = Vec::new();
        let curr = lines(&["a", "b"]);
        assert_eq!(trim_overlap(&prev, &curr), lines(&["a", "b"]));
    }
}
