// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Owns the current runtime adapter, the retry counter, and the
//! failure-handling mutex. Mirrors the adapter's four callbacks onto
//! `RunState`, classifies failures, drives the OOM-aware recovery loop, and
//! runs the heartbeat watchdog.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use sv_adapters::{DiagnosingAgent, Plan, RuntimeAdapter, RuntimeCallbacks, RuntimeError, RuntimeFailure, SharedCallbacks};
use sv_core::{Alert, Clock, FailureClass, RunState, RuntimeKind, RuntimeStatus, classify_failure};

use crate::error::SupervisorError;
use crate::guarded_executor::GuardedExecutor;
use crate::oom_policy::{apply_oom_policy, OomPolicyConfig};

/// Builds a concrete `RuntimeAdapter` for a given backend kind. Injected by
/// the daemon so this crate never needs to know the specifics of any
/// particular remote sandbox client.
#[async_trait]
pub trait AdapterFactory: Send + Sync + 'static {
    async fn build(
        &self,
        kind: RuntimeKind,
        callbacks: SharedCallbacks,
        env_overrides: HashMap<String, String>,
    ) -> Result<Arc<dyn RuntimeAdapter>, RuntimeError>;
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_runtime_retries: u32,
    pub retry_backoff_secs: f64,
    pub retry_backoff_max_secs: f64,
    pub heartbeat_timeout_secs: f64,
    pub oom_policy: OomPolicyConfig,
}

struct Inner<F, G, C> {
    factory: F,
    agent: G,
    clock: C,
    guarded_executor: GuardedExecutor,
    state: Arc<Mutex<RunState>>,
    config: SupervisorConfig,
    adapter: Mutex<Option<Arc<dyn RuntimeAdapter>>>,
    failure_lock: tokio::sync::Mutex<()>,
    retries: Mutex<u32>,
    auto_mode: Mutex<bool>,
    runtime_kind: Mutex<RuntimeKind>,
    env_overrides: Mutex<HashMap<String, String>>,
}

/// A cheaply cloneable handle. Cloning shares the same adapter slot, retry
/// counter, and failure lock.
pub struct Supervisor<F, G, C> {
    inner: Arc<Inner<F, G, C>>,
}

impl<F, G, C> Clone for Supervisor<F, G, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<F, G, C> Supervisor<F, G, C>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    pub fn new(
        factory: F,
        agent: G,
        clock: C,
        guarded_executor: GuardedExecutor,
        state: Arc<Mutex<RunState>>,
        config: SupervisorConfig,
        initial_runtime_kind: RuntimeKind,
        auto_mode: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                agent,
                clock,
                guarded_executor,
                state,
                config,
                adapter: Mutex::new(None),
                failure_lock: tokio::sync::Mutex::new(()),
                retries: Mutex::new(0),
                auto_mode: Mutex::new(auto_mode),
                runtime_kind: Mutex::new(initial_runtime_kind),
                env_overrides: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn auto_mode(&self) -> bool {
        *self.inner.auto_mode.lock()
    }

    pub fn set_auto_mode(&self, enabled: bool) {
        *self.inner.auto_mode.lock() = enabled;
    }

    pub fn runtime_kind(&self) -> RuntimeKind {
        *self.inner.runtime_kind.lock()
    }

    pub fn set_runtime_kind(&self, kind: RuntimeKind) {
        *self.inner.runtime_kind.lock() = kind;
    }

    fn training_file_path(&self) -> PathBuf {
        PathBuf::from(self.inner.state.lock().training_file_path.clone())
    }

    /// Call the diagnosing agent directly, outside the failure path. Used
    /// by the ingestion server's `chat_message` and `metrics_update`
    /// handlers.
    pub async fn ask_agent(&self, context: &str, question: &str, alert: Option<&sv_core::Alert>) -> Plan {
        self.inner.agent.respond(context, question, alert).await
    }

    async fn close_adapter(&self) {
        let adapter = self.inner.adapter.lock().take();
        if let Some(adapter) = adapter {
            adapter.close().await;
        }
    }

    /// A fresh start (boot, or an operator-triggered restart): resets the
    /// retry counter on success. Recovery restarts go through
    /// [`Self::recovery`] instead, which calls the same inner routine
    /// without resetting the counter.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        self.start_inner(false).await
    }

    /// The restart callback handed to the guarded executor and to the
    /// ingestion server's `start_training`/`apply_refactor` handlers.
    pub async fn restart(&self) -> Result<(), String> {
        self.start_inner(false).await.map_err(|e| e.to_string())
    }

    async fn start_inner(&self, is_recovery: bool) -> Result<(), SupervisorError> {
        {
            let mut state = self.inner.state.lock();
            state.begin_rollout_generation();
            state.rollout_desired_state = RuntimeStatus::Running;
        }
        self.close_adapter().await;

        let kind = self.runtime_kind();
        let env_overrides = self.inner.env_overrides.lock().clone();
        let callbacks: SharedCallbacks = Arc::new(self.clone());

        let now = self.inner.clock.now();
        {
            let mut state = self.inner.state.lock();
            state.set_runtime_status(RuntimeStatus::Starting, now);
        }

        let adapter = self
            .inner
            .factory
            .build(kind, callbacks, env_overrides)
            .await
            .map_err(SupervisorError::StartFailed)?;

        match adapter.start().await {
            Ok(result) => {
                *self.inner.adapter.lock() = Some(adapter);
                let now = self.inner.clock.now();
                let mut state = self.inner.state.lock();
                state.set_runtime_status(RuntimeStatus::Running, now);
                state.runtime_id = Some(result.runtime_id);
                state.stamp_heartbeat(now);
                state.clear_failure();
                if !is_recovery {
                    *self.inner.retries.lock() = 0;
                }
                Ok(())
            }
            Err(e) => Err(SupervisorError::StartFailed(e)),
        }
    }

    /// Run a plan through the guarded executor, using this supervisor's own
    /// restart callback. Shared by the failure path (`on_failure`) and the
    /// ingestion server's `apply_refactor` handler so both go through the
    /// same snapshot/patch/restart/rollback machinery.
    pub async fn apply_plan(&self, plan: &Plan) -> crate::guarded_executor::ExecutionResult {
        let run_state_snapshot = self.inner.state.lock().clone();
        let target_path = self.training_file_path();
        let epoch_secs = self.inner.clock.now() as u64;
        let auto_mode = self.auto_mode();
        let supervisor = self.clone();
        self.inner
            .guarded_executor
            .execute(plan, &run_state_snapshot, auto_mode, &target_path, epoch_secs, move || async move { supervisor.restart().await })
            .await
    }

    pub async fn stop(&self) {
        self.close_adapter().await;
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        if !matches!(state.runtime_status, RuntimeStatus::Failed | RuntimeStatus::Error) {
            state.set_runtime_status(RuntimeStatus::Stopped, now);
            state.rollout_desired_state = RuntimeStatus::Stopped;
        }
    }

    async fn recovery(&self, failure: &RuntimeFailure, class: FailureClass) {
        if !self.auto_mode() {
            tracing::info!("auto-mode is off, not recovering from runtime failure");
            return;
        }

        let attempt = {
            let mut retries = self.inner.retries.lock();
            if *retries >= self.inner.config.max_runtime_retries {
                tracing::warn!(retries = *retries, "runtime retry budget exhausted, not recovering");
                return;
            }
            *retries += 1;
            *retries
        };

        self.inner.state.lock().runtime_restarts += 1;

        if class == FailureClass::Oom {
            if self.inner.config.oom_policy.enabled {
                let env: HashMap<String, String> = std::env::vars().collect();
                let mut overrides = self.inner.env_overrides.lock();
                let outcome = apply_oom_policy(&self.inner.config.oom_policy, &env, &overrides);
                for line in &outcome.log_lines {
                    tracing::info!(%line, "oom policy mutation");
                }
                {
                    let mut state = self.inner.state.lock();
                    state.metrics.record("runtime/oom_policy_applied", if outcome.applied { 1.0 } else { 0.0 }, None);
                }
                *overrides = outcome.overrides;
            } else {
                tracing::info!("oom policy disabled, skipping resource back-off");
            }
        }

        let backoff = (self.inner.config.retry_backoff_secs * 2f64.powi(attempt as i32 - 1)).min(self.inner.config.retry_backoff_max_secs);

        let now = self.inner.clock.now();
        {
            let mut state = self.inner.state.lock();
            state.set_runtime_status(RuntimeStatus::Recovering, now);
            state.rollout_last_error = Some(format!("recovering from {}: {}", class.as_str(), failure.message));
        }

        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;

        match self.start_inner(true).await {
            Ok(()) => tracing::info!(attempt, "recovery restart succeeded"),
            Err(e) => tracing::error!(attempt, error = %e, "recovery restart failed"),
        }
    }

    pub async fn watchdog_tick(&self) {
        if self.inner.adapter.lock().is_none() {
            return;
        }
        let now = self.inner.clock.now();
        let (status, lease_deadline, last_heartbeat) = {
            let state = self.inner.state.lock();
            (state.runtime_status, state.rollout_lease_deadline, state.runtime_last_heartbeat)
        };
        if status != RuntimeStatus::Running {
            return;
        }
        if let Some(deadline) = lease_deadline {
            if now > deadline {
                self.on_failure(RuntimeFailure {
                    status: "timeout".to_string(),
                    error_type: "ROLLOUT_LEASE_EXPIRED".to_string(),
                    message: "rollout lease expired before a heartbeat renewed it".to_string(),
                    exit_code: None,
                })
                .await;
                return;
            }
        }
        if let Some(last) = last_heartbeat {
            if now - last > self.inner.config.heartbeat_timeout_secs {
                self.on_failure(RuntimeFailure {
                    status: "timeout".to_string(),
                    error_type: "RUNTIME_HEARTBEAT_TIMEOUT".to_string(),
                    message: format!("no heartbeat for {:.1}s", now - last),
                    exit_code: None,
                })
                .await;
            }
        }
    }
}

#[async_trait]
impl<F, G, C> RuntimeCallbacks for Supervisor<F, G, C>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    async fn on_log(&self, line: &str) {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.logs.push(line.to_string());
        state.stamp_heartbeat(now);
        if state.runtime_status.lease_active() {
            state.rollout_lease_deadline = Some(now + self.inner.config.heartbeat_timeout_secs);
        }
    }

    async fn on_heartbeat(&self) {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.stamp_heartbeat(now);
        if state.runtime_status.lease_active() {
            state.rollout_lease_deadline = Some(now + self.inner.config.heartbeat_timeout_secs);
        }
    }

    async fn on_complete(&self, _status: &str) {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.set_runtime_status(RuntimeStatus::Completed, now);
        state.rollout_desired_state = RuntimeStatus::Completed;
        state.clear_failure();
    }

    async fn on_failure(&self, failure: RuntimeFailure) {
        let _guard = self.inner.failure_lock.lock().await;

        let class = classify_failure(&failure.status, &failure.error_type, &failure.message);
        let now = self.inner.clock.now();

        let run_state_snapshot = {
            let mut state = self.inner.state.lock();
            state.set_failure(class, failure.error_type.clone(), failure.message.clone(), now);
            state.runtime_last_exit_code = failure.exit_code;
            state.alerts.push(Alert::new("runtime/health", 0.0, 1.0, format!("runtime failed: {}", failure.message), now));
            state.metrics.record("runtime/failures", 1.0, None);
            state.clone()
        };

        let context = format!(
            "training_file={} codebase_root={} runtime_status={:?}",
            run_state_snapshot.training_file_path, run_state_snapshot.codebase_root, run_state_snapshot.runtime_status,
        );
        let question = format!("Runtime failure classified as {}: {}", class.as_str(), failure.message);
        let alert = run_state_snapshot.alerts.last().cloned();

        let plan: Plan = self.inner.agent.respond(&context, &question, alert.as_ref()).await;

        if plan.action == sv_adapters::AgentAction::Refactor && self.auto_mode() {
            let target_path = self.training_file_path();
            let epoch_secs = now as u64;
            let supervisor = self.clone();
            let _ = self
                .inner
                .guarded_executor
                .execute(&plan, &run_state_snapshot, true, &target_path, epoch_secs, move || async move { supervisor.restart().await })
                .await;
            return;
        }

        self.recovery(&failure, class).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_adapters::agent::FakeAgent;
    use sv_core::FakeClock;
    use sv_storage::CheckpointStore;

    struct AlwaysFailsFactory;

    #[async_trait]
    impl AdapterFactory for AlwaysFailsFactory {
        async fn build(&self, _kind: RuntimeKind, _callbacks: SharedCallbacks, _env_overrides: HashMap<String, String>) -> Result<Arc<dyn RuntimeAdapter>, RuntimeError> {
            Err(RuntimeError::SpawnFailed("no backend wired in this test".to_string()))
        }
    }

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            max_runtime_retries: 3,
            retry_backoff_secs: 1.0,
            retry_backoff_max_secs: 8.0,
            heartbeat_timeout_secs: 30.0,
            oom_policy: crate::oom_policy::OomPolicyConfig {
                enabled: true,
                min_batch_size: 1,
                default_batch_size: 32,
                max_grad_accum: 8,
                min_seq_len: 256,
                batch_env_keys: vec!["BATCH".to_string()],
                accum_env_keys: vec!["GRAD_ACCUM".to_string()],
                seq_env_keys: vec!["SEQ_LEN".to_string()],
            },
        }
    }

    fn supervisor(tmp: &std::path::Path) -> Supervisor<AlwaysFailsFactory, FakeAgent, FakeClock> {
        let state = Arc::new(Mutex::new(RunState::new("train.py", ".")));
        let executor = GuardedExecutor::new(CheckpointStore::new(tmp.join("ckpts")));
        let plan = Plan::fallback("RuntimeError", "boom");
        Supervisor::new(AlwaysFailsFactory, FakeAgent::new(plan), FakeClock::new(0.0), executor, state, test_config(), RuntimeKind::Local, true)
    }

    #[tokio::test]
    async fn start_failure_surfaces_as_supervisor_error() {
        let tmp = tempfile::tempdir().unwrap();
        let sup = supervisor(tmp.path());
        let err = sup.start().await.unwrap_err();
        assert!(matches!(err, SupervisorError::StartFailed(_)));
    }

    #[tokio::test]
    async fn on_failure_without_auto_mode_does_not_recover() {
        let tmp = tempfile::tempdir().unwrap();
        let sup = supervisor(tmp.path());
        sup.set_auto_mode(false);
        sup.on_failure(RuntimeFailure {
            status: "failed".to_string(),
            error_type: "LOCAL_EXIT_NONZERO".to_string(),
            message: "exit 1".to_string(),
            exit_code: Some(1),
        })
        .await;
        assert_eq!(*sup.inner.retries.lock(), 0);
    }

    #[tokio::test]
    async fn on_failure_records_health_alert_and_metric() {
        let tmp = tempfile::tempdir().unwrap();
        let sup = supervisor(tmp.path());
        sup.on_failure(RuntimeFailure {
            status: "failed".to_string(),
            error_type: "LOCAL_EXIT_NONZERO".to_string(),
            message: "exit 1".to_string(),
            exit_code: Some(1),
        })
        .await;
        let state = sup.inner.state.lock();
        assert_eq!(state.alerts.len(), 1);
        assert_eq!(state.alerts[0].metric, "runtime/health");
        assert_eq!(state.metrics.series("runtime/failures").unwrap().last(), Some(1.0));
    }

    #[tokio::test]
    async fn watchdog_skips_when_no_adapter_started() {
        let tmp = tempfile::tempdir().unwrap();
        let sup = supervisor(tmp.path());
        sup.watchdog_tick().await;
        let state = sup.inner.state.lock();
        assert!(state.alerts.is_empty());
    }

    #[tokio::test]
    async fn runtime_kind_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let sup = supervisor(tmp.path());
        assert_eq!(sup.runtime_kind(), RuntimeKind::Local);
        sup.set_runtime_kind(RuntimeKind::Remote);
        assert_eq!(sup.runtime_kind(), RuntimeKind::Remote);
    }
}
