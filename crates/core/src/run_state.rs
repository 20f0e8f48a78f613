// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-memory run state singleton: metrics, logs, alerts, and the
//! runtime/rollout fields the supervisor owns.

use serde::{Deserialize, Serialize};

use crate::alert::Alert;
use crate::id::RolloutId;
use crate::log_ring::LogRing;
use crate::metric::MetricStore;
use crate::status::{FailureClass, RuntimeKind, RuntimeStatus};

/// Ownership split: the supervisor writes every `runtime_*`/`rollout_*`
/// field; ingestion handlers write `metrics`/`logs`/`alerts`. Both sides
/// read freely. Mutation is serialised by the cooperative scheduler, not
/// by a lock inside this struct — callers running on multiple OS threads
/// must guard a `RunState` themselves (the daemon wraps it in
/// `parking_lot::Mutex`).
///
/// `metrics` and `logs` are not `Serialize` — they index by name / grow
/// unbounded internally. The daemon's `get_run_state` handler builds its
/// own `log_tail`/`metric_tail`-bounded snapshot DTO instead of serialising
/// this struct wholesale.
#[derive(Debug, Clone)]
pub struct RunState {
    pub training_file_path: String,
    pub codebase_root: String,
    pub metrics: MetricStore,
    pub logs: LogRing,
    pub alerts: Vec<Alert>,
    pub is_active: bool,

    pub runtime_kind: RuntimeKind,
    pub runtime_status: RuntimeStatus,
    pub runtime_id: Option<String>,
    pub runtime_failure_reason: Option<String>,
    pub runtime_error_type: Option<String>,
    pub runtime_failure_class: Option<FailureClass>,
    pub runtime_restarts: u32,
    pub runtime_last_heartbeat: Option<f64>,
    pub runtime_last_exit_code: Option<i32>,

    pub rollout_id: Option<RolloutId>,
    pub rollout_desired_state: RuntimeStatus,
    pub rollout_observed_state: RuntimeStatus,
    pub rollout_generation: u64,
    pub rollout_lease_deadline: Option<f64>,
    pub rollout_last_transition_ts: Option<f64>,
    pub rollout_last_error: Option<String>,
}

/// Bounded, wire-serialisable projection of a [`RunState`], built by the
/// ingestion server's `get_run_state` handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStateSnapshot {
    pub training_file_path: String,
    pub codebase_root: String,
    pub log_tail: String,
    pub metric_tails: std::collections::HashMap<String, Vec<f64>>,
    pub current_step: u64,
    pub alerts: Vec<Alert>,
    pub is_active: bool,

    pub runtime_kind: RuntimeKind,
    pub runtime_status: RuntimeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_failure_class: Option<FailureClass>,
    pub runtime_restarts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_last_heartbeat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_last_exit_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_id: Option<RolloutId>,
    pub rollout_desired_state: RuntimeStatus,
    pub rollout_observed_state: RuntimeStatus,
    pub rollout_generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_lease_deadline: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_last_transition_ts: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_last_error: Option<String>,
}

impl RunState {
    pub fn new(training_file_path: impl Into<String>, codebase_root: impl Into<String>) -> Self {
        Self {
            training_file_path: training_file_path.into(),
            codebase_root: codebase_root.into(),
            metrics: MetricStore::default(),
            logs: LogRing::default(),
            alerts: Vec::new(),
            is_active: false,
            runtime_kind: RuntimeKind::default(),
            runtime_status: RuntimeStatus::Idle,
            runtime_id: None,
            runtime_failure_reason: None,
            runtime_error_type: None,
            runtime_failure_class: None,
            runtime_restarts: 0,
            runtime_last_heartbeat: None,
            runtime_last_exit_code: None,
            rollout_id: None,
            rollout_desired_state: RuntimeStatus::Idle,
            rollout_observed_state: RuntimeStatus::Idle,
            rollout_generation: 0,
            rollout_lease_deadline: None,
            rollout_last_transition_ts: None,
            rollout_last_error: None,
        }
    }

    pub fn current_step(&self) -> u64 {
        self.metrics.current_step()
    }

    /// Build a bounded, wire-serialisable snapshot honouring the
    /// `log_tail`/`metric_tail` request parameters from `get_run_state`.
    pub fn snapshot(&self, log_tail: usize, metric_tail: usize) -> RunStateSnapshot {
        let metric_tails = self
            .metrics
            .metric_names()
            .map(|name| {
                let values = self
                    .metrics
                    .series(name)
                    .map(|series| series.tail(metric_tail).to_vec())
                    .unwrap_or_default();
                (name.to_string(), values)
            })
            .collect();

        RunStateSnapshot {
            training_file_path: self.training_file_path.clone(),
            codebase_root: self.codebase_root.clone(),
            log_tail: self.logs.log_tail(log_tail),
            metric_tails,
            current_step: self.current_step(),
            alerts: self.alerts.clone(),
            is_active: self.is_active,
            runtime_kind: self.runtime_kind,
            runtime_status: self.runtime_status,
            runtime_id: self.runtime_id.clone(),
            runtime_failure_reason: self.runtime_failure_reason.clone(),
            runtime_error_type: self.runtime_error_type.clone(),
            runtime_failure_class: self.runtime_failure_class,
            runtime_restarts: self.runtime_restarts,
            runtime_last_heartbeat: self.runtime_last_heartbeat,
            runtime_last_exit_code: self.runtime_last_exit_code,
            rollout_id: self.rollout_id.clone(),
            rollout_desired_state: self.rollout_desired_state,
            rollout_observed_state: self.rollout_observed_state,
            rollout_generation: self.rollout_generation,
            rollout_lease_deadline: self.rollout_lease_deadline,
            rollout_last_transition_ts: self.rollout_last_transition_ts,
            rollout_last_error: self.rollout_last_error.clone(),
        }
    }

    /// Stamp `runtime_last_heartbeat`. Called on every log line, every
    /// status change, and every adapter-reported heartbeat.
    pub fn stamp_heartbeat(&mut self, now: f64) {
        self.runtime_last_heartbeat = Some(now);
    }

    /// Move to a new runtime status, stamping the rollout transition
    /// timestamp and clearing the lease deadline outside transitional
    /// states.
    pub fn set_runtime_status(&mut self, status: RuntimeStatus, now: f64) {
        self.runtime_status = status;
        self.rollout_observed_state = status;
        self.rollout_last_transition_ts = Some(now);
        if !status.lease_active() {
            self.rollout_lease_deadline = None;
        }
    }

    /// Increment the rollout generation. Must be called exactly once per
    /// start/restart attempt so `rollout_generation` stays strictly
    /// monotonic.
    pub fn begin_rollout_generation(&mut self) -> u64 {
        self.rollout_generation += 1;
        self.rollout_generation
    }

    pub fn set_failure(&mut self, class: FailureClass, error_type: impl Into<String>, reason: impl Into<String>, now: f64) {
        self.runtime_failure_class = Some(class);
        self.runtime_error_type = Some(error_type.into());
        let reason = reason.into();
        self.rollout_last_error = Some(reason.clone());
        self.runtime_failure_reason = Some(reason);
        self.set_runtime_status(RuntimeStatus::Failed, now);
    }

    pub fn clear_failure(&mut self) {
        self.runtime_failure_class = None;
        self.runtime_error_type = None;
        self.runtime_failure_reason = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_strictly_increases() {
        let mut state = RunState::new("train.py", ".");
        assert_eq!(state.begin_rollout_generation(), 1);
        assert_eq!(state.begin_rollout_generation(), 2);
        assert_eq!(state.begin_rollout_generation(), 3);
    }

    #[test]
    fn lease_clears_outside_transitional_states() {
        let mut state = RunState::new("train.py", ".");
        state.rollout_lease_deadline = Some(100.0);
        state.set_runtime_status(RuntimeStatus::Completed, 50.0);
        assert!(state.rollout_lease_deadline.is_none());
    }

    #[test]
    fn set_runtime_status_stamps_transition_and_mirrors_observed() {
        let mut state = RunState::new("train.py", ".");
        state.set_runtime_status(RuntimeStatus::Running, 10.0);
        assert_eq!(state.rollout_observed_state, RuntimeStatus::Running);
        assert_eq!(state.rollout_last_transition_ts, Some(10.0));
    }

    #[test]
    fn snapshot_bounds_log_and_metric_tails() {
        let mut state = RunState::new("train.py", ".");
        for v in [1.0, 2.0, 3.0] {
            state.metrics.record("loss", v, Some(1));
        }
        for line in ["a", "b", "c"] {
            state.logs.push(line);
        }
        let snap = state.snapshot(2, 1);
        assert_eq!(snap.log_tail, "b\nc");
        assert_eq!(snap.metric_tails.get("loss").unwrap(), &vec![3.0]);
    }
}
