// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NDJSON request dispatch. Each connection is persistent and
//! request/reply-serial: [`handle_line`] parses one line, runs the matching
//! handler, and returns the one JSON value to write back.
//!
//! Parsing is two-step on purpose. A line that isn't even valid JSON gets
//! `invalid_json`; a line that parses but names no handler gets
//! `unknown_type`. Handlers are dispatched by hand on the `type` string
//! rather than through a single serde-tagged enum so each one can report
//! its own missing/invalid-field error kind instead of one generic
//! deserialization failure.

use serde_json::{json, Map, Value};
use sv_adapters::{AgentAction, DiagnosingAgent, Plan};
use sv_core::{Clock, RuntimeKind, RuntimeStatus};
use sv_engine::AdapterFactory;

use crate::state::AppState;

pub async fn handle_line<F, G, C>(line: &str, state: &AppState<F, G, C>) -> Value
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let parsed: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return err_response("invalid_json"),
    };
    let Some(obj) = parsed.as_object() else {
        return err_response("invalid_json");
    };
    let Some(request_type) = obj.get("type").and_then(Value::as_str) else {
        return err_response("unknown_type");
    };

    match dispatch(request_type, obj, state).await {
        Ok(mut body) => {
            if let Value::Object(map) = &mut body {
                map.entry("ok").or_insert(json!(true));
            }
            body
        }
        Err(code) => err_response(&code),
    }
}

fn err_response(code: &str) -> Value {
    json!({"ok": false, "error": code})
}

async fn dispatch<F, G, C>(request_type: &str, obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    match request_type {
        "ping" => Ok(json!({"type": "pong"})),
        "get_chat_history" => Ok(json!({"chat_history": state.chat_snapshot()})),
        "get_run_state" => handle_get_run_state(obj, state),
        "chat_message" => handle_chat_message(obj, state).await,
        "metrics_update" => handle_metrics_update(obj, state).await,
        "log_append" => handle_log_append(obj, state),
        "set_training_file" => handle_set_training_file(obj, state),
        "set_auto_mode" => handle_set_auto_mode(obj, state),
        "set_runtime" => handle_set_runtime(obj, state),
        "start_training" => handle_start_training(state).await,
        "apply_refactor" => handle_apply_refactor(obj, state).await,
        _ => Err("unknown_type".to_string()),
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn runtime_active(status: RuntimeStatus) -> bool {
    matches!(status, RuntimeStatus::Starting | RuntimeStatus::Running | RuntimeStatus::Recovering)
}

fn handle_get_run_state<F, G, C>(obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let log_tail = obj.get("log_tail").and_then(Value::as_u64).unwrap_or(200) as usize;
    let metric_tail = obj.get("metric_tail").and_then(Value::as_u64).unwrap_or(1) as usize;
    let snapshot = state.run_state.lock().snapshot(log_tail, metric_tail);
    serde_json::to_value(snapshot).map_err(|_| "internal_error".to_string())
}

async fn handle_chat_message<F, G, C>(obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let content = str_field(obj, "content").filter(|s| !s.trim().is_empty()).ok_or_else(|| "missing_content".to_string())?;
    state.push_chat("user", content);

    let context = run_context(state);
    let plan = state.supervisor.ask_agent(&context, content, None).await;
    state.push_chat("agent", plan.diagnosis.clone());

    Ok(json!({"response": plan, "chat_history": state.chat_snapshot()}))
}

async fn handle_metrics_update<F, G, C>(obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let metric = str_field(obj, "metric").ok_or_else(|| "missing_metric_or_value".to_string())?;
    let raw_value = obj.get("value").ok_or_else(|| "missing_metric_or_value".to_string())?;
    let value = raw_value
        .as_f64()
        .or_else(|| raw_value.as_str().and_then(|s| s.parse::<f64>().ok()))
        .ok_or_else(|| "invalid_value".to_string())?;
    let step = obj.get("step").and_then(Value::as_u64);

    let now = state.clock.now();
    let (alert, context) = {
        let mut run_state = state.run_state.lock();
        run_state.metrics.record(metric, value, step);
        let alert = state.rule_engine.lock().evaluate(&run_state.metrics, Some(metric), now);
        if let Some(alert) = &alert {
            run_state.alerts.push(alert.clone());
        }
        (alert, format!("training_file={} codebase_root={} runtime_status={:?}", run_state.training_file_path, run_state.codebase_root, run_state.runtime_status))
    };

    let Some(alert) = alert else {
        return Ok(json!({}));
    };

    let question = format!("Alert on {}: {}", alert.metric, alert.message);
    let plan = state.supervisor.ask_agent(&context, &question, Some(&alert)).await;

    Ok(json!({"alert": alert, "agent_response": plan}))
}

fn handle_log_append<F, G, C>(obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let line = str_field(obj, "line").ok_or_else(|| "missing_line".to_string())?;
    state.run_state.lock().logs.push(line);
    Ok(json!({}))
}

fn handle_set_training_file<F, G, C>(obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let path = str_field(obj, "path").ok_or_else(|| "missing_path".to_string())?;
    // Swapping the path does not touch any workload already running under the old one.
    state.run_state.lock().training_file_path = path.to_string();
    Ok(json!({}))
}

fn handle_set_auto_mode<F, G, C>(obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let enabled = obj.get("enabled").and_then(Value::as_bool).ok_or_else(|| "invalid_value".to_string())?;
    state.supervisor.set_auto_mode(enabled);
    Ok(json!({"auto_mode": enabled}))
}

fn handle_set_runtime<F, G, C>(obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let raw = str_field(obj, "runtime").ok_or_else(|| "invalid_value".to_string())?;
    let kind = match raw {
        "local" => RuntimeKind::Local,
        "remote" => RuntimeKind::Remote,
        "scaffold" => RuntimeKind::Scaffold,
        _ => return Err("invalid_value".to_string()),
    };
    if runtime_active(state.run_state.lock().runtime_status) {
        return Err("runtime_control_unavailable".to_string());
    }
    state.supervisor.set_runtime_kind(kind);
    Ok(json!({"runtime": raw}))
}

async fn handle_start_training<F, G, C>(state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    if runtime_active(state.run_state.lock().runtime_status) {
        return Err("training_control_unavailable".to_string());
    }
    state.supervisor.start().await.map_err(|e| format!("failed_to_start_training: {e}"))?;
    Ok(json!({}))
}

async fn handle_apply_refactor<F, G, C>(obj: &Map<String, Value>, state: &AppState<F, G, C>) -> Result<Value, String>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let code_changes = str_field(obj, "code_changes").filter(|s| !s.trim().is_empty()).ok_or_else(|| "missing_code_changes".to_string())?;
    let diagnosis = str_field(obj, "diagnosis").unwrap_or("").to_string();
    let raw_output = str_field(obj, "raw_output").unwrap_or("").to_string();
    let action = match str_field(obj, "action") {
        Some("explain") => AgentAction::Explain,
        _ => AgentAction::Refactor,
    };
    let plan = Plan { diagnosis, action, code_changes: code_changes.to_string(), raw_output };

    let result = state.supervisor.apply_plan(&plan).await;

    let summary = if result.success {
        sv_engine::summarize_diff(&plan.code_changes)
    } else {
        result.error.clone().unwrap_or_else(|| "refactor failed".to_string())
    };
    state.push_chat("agent", summary);

    Ok(json!({
        "success": result.success,
        "checkpoint_id": result.checkpoint_id,
        "error": result.error,
        "chat_history": state.chat_snapshot(),
    }))
}

fn run_context<F, G, C>(state: &AppState<F, G, C>) -> String
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let run_state = state.run_state.lock();
    format!("training_file={} codebase_root={} runtime_status={:?}", run_state.training_file_path, run_state.codebase_root, run_state.runtime_status)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sv_adapters::agent::FakeAgent;
    use sv_adapters::{Plan as AdapterPlan, RuntimeAdapter, RuntimeError, SharedCallbacks};
    use sv_core::{Alert as CoreAlert, FakeClock, RuleEngine, RunState};
    use sv_engine::{AdapterFactory, GuardedExecutor, OomPolicyConfig, SupervisorConfig};
    use sv_storage::CheckpointStore;
    use tempfile::tempdir;

    use super::*;
    use crate::chat::ChatEntry;

    /// Never actually builds an adapter; `start_training` isn't exercised here.
    #[derive(Default)]
    struct UnreachableAdapterFactory;

    #[async_trait]
    impl AdapterFactory for UnreachableAdapterFactory {
        async fn build(&self, _kind: RuntimeKind, _callbacks: SharedCallbacks, _env_overrides: HashMap<String, String>) -> Result<Arc<dyn RuntimeAdapter>, RuntimeError> {
            Err(RuntimeError::NotReady("no runtime configured in this test".to_string()))
        }
    }

    fn fake_state() -> AppState<UnreachableAdapterFactory, FakeAgent, FakeClock> {
        let dir = tempdir().unwrap();
        let run_state = Arc::new(Mutex::new(RunState::new("train.py", ".")));
        let clock = FakeClock::new(0.0);
        let checkpoints = CheckpointStore::new(dir.path().join("checkpoints"));
        let guarded_executor = GuardedExecutor::new(checkpoints);
        let config = SupervisorConfig {
            max_runtime_retries: 3,
            retry_backoff_secs: 1.0,
            retry_backoff_max_secs: 10.0,
            heartbeat_timeout_secs: 30.0,
            oom_policy: OomPolicyConfig {
                enabled: true,
                min_batch_size: 1,
                default_batch_size: 32,
                max_grad_accum: 64,
                min_seq_len: 128,
                batch_env_keys: vec!["BATCH".to_string()],
                accum_env_keys: vec!["GRAD_ACCUM".to_string()],
                seq_env_keys: vec!["SEQ_LEN".to_string()],
            },
        };
        let supervisor = sv_engine::Supervisor::new(
            UnreachableAdapterFactory,
            FakeAgent::new(AdapterPlan::fallback("Test", "no diagnosis configured")),
            clock.clone(),
            guarded_executor,
            Arc::clone(&run_state),
            config,
            RuntimeKind::Scaffold,
            false,
        );
        AppState {
            run_state,
            rule_engine: Arc::new(Mutex::new(RuleEngine::default())),
            chat_history: Arc::new(Mutex::new(Vec::<ChatEntry>::new())),
            supervisor,
            clock,
        }
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let state = fake_state();
        let response = handle_line(r#"{"type": "ping"}"#, &state).await;
        assert_eq!(response["ok"], json!(true));
        assert_eq!(response["type"], json!("pong"));
    }

    #[tokio::test]
    async fn invalid_json_is_reported() {
        let state = fake_state();
        let response = handle_line("not json", &state).await;
        assert_eq!(response["error"], json!("invalid_json"));
    }

    #[tokio::test]
    async fn unknown_type_is_reported() {
        let state = fake_state();
        let response = handle_line(r#"{"type": "does_not_exist"}"#, &state).await;
        assert_eq!(response["error"], json!("unknown_type"));
    }

    #[tokio::test]
    async fn chat_message_requires_content() {
        let state = fake_state();
        let response = handle_line(r#"{"type": "chat_message"}"#, &state).await;
        assert_eq!(response["error"], json!("missing_content"));
    }

    #[tokio::test]
    async fn metrics_update_records_and_may_alert() {
        let state = fake_state();
        let response = handle_line(r#"{"type": "metrics_update", "metric": "loss", "value": 1.0, "step": 1}"#, &state).await;
        assert_eq!(response["ok"], json!(true));
        assert_eq!(state.run_state.lock().metrics.current_step(), 1);
    }

    #[tokio::test]
    async fn log_append_requires_line() {
        let state = fake_state();
        let response = handle_line(r#"{"type": "log_append"}"#, &state).await;
        assert_eq!(response["error"], json!("missing_line"));
    }

    #[tokio::test]
    async fn set_auto_mode_flips_supervisor_flag() {
        let state = fake_state();
        let response = handle_line(r#"{"type": "set_auto_mode", "enabled": true}"#, &state).await;
        assert_eq!(response["ok"], json!(true));
        assert!(state.supervisor.auto_mode());
    }

    #[tokio::test]
    async fn set_runtime_rejects_unknown_kind() {
        let state = fake_state();
        let response = handle_line(r#"{"type": "set_runtime", "runtime": "quantum"}"#, &state).await;
        assert_eq!(response["error"], json!("invalid_value"));
    }

    #[tokio::test]
    async fn apply_refactor_requires_code_changes() {
        let state = fake_state();
        let response = handle_line(r#"{"type": "apply_refactor", "diagnosis": "d"}"#, &state).await;
        assert_eq!(response["error"], json!("missing_code_changes"));
    }

    #[test]
    fn unused_import_guard() {
        let _ = CoreAlert::new("m", 1.0, 1.0, "msg", 0.0);
    }
}
