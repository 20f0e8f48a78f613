// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake runtime adapter for deterministic supervisor tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use super::{RuntimeAdapter, RuntimeError, RuntimeFailure, RuntimeStartResult, SharedCallbacks};

#[derive(Debug, Clone)]
pub enum FakeRuntimeCall {
    Start,
    Stop,
    Close,
}

/// Programmatically controlled adapter: tests call `emit_log`/`emit_failure`
/// etc. directly instead of waiting on a real process.
#[derive(Clone)]
pub struct FakeRuntimeAdapter {
    callbacks: SharedCallbacks,
    calls: Arc<Mutex<Vec<FakeRuntimeCall>>>,
    start_result: Arc<Mutex<Result<RuntimeStartResult, String>>>,
}

impl FakeRuntimeAdapter {
    pub fn new(callbacks: SharedCallbacks) -> Self {
        Self {
            callbacks,
            calls: Arc::new(Mutex::new(Vec::new())),
            start_result: Arc::new(Mutex::new(Ok(RuntimeStartResult { runtime_id: "fake-runtime".to_string() }))),
        }
    }

    pub fn calls(&self) -> Vec<FakeRuntimeCall> {
        self.calls.lock().clone()
    }

    pub fn set_start_error(&self, message: impl Into<String>) {
        *self.start_result.lock() = Err(message.into());
    }

    pub async fn emit_log(&self, line: &str) {
        self.callbacks.on_log(line).await;
    }

    pub async fn emit_heartbeat(&self) {
        self.callbacks.on_heartbeat().await;
    }

    pub async fn emit_failure(&self, failure: RuntimeFailure) {
        self.callbacks.on_failure(failure).await;
    }

    pub async fn emit_complete(&self, status: &str) {
        self.callbacks.on_complete(status).await;
    }
}

#[async_trait]
impl RuntimeAdapter for FakeRuntimeAdapter {
    async fn start(&self) -> Result<RuntimeStartResult, RuntimeError> {
        self.calls.lock().push(FakeRuntimeCall::Start);
        self.start_result.lock().clone().map_err(RuntimeError::SpawnFailed)
    }

    async fn stop(&self) {
        self.calls.lock().push(FakeRuntimeCall::Stop);
    }

    async fn close(&self) {
        self.calls.lock().push(FakeRuntimeCall::Close);
    }
}
