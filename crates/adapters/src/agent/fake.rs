// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake diagnosing agent for deterministic tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use sv_core::Alert;

use super::{DiagnosingAgent, Plan};

/// Returns a pre-programmed `Plan` and records every call it received.
#[derive(Clone)]
pub struct FakeAgent {
    plan: Arc<Mutex<Plan>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeAgent {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan: Arc::new(Mutex::new(plan)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_plan(&self, plan: Plan) {
        *self.plan.lock() = plan;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DiagnosingAgent for FakeAgent {
    async fn respond(&self, _context: &str, question: &str, _alert: Option<&Alert>) -> Plan {
        self.calls.lock().push(question.to_string());
        self.plan.lock().clone()
    }
}
