// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon context handed to every connection handler.

use std::sync::Arc;

use parking_lot::Mutex;
use sv_adapters::DiagnosingAgent;
use sv_core::{Clock, RuleEngine, RunState};
use sv_engine::{AdapterFactory, Supervisor};

use crate::chat::ChatEntry;

pub struct AppState<F, G, C> {
    pub run_state: Arc<Mutex<RunState>>,
    pub rule_engine: Arc<Mutex<RuleEngine>>,
    pub chat_history: Arc<Mutex<Vec<ChatEntry>>>,
    pub supervisor: Supervisor<F, G, C>,
    pub clock: C,
}

impl<F, G, C> Clone for AppState<F, G, C>
where
    C: Clone,
{
    fn clone(&self) -> Self {
        Self {
            run_state: Arc::clone(&self.run_state),
            rule_engine: Arc::clone(&self.rule_engine),
            chat_history: Arc::clone(&self.chat_history),
            supervisor: self.supervisor.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<F, G, C> AppState<F, G, C>
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    pub fn push_chat(&self, sender: &str, content: impl Into<String>) {
        let now = self.clock.now();
        self.chat_history.lock().push(ChatEntry::new(sender, content, now));
    }

    pub fn chat_snapshot(&self) -> Vec<ChatEntry> {
        self.chat_history.lock().clone()
    }
}
