// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory chat transcript surfaced by `get_chat_history`.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ChatEntry {
    pub sender: String,
    pub content: String,
    pub timestamp: f64,
}

impl ChatEntry {
    pub fn new(sender: impl Into<String>, content: impl Into<String>, timestamp: f64) -> Self {
        Self { sender: sender.into(), content: content.into(), timestamp }
    }
}
