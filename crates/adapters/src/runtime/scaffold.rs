// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scaffold backend: identical to `Local` but records a `mode=scaffold-local`
//! metadatum and announces it in the log stream. Shares `LocalAdapter`'s
//! process-spawning code by composition rather than inheritance.

use async_trait::async_trait;

use super::local::{LocalAdapter, LocalAdapterConfig};
use super::{RuntimeAdapter, RuntimeError, RuntimeStartResult, SharedCallbacks};

pub struct ScaffoldAdapter {
    inner: LocalAdapter,
}

impl ScaffoldAdapter {
    pub fn new(mut config: LocalAdapterConfig, callbacks: SharedCallbacks) -> Self {
        config.scaffold_mode = Some("scaffold-local");
        Self {
            inner: LocalAdapter::new(config, callbacks),
        }
    }
}

#[async_trait]
impl RuntimeAdapter for ScaffoldAdapter {
    async fn start(&self) -> Result<RuntimeStartResult, RuntimeError> {
        self.inner.start().await
    }

    async fn stop(&self) {
        self.inner.stop().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
