// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the concrete runtime adapter the supervisor asks for, given a
//! backend kind. Keeps `sv-engine` ignorant of any concrete remote sandbox
//! client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sv_adapters::{LocalAdapter, LocalAdapterConfig, RuntimeAdapter, RuntimeError, ScaffoldAdapter, SharedCallbacks};
use sv_core::RuntimeKind;
use sv_engine::AdapterFactory;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct DaemonAdapterFactory {
    codebase_root: String,
    training_file: String,
    interpreter: String,
    explicit_command: Option<String>,
    socket_path: String,
    run_dir: String,
}

impl DaemonAdapterFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            codebase_root: config.codebase_root.display().to_string(),
            training_file: config.training_file.clone(),
            interpreter: config.interpreter.clone(),
            explicit_command: config.training_cmd.clone(),
            socket_path: config.socket_path.display().to_string(),
            run_dir: config.run_dir.display().to_string(),
        }
    }

    fn local_config(&self, env_overrides: HashMap<String, String>) -> LocalAdapterConfig {
        LocalAdapterConfig {
            codebase_root: self.codebase_root.clone().into(),
            training_file: self.training_file.clone(),
            interpreter: self.interpreter.clone(),
            explicit_command: self.explicit_command.clone(),
            socket_path: self.socket_path.clone(),
            run_dir: self.run_dir.clone(),
            env_overrides: env_overrides.into_iter().collect(),
            scaffold_mode: None,
        }
    }
}

#[async_trait]
impl AdapterFactory for DaemonAdapterFactory {
    async fn build(&self, kind: RuntimeKind, callbacks: SharedCallbacks, env_overrides: HashMap<String, String>) -> Result<Arc<dyn RuntimeAdapter>, RuntimeError> {
        match kind {
            RuntimeKind::Local => Ok(Arc::new(LocalAdapter::new(self.local_config(env_overrides), callbacks))),
            RuntimeKind::Scaffold => Ok(Arc::new(ScaffoldAdapter::new(self.local_config(env_overrides), callbacks))),
            // No remote sandbox client is wired into this build; switching to
            // `remote` fails fast rather than silently falling back to local.
            RuntimeKind::Remote => Err(RuntimeError::NotReady("remote runtime has no sandbox client configured in this build".to_string())),
        }
    }
}
