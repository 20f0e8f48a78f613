// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sv-adapters: the runtime-backend and diagnosing-agent trait boundaries,
//! plus the Local/Remote/Scaffold implementations.

pub mod agent;
pub mod runtime;

pub use agent::{AgentAction, DiagnosingAgent, Plan, ProcessAgent, ProcessAgentConfig};
pub use runtime::{
    build_child_env, resolve_command, LocalAdapter, LocalAdapterConfig, RemoteAdapter,
    RemoteAdapterConfig, RuntimeAdapter, RuntimeCallbacks, RuntimeError, RuntimeFailure,
    RuntimeStartResult, ScaffoldAdapter, SharedCallbacks,
};
