// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The production `DiagnosingAgent`: hands context/question/alert to an
//! external process over stdin and reads its `Plan` verdict back from
//! stdout. The process's own reasoning is out of scope here — this is
//! only the call/response transport.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sv_core::Alert;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{DiagnosingAgent, Plan};

#[derive(Debug, Clone)]
pub struct ProcessAgentConfig {
    /// Shell-quoted command line, e.g. `"/usr/local/bin/diagnose --json"`.
    pub command: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
enum AgentCallError {
    #[error("invalid agent command: {0}")]
    Command(String),
    #[error("failed to run agent process: {0}")]
    Io(#[from] std::io::Error),
    #[error("agent process timed out")]
    Timeout,
    #[error("agent process produced an invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct AgentRequest<'a> {
    context: &'a str,
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<&'a Alert>,
}

/// Spawns `config.command` fresh for every call, writes a JSON request line
/// to its stdin, and parses one JSON `Plan` from its stdout.
pub struct ProcessAgent {
    config: ProcessAgentConfig,
}

impl ProcessAgent {
    pub fn new(config: ProcessAgentConfig) -> Self {
        Self { config }
    }

    async fn call(&self, context: &str, question: &str, alert: Option<&Alert>) -> Result<Plan, AgentCallError> {
        let argv = shell_words::split(&self.config.command).map_err(|e| AgentCallError::Command(e.to_string()))?;
        let (program, args) = argv.split_first().ok_or_else(|| AgentCallError::Command("empty agent command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let request = AgentRequest { context, question, alert };
        let payload = serde_json::to_vec(&request)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            stdin.write_all(b"\n").await?;
        }

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentCallError::Timeout)??;

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl DiagnosingAgent for ProcessAgent {
    async fn respond(&self, context: &str, question: &str, alert: Option<&Alert>) -> Plan {
        match self.call(context, question, alert).await {
            Ok(plan) => plan,
            Err(e) => Plan::fallback("AgentProcessError", &e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_explain_when_command_is_empty() {
        let agent = ProcessAgent::new(ProcessAgentConfig { command: String::new(), timeout: Duration::from_secs(1) });
        let plan = agent.respond("ctx", "why is loss rising", None).await;
        assert_eq!(plan.action, super::super::AgentAction::Explain);
        assert!(plan.diagnosis.contains("AgentProcessError"));
    }

    #[tokio::test]
    async fn falls_back_to_explain_when_command_is_not_found() {
        let agent = ProcessAgent::new(ProcessAgentConfig {
            command: "sv-agent-binary-that-does-not-exist".to_string(),
            timeout: Duration::from_secs(1),
        });
        let plan = agent.respond("ctx", "why is loss rising", None).await;
        assert_eq!(plan.action, super::super::AgentAction::Explain);
    }

    #[tokio::test]
    async fn parses_plan_from_stdout() {
        let agent = ProcessAgent::new(ProcessAgentConfig {
            command: r#"/bin/sh -c "cat >/dev/null; printf '{\"diagnosis\":\"loss spike\",\"action\":\"explain\",\"code_changes\":\"\",\"raw_output\":\"ok\"}'""#.to_string(),
            timeout: Duration::from_secs(2),
        });
        let plan = agent.respond("ctx", "why", None).await;
        assert_eq!(plan.diagnosis, "loss spike");
        assert_eq!(plan.raw_output, "ok");
    }
}
