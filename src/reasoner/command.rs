//! LLM CLI reasoner: pipes the triage prompt into `<cmd> --print`.

use super::{ReasonerRequest, SemanticReasoner, build_reasoner_prompt};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CommandReasoner {
    cmd: String,
    extra_args: Vec<String>,
}

impl CommandReasoner {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before `--print`.
    pub fn with_args<S: AsRef<str>>(mut self, args: &[S]) -> Self {
        self.extra_args = args.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    pub fn command(&self) -> &str {
        &self.cmd
    }
}

#[async_trait]
impl SemanticReasoner for CommandReasoner {
    async fn reason(&self, request: &ReasonerRequest) -> anyhow::Result<String> {
        let prompt = build_reasoner_prompt(request);
        debug!(cmd = %self.cmd, prompt_len = prompt.len(), "invoking reasoner command");

        let mut cmd = Command::new(&self.cmd);
        cmd.args(&self.extra_args)
            .arg("--print")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            // The gateway timeout drops this future; the child must not outlive it.
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn reasoner '{}': {}", self.cmd, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to write prompt: {}", e))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to close stdin: {}", e))?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to get stdout"))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut output = String::new();
        while let Some(line) = lines.next_line().await? {
            output.push_str(&line);
            output.push('\n');
        }

        let status = child
            .wait()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to wait for reasoner: {}", e))?;
        if !status.success() {
            anyhow::bail!(
                "Reasoner process exited with code {}",
                status.code().unwrap_or(-1)
            );
        }

        Ok(output)
    }
}
