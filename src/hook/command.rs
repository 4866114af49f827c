//! Hooks implemented by external commands.
//!
//! The command runs under `sh -c` with the hook input as JSON on stdin.
//! Exit codes:
//! - 0: continue. For prompt submission, stdout is injected after the prompt.
//! - 2: block the prompt, deny the tool, or feed stderr back after the tool ran.
//! - Other: warn and continue.
//!
//! Stdout that starts with `{` is instead parsed as the full output record.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{
    Hook, HookEvent, PostToolUseInput, PostToolUseOutput, PreToolUseInput, PreToolUseOutput,
    PromptSubmitInput, PromptSubmitOutput,
};
use crate::error::{WeaveError, WeaveResult};
use crate::session::SessionState;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CommandHook {
    event: HookEvent,
    command: String,
    tool_pattern: Option<Regex>,
    timeout: Duration,
}

struct Execution {
    code: i32,
    stdout: String,
    stderr: String,
}

impl CommandHook {
    pub fn new(event: HookEvent, command: impl Into<String>) -> Self {
        Self {
            event,
            command: command.into(),
            tool_pattern: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Only run for tools whose name matches `pattern`.
    pub fn with_tool_pattern(mut self, pattern: &str) -> WeaveResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| WeaveError::Config(format!("invalid tool pattern {pattern:?}: {e}")))?;
        self.tool_pattern = Some(regex);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn event(&self) -> HookEvent {
        self.event
    }

    fn matches_tool(&self, tool_name: &str) -> bool {
        self.tool_pattern
            .as_ref()
            .map(|re| re.is_match(tool_name))
            .unwrap_or(true)
    }

    /// Run the command. `None` when it could not run to completion.
    async fn execute(&self, input: &impl Serialize) -> WeaveResult<Option<Execution>> {
        let input = serde_json::to_string(input)?;

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                warn!(command = %self.command, "Failed to spawn hook: {}", e);
                return Ok(None);
            }
        };

        // Feed stdin while collecting output; both count against the timeout.
        let stdin = child.stdin.take();
        let command = &self.command;
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    warn!(command = %command, "Failed to write to hook stdin: {}", e);
                }
            }
        };
        let run = async move {
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output
        };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(command = %self.command, "Hook execution failed: {}", e);
                return Ok(None);
            }
            Err(_) => {
                warn!(
                    command = %self.command,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Hook timed out"
                );
                return Ok(None);
            }
        };

        let execution = Execution {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        debug!(
            command = %self.command,
            exit_code = execution.code,
            stdout_len = execution.stdout.len(),
            "Hook execution complete"
        );
        Ok(Some(execution))
    }

    fn warn_exit(&self, execution: &Execution) {
        let message = if execution.stderr.is_empty() {
            format!("Hook exited with code {}", execution.code)
        } else {
            execution.stderr.clone()
        };
        warn!(command = %self.command, exit_code = execution.code, "{}", message);
    }
}

impl Execution {
    /// The output record, when stdout is one.
    fn record<T: DeserializeOwned>(&self, command: &str) -> Option<WeaveResult<T>> {
        let stdout = self.stdout.trim_start();
        if !stdout.starts_with('{') {
            return None;
        }
        Some(serde_json::from_str(stdout).map_err(|e| WeaveError::Hook {
            hook: command.to_string(),
            message: format!("invalid output: {e}"),
        }))
    }
}

#[async_trait]
impl Hook for CommandHook {
    fn name(&self) -> &str {
        &self.command
    }

    async fn on_prompt_submit(
        &self,
        input: &PromptSubmitInput,
        _state: &mut SessionState,
    ) -> WeaveResult<PromptSubmitOutput> {
        if self.event != HookEvent::UserPromptSubmit {
            return Ok(PromptSubmitOutput::default());
        }
        let Some(execution) = self.execute(input).await? else {
            return Ok(PromptSubmitOutput::default());
        };
        if let Some(record) = execution.record(&self.command) {
            return record;
        }
        Ok(match execution.code {
            0 => {
                let context = execution.stdout.trim_end();
                if context.is_empty() {
                    PromptSubmitOutput::default()
                } else {
                    PromptSubmitOutput::context(context)
                }
            }
            2 => PromptSubmitOutput::block(execution.stderr),
            _ => {
                self.warn_exit(&execution);
                PromptSubmitOutput::default()
            }
        })
    }

    async fn before_tool_use(
        &self,
        input: &PreToolUseInput,
        _state: &mut SessionState,
    ) -> WeaveResult<PreToolUseOutput> {
        if self.event != HookEvent::PreToolUse || !self.matches_tool(&input.tool_name) {
            return Ok(PreToolUseOutput::default());
        }
        let Some(execution) = self.execute(input).await? else {
            return Ok(PreToolUseOutput::default());
        };
        if let Some(record) = execution.record(&self.command) {
            return record;
        }
        Ok(match execution.code {
            0 => PreToolUseOutput::default(),
            2 => PreToolUseOutput::deny(format!("[{}]: {}", self.command, execution.stderr)),
            _ => {
                self.warn_exit(&execution);
                PreToolUseOutput::default()
            }
        })
    }

    async fn after_tool_use(
        &self,
        input: &PostToolUseInput,
        _state: &mut SessionState,
    ) -> WeaveResult<PostToolUseOutput> {
        if self.event != HookEvent::PostToolUse || !self.matches_tool(&input.tool_name) {
            return Ok(PostToolUseOutput::default());
        }
        let Some(execution) = self.execute(input).await? else {
            return Ok(PostToolUseOutput::default());
        };
        if let Some(record) = execution.record(&self.command) {
            return record;
        }
        Ok(match execution.code {
            0 => PostToolUseOutput::default(),
            2 => PostToolUseOutput::block(execution.stderr),
            _ => {
                self.warn_exit(&execution);
                PostToolUseOutput::default()
            }
        })
    }
}
