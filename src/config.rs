//! Engine configuration, loaded from TOML. Every field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! model = "claude-sonnet-4-5"
//! digest_model = "claude-haiku-4-5"
//!
//! [retry]
//! initial_delay_ms = 1000
//! max_delay_ms = 60000
//!
//! [shell]
//! default_timeout_secs = 12.0
//!
//! [reminder]
//! every_prompts = 10
//!
//! [[hooks]]
//! event = "PreToolUse"
//! command = "./scripts/guard.sh"
//! tool_pattern = "^(write|edit)$"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::callback::{positive_duration, ShellRunner, DEFAULT_SHELL_TIMEOUT_SECS};
use crate::error::{WeaveError, WeaveResult};
use crate::hook::builtin::TODO_REMINDER;
use crate::hook::{CommandHook, HookEvent, HookPipeline, PlanningModeHook, ReminderHook};
use crate::provider::RetryConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model for every agent unless overridden
    pub model: String,
    /// Cheaper model for one-shot predigest completions
    pub digest_model: String,
    /// System prompt of the interlocutor
    pub system_prompt: Option<String>,
    /// Prepend the planning-mode reminder while planning mode is on
    pub planning_mode_hook: bool,
    pub retry: RetryConfig,
    pub shell: ShellConfig,
    /// Periodic reminder; absent disables it
    pub reminder: Option<ReminderConfig>,
    pub hooks: Vec<CommandHookConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".into(),
            digest_model: "claude-haiku-4-5".into(),
            system_prompt: None,
            planning_mode_hook: true,
            retry: RetryConfig::default(),
            shell: ShellConfig::default(),
            reminder: None,
            hooks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Per stream
    pub max_output_bytes: usize,
    /// Between SIGTERM and SIGKILL
    pub grace_period_ms: u64,
    /// For delegations that name no timeout
    pub default_timeout_secs: f64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 30_000,
            grace_period_ms: 5_000,
            default_timeout_secs: DEFAULT_SHELL_TIMEOUT_SECS,
        }
    }
}

impl ShellConfig {
    pub fn runner(&self) -> ShellRunner {
        ShellRunner::new(
            self.max_output_bytes,
            Duration::from_millis(self.grace_period_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub key: String,
    pub every_prompts: u32,
    pub text: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            key: "todo".into(),
            every_prompts: 10,
            text: TODO_REMINDER.into(),
        }
    }
}

/// An external command hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandHookConfig {
    pub event: HookEvent,
    pub command: String,
    /// Regex over tool names; tool events only
    #[serde(default)]
    pub tool_pattern: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl CommandHookConfig {
    pub fn build(&self) -> WeaveResult<CommandHook> {
        let mut hook = CommandHook::new(self.event, self.command.clone());
        if let Some(pattern) = &self.tool_pattern {
            hook = hook.with_tool_pattern(pattern)?;
        }
        if let Some(secs) = self.timeout_secs {
            let timeout = positive_duration(secs).ok_or_else(|| {
                WeaveError::Config(format!("hook '{}': invalid timeout_secs {secs}", self.command))
            })?;
            hook = hook.with_timeout(timeout);
        }
        Ok(hook)
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> WeaveResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> WeaveResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail once a turn is under way.
    pub fn validate(&self) -> WeaveResult<()> {
        if positive_duration(self.shell.default_timeout_secs).is_none() {
            return Err(WeaveError::Config(format!(
                "shell.default_timeout_secs must be a positive number of seconds, got {}",
                self.shell.default_timeout_secs
            )));
        }
        Ok(())
    }

    /// Built-in prompt hooks followed by the configured command hooks.
    pub fn hook_pipeline(&self) -> WeaveResult<HookPipeline> {
        let mut pipeline = HookPipeline::new();
        if self.planning_mode_hook {
            pipeline.add(Arc::new(PlanningModeHook));
        }
        if let Some(reminder) = &self.reminder {
            pipeline.add(Arc::new(ReminderHook::new(
                reminder.key.clone(),
                reminder.every_prompts,
                reminder.text.clone(),
            )));
        }
        for hook in &self.hooks {
            pipeline.add(Arc::new(hook.build()?));
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_all_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.shell.default_timeout_secs, 12.0);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.hook_pipeline().unwrap().names(), vec!["planning_mode"]);
    }

    #[test]
    fn full_config_parses() {
        let config = EngineConfig::from_toml_str(
            r#"
            model = "big"
            digest_model = "small"
            planning_mode_hook = false

            [retry]
            initial_delay_ms = 10

            [shell]
            grace_period_ms = 100

            [reminder]
            every_prompts = 3
            text = "check the todo list"

            [[hooks]]
            event = "PreToolUse"
            command = "exit 0"
            tool_pattern = "^bash$"
            timeout_secs = 2.5

            [[hooks]]
            event = "UserPromptSubmit"
            command = "date"
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "big");
        assert_eq!(config.retry.initial_delay_ms, 10);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.shell.grace_period_ms, 100);
        assert_eq!(config.shell.max_output_bytes, 30_000);
        let reminder = config.reminder.as_ref().unwrap();
        assert_eq!(reminder.every_prompts, 3);
        assert_eq!(reminder.key, "todo");
        assert_eq!(config.hooks.len(), 2);
        assert_eq!(config.hooks[0].event, HookEvent::PreToolUse);

        let pipeline = config.hook_pipeline().unwrap();
        assert_eq!(pipeline.names(), vec!["reminder", "exit 0", "date"]);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let err = EngineConfig::from_toml_str("model = 3").unwrap_err();
        assert!(matches!(err, WeaveError::Config(_)));

        let config = EngineConfig::from_toml_str(
            r#"
            [[hooks]]
            event = "PreToolUse"
            command = "true"
            tool_pattern = "("
            "#,
        )
        .unwrap();
        assert!(matches!(config.hook_pipeline(), Err(WeaveError::Config(_))));
    }

    #[test]
    fn shell_timeout_must_be_positive() {
        for bad in ["0.0", "-3.0", "1e30"] {
            let err = EngineConfig::from_toml_str(&format!("[shell]\ndefault_timeout_secs = {bad}\n"))
                .unwrap_err();
            assert!(matches!(err, WeaveError::Config(msg) if msg.contains("default_timeout_secs")));
        }
        let config = EngineConfig::from_toml_str("[shell]\ndefault_timeout_secs = 0.5\n").unwrap();
        assert_eq!(config.shell.default_timeout_secs, 0.5);

        let config = EngineConfig::from_toml_str(
            r#"
            [[hooks]]
            event = "PreToolUse"
            command = "true"
            timeout_secs = -1.0
            "#,
        )
        .unwrap();
        assert!(matches!(config.hook_pipeline(), Err(WeaveError::Config(_))));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weave.toml");
        std::fs::write(&path, "digest_model = \"tiny\"\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.digest_model, "tiny");
        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.toml")),
            Err(WeaveError::Io(_))
        ));
    }
}
