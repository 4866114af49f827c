//! Policy hooks at three extension points.
//!
//! - `UserPromptSubmit`: before a human prompt reaches an agent. May block it or
//!   inject context around it.
//! - `PreToolUse`: before every tool call. Votes allow / ask / deny.
//! - `PostToolUse`: after every successful tool call. May attach a correction.
//!
//! Hooks run sequentially in registration order and may mutate the session-scoped
//! [`SessionState`]. Their outputs are merged by [`merge::Combine`].

pub mod builtin;
pub mod command;
pub mod merge;
pub mod output;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::WeaveResult;
use crate::session::SessionState;

pub use builtin::{PlanningModeHook, ReminderHook};
pub use command::CommandHook;
pub use merge::Combine;
pub use output::{
    BlockDecision, InjectedContext, LegacyDecision, PostToolUseOutput, PreToolUseOutput,
    PreToolUseSpecific, PromptSubmitOutput, PromptSubmitSpecific,
};

/// Extension point a hook runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEvent::UserPromptSubmit => write!(f, "UserPromptSubmit"),
            HookEvent::PreToolUse => write!(f, "PreToolUse"),
            HookEvent::PostToolUse => write!(f, "PostToolUse"),
        }
    }
}

/// Fields common to every hook input
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HookContext {
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: String,
}

impl HookContext {
    pub fn new(session_id: impl Into<String>, transcript_path: Option<&Path>) -> Self {
        Self {
            session_id: session_id.into(),
            transcript_path: transcript_path
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            cwd: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSubmitInput {
    #[serde(flatten)]
    pub context: HookContext,
    pub hook_event_name: HookEvent,
    pub prompt: String,
}

impl PromptSubmitInput {
    pub fn new(context: HookContext, prompt: impl Into<String>) -> Self {
        Self {
            context,
            hook_event_name: HookEvent::UserPromptSubmit,
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreToolUseInput {
    #[serde(flatten)]
    pub context: HookContext,
    pub hook_event_name: HookEvent,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
}

impl PreToolUseInput {
    pub fn new(context: HookContext, tool_name: impl Into<String>, tool_input: serde_json::Value) -> Self {
        Self {
            context,
            hook_event_name: HookEvent::PreToolUse,
            tool_name: tool_name.into(),
            tool_input,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostToolUseInput {
    #[serde(flatten)]
    pub context: HookContext,
    pub hook_event_name: HookEvent,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub tool_response: serde_json::Value,
}

impl PostToolUseInput {
    pub fn new(
        context: HookContext,
        tool_name: impl Into<String>,
        tool_input: serde_json::Value,
        tool_response: serde_json::Value,
    ) -> Self {
        Self {
            context,
            hook_event_name: HookEvent::PostToolUse,
            tool_name: tool_name.into(),
            tool_input,
            tool_response,
        }
    }
}

/// A policy hook. Implement only the extension points you care about; the
/// defaults are permissive no-ops.
///
/// An `Err` is logged and the hook's vote is dropped.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_prompt_submit(
        &self,
        _input: &PromptSubmitInput,
        _state: &mut SessionState,
    ) -> WeaveResult<PromptSubmitOutput> {
        Ok(PromptSubmitOutput::default())
    }

    async fn before_tool_use(
        &self,
        _input: &PreToolUseInput,
        _state: &mut SessionState,
    ) -> WeaveResult<PreToolUseOutput> {
        Ok(PreToolUseOutput::default())
    }

    async fn after_tool_use(
        &self,
        _input: &PostToolUseInput,
        _state: &mut SessionState,
    ) -> WeaveResult<PostToolUseOutput> {
        Ok(PostToolUseOutput::default())
    }
}

/// Ordered set of hooks; each run yields one merged output.
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn add(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn with(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub async fn run_prompt_submit(
        &self,
        input: &PromptSubmitInput,
        state: &mut SessionState,
    ) -> PromptSubmitOutput {
        let mut outputs = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            match hook.on_prompt_submit(input, state).await {
                Ok(output) => outputs.push(output),
                Err(e) => warn!(hook = hook.name(), event = %HookEvent::UserPromptSubmit, "Hook failed: {}", e),
            }
        }
        PromptSubmitOutput::combine(&outputs)
    }

    pub async fn run_before_tool(
        &self,
        input: &PreToolUseInput,
        state: &mut SessionState,
    ) -> PreToolUseOutput {
        let mut outputs = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            match hook.before_tool_use(input, state).await {
                Ok(output) => outputs.push(output),
                Err(e) => warn!(hook = hook.name(), event = %HookEvent::PreToolUse, tool = %input.tool_name, "Hook failed: {}", e),
            }
        }
        PreToolUseOutput::combine(&outputs)
    }

    pub async fn run_after_tool(
        &self,
        input: &PostToolUseInput,
        state: &mut SessionState,
    ) -> PostToolUseOutput {
        let mut outputs = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            match hook.after_tool_use(input, state).await {
                Ok(output) => outputs.push(output),
                Err(e) => warn!(hook = hook.name(), event = %HookEvent::PostToolUse, tool = %input.tool_name, "Hook failed: {}", e),
            }
        }
        PostToolUseOutput::combine(&outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WeaveError;
    use crate::permission::PermissionDecision;
    use serde_json::json;

    struct BlockBashHook;

    #[async_trait]
    impl Hook for BlockBashHook {
        fn name(&self) -> &str {
            "block_bash"
        }

        async fn before_tool_use(
            &self,
            input: &PreToolUseInput,
            _state: &mut SessionState,
        ) -> WeaveResult<PreToolUseOutput> {
            if input.tool_name == "bash" {
                Ok(PreToolUseOutput::deny("bash blocked by policy"))
            } else {
                Ok(PreToolUseOutput::default())
            }
        }
    }

    struct CountingHook;

    #[async_trait]
    impl Hook for CountingHook {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_prompt_submit(
            &self,
            _input: &PromptSubmitInput,
            state: &mut SessionState,
        ) -> WeaveResult<PromptSubmitOutput> {
            let n = state.count_prompt("counting");
            Ok(PromptSubmitOutput::context(format!("prompt #{n}")))
        }
    }

    struct BrokenHook;

    #[async_trait]
    impl Hook for BrokenHook {
        fn name(&self) -> &str {
            "broken"
        }

        async fn after_tool_use(
            &self,
            _input: &PostToolUseInput,
            _state: &mut SessionState,
        ) -> WeaveResult<PostToolUseOutput> {
            Err(WeaveError::Hook {
                hook: "broken".into(),
                message: "crashed".into(),
            })
        }
    }

    fn context() -> HookContext {
        HookContext {
            session_id: "s1".into(),
            transcript_path: "/tmp/s1.jsonl".into(),
            cwd: "/work".into(),
        }
    }

    #[test]
    fn input_wire_format() {
        let input = PreToolUseInput::new(context(), "read", json!({"path": "a.rs"}));
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({
                "session_id": "s1",
                "transcript_path": "/tmp/s1.jsonl",
                "cwd": "/work",
                "hook_event_name": "PreToolUse",
                "tool_name": "read",
                "tool_input": {"path": "a.rs"}
            })
        );
    }

    #[tokio::test]
    async fn empty_pipeline_is_permissive() {
        let pipeline = HookPipeline::new();
        let mut state = SessionState::new();
        let input = PreToolUseInput::new(context(), "bash", json!({}));
        let output = pipeline.run_before_tool(&input, &mut state).await;
        assert!(output.permission().is_none());
        assert!(output.continue_);
    }

    #[tokio::test]
    async fn deny_is_selective() {
        let pipeline = HookPipeline::new().with(BlockBashHook).with(CountingHook);
        let mut state = SessionState::new();

        let bash = PreToolUseInput::new(context(), "bash", json!({"command": "rm -rf /"}));
        let output = pipeline.run_before_tool(&bash, &mut state).await;
        assert_eq!(output.permission(), Some(PermissionDecision::Deny));
        assert_eq!(output.permission_reason(), Some("bash blocked by policy"));

        let read = PreToolUseInput::new(context(), "read", json!({}));
        let output = pipeline.run_before_tool(&read, &mut state).await;
        assert!(output.permission().is_none());
    }

    #[tokio::test]
    async fn hooks_share_session_state() {
        let pipeline = HookPipeline::new().with(CountingHook).with(CountingHook);
        let mut state = SessionState::new();
        let input = PromptSubmitInput::new(context(), "hi");
        let output = pipeline.run_prompt_submit(&input, &mut state).await;
        assert_eq!(
            output.hook_specific_output.additional_context,
            Some(InjectedContext::Many(vec!["prompt #1".into(), "prompt #2".into()]))
        );
        assert_eq!(state.prompt_count("counting"), 2);
    }

    #[tokio::test]
    async fn failing_hook_is_skipped() {
        let pipeline = HookPipeline::new().with(BrokenHook);
        let mut state = SessionState::new();
        let input = PostToolUseInput::new(context(), "read", json!({}), json!("ok"));
        let output = pipeline.run_after_tool(&input, &mut state).await;
        assert_eq!(output, PostToolUseOutput::default());
        assert_eq!(pipeline.names(), vec!["broken"]);
    }
}
