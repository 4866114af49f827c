use async_trait::async_trait;

use super::{Hook, PromptSubmitInput, PromptSubmitOutput};
use crate::error::WeaveResult;
use crate::session::SessionState;

pub const PLAN_MODE_REMINDER: &str = "<system-reminder>Plan mode is turned on: the user doesn't want you to make any edits to the codebase,
or make changes.
Instead they want you to use put together a detailed plan for how you'll accomplish
the work asked of you. It's fine to use readonly tools like Grep, LS, Glob, Read,
as well as readonly Bash commands (including test runs and typechecks), and web searches.

When you're done, you should use ExitPlanMode to present your final high-quality plan to the user.

IMPORTANT: do not make changes to the codebase, and don't make project/config changes via Bash or other tools.
</system-reminder>
";

pub const TODO_REMINDER: &str = "<system-reminder>You haven't used the TodoWrite tool for a while.
It's a great way for you to stay on track when working on complex tasks.
Please consider using it if relevant.
</system-reminder>
";

/// Reminds the model of plan mode on every prompt while it is on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanningModeHook;

#[async_trait]
impl Hook for PlanningModeHook {
    fn name(&self) -> &str {
        "planning_mode"
    }

    async fn on_prompt_submit(
        &self,
        _input: &PromptSubmitInput,
        state: &mut SessionState,
    ) -> WeaveResult<PromptSubmitOutput> {
        if state.planning_mode {
            Ok(PromptSubmitOutput::context(PLAN_MODE_REMINDER))
        } else {
            Ok(PromptSubmitOutput::default())
        }
    }
}

/// Appends `text` to every `every`th prompt. Whatever the reminder is about can
/// restart the count with [`SessionState::reset_prompt_count`] on `key`.
#[derive(Debug, Clone)]
pub struct ReminderHook {
    key: String,
    every: u32,
    text: String,
}

impl ReminderHook {
    pub fn new(key: impl Into<String>, every: u32, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            every: every.max(1),
            text: text.into(),
        }
    }

    /// The TodoWrite nudge, every 10 prompts.
    pub fn todo() -> Self {
        Self::new("todo", 10, TODO_REMINDER)
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl Hook for ReminderHook {
    fn name(&self) -> &str {
        "reminder"
    }

    async fn on_prompt_submit(
        &self,
        _input: &PromptSubmitInput,
        state: &mut SessionState,
    ) -> WeaveResult<PromptSubmitOutput> {
        if state.count_prompt(&self.key) >= self.every {
            state.reset_prompt_count(&self.key);
            Ok(PromptSubmitOutput::context(self.text.clone()))
        } else {
            Ok(PromptSubmitOutput::default())
        }
    }
}
