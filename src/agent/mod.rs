//! The agent loop.
//!
//! An [`Engine`] drives one agent of a [`Session`] at a time: call the model, log the
//! turn, dispatch tool calls through the hook pipeline and the callback delegate,
//! and stop at an utterance every attached monitor accepts. Sub-agents, judges and
//! delegates are driven by the same loop, re-entered through [`Engine::respond`].

mod delegate;
mod intrinsics;
mod monitor;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::callback::{ShellRunner, ToolResultKind};
use crate::config::EngineConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::hook::{
    HookContext, HookPipeline, PostToolUseInput, PreToolUseInput, PromptSubmitInput,
};
use crate::permission::{AskHandler, AutoDenyHandler, PermissionDecision};
use crate::provenance::{Cause, CauseRef, Provenance, ProvenanceString};
use crate::provider::{complete_with_retry, LanguageModel};
use crate::session::{AgentState, NewAgent, Session};
use crate::tool::{ToolOutput, ToolRegistry};
use crate::types::*;

pub use intrinsics::{DISCUSS, HOOK, TASK};
pub use monitor::{JudgeMonitor, ResponseMonitor, Verdict, JUDGE_NAME, JUDGE_SYSTEM};

/// Boxed future used where the loop re-enters itself.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of [`Engine::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// A prompt-submit hook refused the prompt; nothing was appended.
    Blocked { reason: String },
    Responded(ProvenanceString),
}

/// The engine. Cheap to clone; nested runs use scoped clones.
#[derive(Clone)]
pub struct Engine {
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    hooks: Arc<HookPipeline>,
    ask: Arc<dyn AskHandler>,
    monitor: Arc<dyn ResponseMonitor>,
    config: Arc<EngineConfig>,
    shell: ShellRunner,
    /// Offer `task`, `discuss` and `hook` besides the registry
    intrinsics: bool,
}

/// One dispatched tool call, before it is logged.
struct CallOutcome {
    output: ToolOutput,
    provenance: Provenance,
    stop_reasons: Vec<String>,
    halt: bool,
}

impl CallOutcome {
    fn new(output: ToolOutput) -> Self {
        Self {
            output,
            provenance: Provenance::Novel,
            stop_reasons: Vec::new(),
            halt: false,
        }
    }

    /// Record a merged `continue`/`stopReason` pair.
    fn stop(&mut self, continue_: bool, reason: Option<&str>) {
        if continue_ {
            return;
        }
        self.halt = true;
        if let Some(reason) = reason.filter(|r| !r.is_empty()) {
            self.stop_reasons.push(reason.to_string());
        }
    }
}

impl Engine {
    pub fn new(model: Arc<dyn LanguageModel>, tools: ToolRegistry) -> Self {
        let config = EngineConfig::default();
        Self {
            model,
            tools,
            hooks: Arc::new(HookPipeline::new()),
            ask: Arc::new(AutoDenyHandler),
            monitor: Arc::new(JudgeMonitor),
            shell: config.shell.runner(),
            config: Arc::new(config),
            intrinsics: true,
        }
    }

    /// An engine whose hook pipeline is built from `config`.
    pub fn from_config(
        model: Arc<dyn LanguageModel>,
        tools: ToolRegistry,
        config: EngineConfig,
    ) -> WeaveResult<Self> {
        let hooks = config.hook_pipeline()?;
        Ok(Self::new(model, tools).with_config(config).with_hooks(hooks))
    }

    /// Replace the configuration. The hook pipeline is left alone.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.shell = config.shell.runner();
        self.config = Arc::new(config);
        self
    }

    pub fn with_hooks(mut self, hooks: HookPipeline) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_ask_handler(mut self, ask: Arc<dyn AskHandler>) -> Self {
        self.ask = ask;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn ResponseMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Only offer registry tools.
    pub fn without_intrinsics(mut self) -> Self {
        self.intrinsics = false;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    /// Same engine, restricted to `tools` and without built-ins.
    pub(crate) fn scoped(&self, tools: ToolRegistry) -> Self {
        Self {
            tools,
            intrinsics: false,
            ..self.clone()
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = self.tools.definitions();
        if self.intrinsics {
            definitions.extend(intrinsics::definitions());
        }
        definitions
    }

    /// The interlocutor of `session`, created with the configured model and system
    /// prompt if the session has none yet.
    pub fn start(&self, session: &mut Session, name: &str) -> WeaveResult<AgentId> {
        if let Some(agent) = session.interlocutor() {
            return Ok(agent);
        }
        let agent = session.create_agent(NewAgent::interlocutor(name, self.config.model.clone()))?;
        if let Some(system) = &self.config.system_prompt {
            session.append(agent, TranscriptEntry::system(system.clone()), Provenance::Novel)?;
        }
        Ok(agent)
    }

    /// Log what the human typed, run prompt-submit hooks and let `agent` respond.
    pub async fn submit(
        &self,
        session: &mut Session,
        agent: AgentId,
        prompt: &str,
    ) -> WeaveResult<Submission> {
        let said = session.user_says(prompt)?;
        let context = HookContext::new(session.id(), session.path());
        let input = PromptSubmitInput::new(context, prompt);
        let output = self
            .hooks
            .run_prompt_submit(&input, session.state_mut())
            .await;

        if output.is_blocked() {
            let reason = output.block_message();
            info!(agent = %agent, reason = %reason, "prompt blocked by hook");
            return Ok(Submission::Blocked { reason });
        }

        let specific = output.hook_specific_output;
        let pre = specific
            .additional_context_pre
            .map(|c| c.texts().to_vec())
            .unwrap_or_default();
        let post = specific
            .additional_context
            .map(|c| c.texts().to_vec())
            .unwrap_or_default();
        let message = if pre.is_empty() && post.is_empty() {
            said
        } else {
            let mut parts = pre;
            parts.push(said.as_str().to_string());
            parts.extend(post);
            let cause = said.substance().map(Cause::from);
            match cause {
                Some(cause) => ProvenanceString::caused(parts.join("\n"), cause),
                None => ProvenanceString::novel(parts.join("\n")),
            }
        };

        let reply = self.respond(session, agent, Some(message)).await?;
        Ok(Submission::Responded(reply))
    }

    /// Run `agent` until it produces an accepted utterance.
    ///
    /// `input`, when given, is appended first as a user entry. The returned value
    /// tracks the utterance; it is caused by the tool calls instead when a hook
    /// stopped the loop.
    pub fn respond<'a>(
        &'a self,
        session: &'a mut Session,
        agent: AgentId,
        input: Option<ProvenanceString>,
    ) -> BoxFuture<'a, WeaveResult<ProvenanceString>> {
        Box::pin(self.run(session, agent, input))
    }

    async fn run(
        &self,
        session: &mut Session,
        agent: AgentId,
        input: Option<ProvenanceString>,
    ) -> WeaveResult<ProvenanceString> {
        if let Some(input) = input {
            session.harken(agent, input)?;
        }

        let state = session.agent(agent)?;
        if state.transcript().iter().all(|e| e.role == Role::System) {
            return Err(WeaveError::Contract(format!(
                "Need at least one non-system message to respond to (agent {})",
                state.name()
            )));
        }

        let mut pending = resumable_calls(state);
        if let Some((id, calls)) = &pending {
            info!(agent = %state.log_id(), message_id = %id, calls = calls.len(), "resuming unanswered tool calls");
        }

        let definitions = self.tool_definitions();
        loop {
            if let Some((assistant_id, calls)) = pending.take() {
                if let Some(stopped) = self.dispatch(session, agent, assistant_id, calls).await? {
                    return Ok(stopped);
                }
            }

            let (model, system, transcript) = {
                let state = session.agent(agent)?;
                let (system, rest): (Vec<&TranscriptEntry>, Vec<&TranscriptEntry>) = state
                    .transcript()
                    .iter()
                    .partition(|e| e.role == Role::System);
                let system = system
                    .iter()
                    .map(|e| e.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let transcript: Vec<TranscriptEntry> = rest.into_iter().cloned().collect();
                (state.language_model().to_string(), system, transcript)
            };

            let turn = complete_with_retry(
                self.model.as_ref(),
                &self.config.retry,
                &model,
                &system,
                &transcript,
                &definitions,
            )
            .await;
            if let Some(usage) = &turn.usage {
                debug!(
                    agent = %agent,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "model turn"
                );
            }

            let entry = turn.into_entry();
            let calls = entry.tool_calls.clone();
            let text = entry.content.clone();
            let message_id = session.append(agent, entry, Provenance::Novel)?;

            if !calls.is_empty() {
                pending = Some((message_id, calls));
                continue;
            }

            match self.review(session, agent).await? {
                Some(reason) => {
                    info!(agent = %agent, message_id = %message_id, "utterance rejected by monitor");
                    session.harken(
                        agent,
                        ProvenanceString::caused(format!("<system>{reason}</system>"), message_id),
                    )?;
                }
                None => return Ok(ProvenanceString::tracked(text, message_id)),
            }
        }
    }

    /// Run the monitors of `agent` over its latest utterance; the first veto wins.
    async fn review(&self, session: &mut Session, agent: AgentId) -> WeaveResult<Option<String>> {
        let monitors = session.agent(agent)?.monitors().to_vec();
        for spec in &monitors {
            if let Verdict::Reject(reason) =
                self.monitor.review(self, session, agent, spec).await?
            {
                return Ok(Some(reason));
            }
        }
        Ok(None)
    }

    /// Dispatch one batch of tool calls in order and log their results. `Some` when a
    /// hook asked to stop.
    async fn dispatch(
        &self,
        session: &mut Session,
        agent: AgentId,
        assistant_id: MessageId,
        calls: Vec<ToolCallRequest>,
    ) -> WeaveResult<Option<ProvenanceString>> {
        let mut halt = false;
        let mut stop_reasons = Vec::new();
        let mut refs = Vec::with_capacity(calls.len());

        for call in calls {
            let call_ref = CauseRef::tool_call(assistant_id, call.id.clone());
            refs.push(call_ref.clone());
            debug!(agent = %agent, tool = %call.name, call_id = %call.id, "dispatching tool call");

            let outcome = self.dispatch_call(session, agent, &call, &call_ref).await?;
            halt |= outcome.halt;
            stop_reasons.extend(outcome.stop_reasons);

            let provenance = match outcome.provenance {
                Provenance::Novel => Provenance::Cause(call_ref.into()),
                other => other,
            };
            let entry =
                TranscriptEntry::tool_result(&call, outcome.output.text(), outcome.output.is_error);
            session.append_tool_result(agent, entry, provenance, assistant_id)?;
        }

        if !halt {
            return Ok(None);
        }
        let reason = if stop_reasons.is_empty() {
            "Stopped by hook".to_string()
        } else {
            stop_reasons.join("\n")
        };
        info!(agent = %agent, reason = %reason, "loop stopped by hook");
        Ok(Some(ProvenanceString::caused(reason, Cause::Many(refs))))
    }

    async fn dispatch_call(
        &self,
        session: &mut Session,
        agent: AgentId,
        call: &ToolCallRequest,
        call_ref: &CauseRef,
    ) -> WeaveResult<CallOutcome> {
        let context = HookContext::new(session.id(), session.path());
        let pre_input = PreToolUseInput::new(context.clone(), &call.name, call.arguments.clone());
        let pre = self
            .hooks
            .run_before_tool(&pre_input, session.state_mut())
            .await;

        let mut outcome = CallOutcome::new(ToolOutput::success(""));
        outcome.stop(pre.continue_, pre.stop_reason.as_deref());

        match pre.permission() {
            Some(PermissionDecision::Deny) => {
                let reason = pre.permission_reason().unwrap_or_default();
                info!(agent = %agent, tool = %call.name, reason, "tool call denied by hook");
                outcome.output = ToolOutput::error(format!(
                    "{} operation blocked by hook:\n- {}",
                    call.name, reason
                ));
                return Ok(outcome);
            }
            Some(PermissionDecision::Ask) => {
                let prompt = pre
                    .permission_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Allow {}?", call.name));
                if !self.ask.handle(&prompt, &call.name).await {
                    info!(agent = %agent, tool = %call.name, "tool call refused by user");
                    outcome.output = ToolOutput::error(format!(
                        "Permission denied by user for '{}'",
                        call.name
                    ));
                    return Ok(outcome);
                }
            }
            _ => {}
        }

        let (mut output, provenance) = self.invoke(session, agent, call, call_ref).await?;

        if !output.is_error {
            let post_input = PostToolUseInput::new(
                context,
                &call.name,
                call.arguments.clone(),
                Value::String(output.text()),
            );
            let post = self
                .hooks
                .run_after_tool(&post_input, session.state_mut())
                .await;
            outcome.stop(post.continue_, post.stop_reason.as_deref());
            if post.decision.is_some() {
                if let Some(reason) = post.reason.filter(|r| !r.is_empty()) {
                    output.blocks.push(reason);
                }
            }
        }

        outcome.output = output;
        outcome.provenance = provenance;
        Ok(outcome)
    }

    /// Run the tool and resolve any delegation in its result.
    async fn invoke(
        &self,
        session: &mut Session,
        agent: AgentId,
        call: &ToolCallRequest,
        call_ref: &CauseRef,
    ) -> WeaveResult<(ToolOutput, Provenance)> {
        if self.intrinsics && intrinsics::is_intrinsic(&call.name) {
            return match self.run_intrinsic(session, agent, call, call_ref).await {
                Ok(result) => {
                    let provenance = result.provenance().clone();
                    Ok((ToolOutput::success(result.into_string()), provenance))
                }
                Err(e @ (WeaveError::Contract(_) | WeaveError::Serialization(_))) => {
                    warn!(agent = %agent, tool = %call.name, "Built-in tool failed: {}", e);
                    Ok((ToolOutput::error(format!("Tool error: {e}")), Provenance::Novel))
                }
                Err(e) => Err(e),
            };
        }

        let Some(tool) = self.tools.get(&call.name) else {
            warn!(agent = %agent, tool = %call.name, "Unknown tool");
            return Ok((
                ToolOutput::error(format!("Unknown tool: {}", call.name)),
                Provenance::Novel,
            ));
        };
        let raw = match tool.execute(&call.id, call.arguments.clone()).await {
            Ok(output) => output,
            Err(e) => {
                warn!(agent = %agent, tool = %call.name, "Tool execution failed: {}", e);
                ToolOutput::error(format!("Tool error: {e}"))
            }
        };

        match ToolResultKind::classify(raw) {
            ToolResultKind::PlainText(output) => Ok((output, Provenance::Novel)),
            ToolResultKind::Agent(delegation) => {
                let reply = self
                    .run_agent_delegation(session, agent, call_ref, delegation)
                    .await?;
                let provenance = reply.provenance().clone();
                Ok((ToolOutput::success(reply.into_string()), provenance))
            }
            ToolResultKind::Shell(delegation) => {
                let (secs, timeout) = delegation.timeout(self.config.shell.default_timeout_secs);
                info!(agent = %agent, command = %delegation.command, timeout_secs = secs, "shell delegation");
                let output = match self.shell.run(&delegation.command, timeout).await
                {
                    Ok(outcome) => outcome.into_tool_output(secs),
                    Err(e) => ToolOutput::error(format!("Tool error: {e}")),
                };
                Ok((output, Provenance::Novel))
            }
            ToolResultKind::Plan(delegation) => {
                Ok((self.run_plan_delegation(session, delegation).await, Provenance::Novel))
            }
        }
    }
}

/// The last assistant turn's unanswered calls, with the turn's message id.
fn resumable_calls(state: &AgentState) -> Option<(MessageId, Vec<ToolCallRequest>)> {
    let calls = unanswered_tool_calls(state.transcript());
    if calls.is_empty() {
        return None;
    }
    let index = state
        .transcript()
        .iter()
        .rposition(|e| e.role == Role::Assistant)?;
    Some((state.message_id(index)?, calls))
}
