use tracing::{debug, info};

use super::Engine;
use crate::callback::{AgentDelegation, PlanDelegation, UserContent};
use crate::error::WeaveResult;
use crate::provenance::{Cause, CauseRef, Provenance, ProvenanceString};
use crate::provider::complete_with_retry;
use crate::session::{AgentRole, NewAgent, Party, Session};
use crate::tool::ToolOutput;
use crate::types::{AgentId, TranscriptEntry};

/// Name of nested agents whose delegation names no `subagent_type`.
const DEFAULT_DELEGATE: &str = "delegate";

impl Engine {
    /// Run a nested agent for `caller` and return its final utterance.
    pub(crate) async fn run_agent_delegation(
        &self,
        session: &mut Session,
        caller: AgentId,
        call_ref: &CauseRef,
        delegation: AgentDelegation,
    ) -> WeaveResult<ProvenanceString> {
        info!(agent = %caller, description = %delegation.callback_description, "agent delegation");

        let mut parts = Vec::with_capacity(delegation.user_content.len());
        let mut causes = vec![call_ref.clone()];
        for item in delegation.user_content {
            match item {
                UserContent::Text(text) => parts.push(text),
                UserContent::Predigest(item) => {
                    info!(agent = %caller, description = %item.digest_description, "predigesting");
                    let transcript = [TranscriptEntry::user(item.user_content.join("\n"))];
                    let turn = complete_with_retry(
                        self.model.as_ref(),
                        &self.config.retry,
                        &self.config.digest_model,
                        &item.system_content.join("\n"),
                        &transcript,
                        &[],
                    )
                    .await;
                    let digest = session.log_fragment(
                        Party::Agent(caller),
                        turn.text.unwrap_or_default(),
                        call_ref.clone(),
                    )?;
                    if let Some(id) = digest.substance() {
                        causes.push(CauseRef::Message(id));
                    }
                    parts.push(digest.into_string());
                }
            }
        }

        let name = delegation
            .subagent_type
            .unwrap_or_else(|| DEFAULT_DELEGATE.to_string());
        let model = session.agent(caller)?.language_model().to_string();
        let worker = session.create_agent(
            NewAgent::new(name, model, Party::Agent(caller), call_ref.clone())
                .with_role(AgentRole::Delegate),
        )?;
        if !delegation.system_content.is_empty() {
            session.append(
                worker,
                TranscriptEntry::system(delegation.system_content.join("\n")),
                Provenance::Cause(call_ref.clone().into()),
            )?;
        }

        let tools = match &delegation.tools {
            Some(names) => self.tools.subset(names),
            None => self.tools.clone(),
        };
        debug!(worker = %worker, tools = ?tools.names(), "running delegate");

        let cause = if causes.len() == 1 {
            Cause::One(call_ref.clone())
        } else {
            Cause::Many(causes)
        };
        let prompt = ProvenanceString::caused(parts.join("\n"), cause);
        self.scoped(tools).respond(session, worker, Some(prompt)).await
    }

    /// Put a plan to the human. Accepting leaves planning mode, rejecting enters it.
    pub(crate) async fn run_plan_delegation(
        &self,
        session: &mut Session,
        delegation: PlanDelegation,
    ) -> ToolOutput {
        let accepted = self.ask.review_plan(&delegation.plan).await;
        session.state_mut().planning_mode = !accepted;
        info!(accepted, "plan reviewed");
        if accepted {
            ToolOutput::success(delegation.text_on_accept)
        } else {
            ToolOutput::error(delegation.text_on_reject)
        }
    }
}
