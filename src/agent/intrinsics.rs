//! Built-in tools every top-level agent gets: `task`, `discuss` and `hook`.
//!
//! They act on the session itself (creating sub-agents, chairing discussions,
//! attaching monitors), so they are handled by the engine rather than the
//! [`ToolRegistry`](crate::tool::ToolRegistry).

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::monitor::{JUDGE_NAME, JUDGE_SYSTEM};
use super::Engine;
use crate::error::{WeaveError, WeaveResult};
use crate::provenance::{Cause, CauseRef, Provenance, ProvenanceString};
use crate::session::{AgentRole, NewAgent, Party, Roster, Session};
use crate::types::{AgentId, ToolCallRequest, ToolDefinition, TranscriptEntry};

pub const TASK: &str = "task";
pub const DISCUSS: &str = "discuss";
pub const HOOK: &str = "hook";

const TASK_DESCRIPTION: &str = "Create a subagent: a new agent with its own system prompt and \
transcript that you can delegate work to. Give it a short unique name. With a user_prompt the \
subagent responds immediately and its reply is returned; without one it is only created. Talk to \
subagents later with the discuss tool.";

const DISCUSS_DESCRIPTION: &str = "Hold a discussion round among your subagents. Speakers respond \
in turn and every participant hears each reply; listeners only hear. Speakers and listeners are \
remembered between calls, so omit them to keep the previous round's roster. The first round lets \
every subagent speak. An optional prompt is heard by all participants before anyone speaks.";

const HOOK_DESCRIPTION: &str = "Attach a reviewer to your own responses. After each of your final \
responses the reviewer checks it against the instructions and can reject it, in which case you \
are told why and asked to respond again.";

pub(crate) fn is_intrinsic(name: &str) -> bool {
    matches!(name, TASK | DISCUSS | HOOK)
}

pub(crate) fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: TASK.into(),
            description: TASK_DESCRIPTION.into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Unique name of the subagent"},
                    "system_prompt": {"type": "string", "description": "System prompt of the subagent"},
                    "user_prompt": {"type": "string", "description": "First message to the subagent"}
                },
                "required": ["name", "system_prompt"]
            }),
        },
        ToolDefinition {
            name: DISCUSS.into(),
            description: DISCUSS_DESCRIPTION.into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "Said to every participant first"},
                    "speakers": {"type": "array", "items": {"type": "string"}},
                    "listeners": {"type": "array", "items": {"type": "string"}}
                }
            }),
        },
        ToolDefinition {
            name: HOOK.into(),
            description: HOOK_DESCRIPTION.into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "instructions": {"type": "string", "description": "What an acceptable response looks like"}
                },
                "required": ["instructions"]
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct TaskArgs {
    name: String,
    system_prompt: String,
    #[serde(default)]
    user_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscussArgs {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    speakers: Option<Vec<String>>,
    #[serde(default)]
    listeners: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct HookArgs {
    instructions: String,
}

#[derive(Serialize)]
struct TaskCreated {
    subagents: Vec<String>,
    status: String,
}

impl Engine {
    pub(crate) async fn run_intrinsic(
        &self,
        session: &mut Session,
        agent: AgentId,
        call: &ToolCallRequest,
        call_ref: &CauseRef,
    ) -> WeaveResult<ProvenanceString> {
        let args = call.arguments.clone();
        match call.name.as_str() {
            TASK => {
                self.task(session, agent, serde_json::from_value(args)?, call_ref)
                    .await
            }
            DISCUSS => {
                self.discuss(session, agent, serde_json::from_value(args)?, call_ref)
                    .await
            }
            HOOK => attach_monitor(session, agent, serde_json::from_value(args)?, call_ref),
            other => Err(WeaveError::Contract(format!("Unknown tool: {other}"))),
        }
    }

    async fn task(
        &self,
        session: &mut Session,
        agent: AgentId,
        args: TaskArgs,
        call_ref: &CauseRef,
    ) -> WeaveResult<ProvenanceString> {
        let model = session.agent(agent)?.language_model().to_string();
        let child = session.create_agent(
            NewAgent::new(&args.name, model, Party::Agent(agent), call_ref.clone())
                .with_role(AgentRole::Child),
        )?;
        session.append(
            child,
            TranscriptEntry::system(args.system_prompt),
            Provenance::Cause(Cause::many([call_ref.clone()])),
        )?;

        match args.user_prompt.filter(|p| !p.is_empty()) {
            Some(prompt) => {
                let prompt = session.log_fragment(Party::Agent(agent), prompt, call_ref.clone())?;
                self.respond(session, child, Some(prompt)).await
            }
            None => {
                let created = TaskCreated {
                    subagents: session.agent(agent)?.subagent_names(),
                    status: format!("Created subagent: {}", args.name),
                };
                Ok(ProvenanceString::novel(serde_json::to_string(&created)?))
            }
        }
    }

    async fn discuss(
        &self,
        session: &mut Session,
        agent: AgentId,
        args: DiscussArgs,
        call_ref: &CauseRef,
    ) -> WeaveResult<ProvenanceString> {
        let state = session.agent(agent)?;
        let available = state.subagent_names();
        let previous = state.roster().cloned();

        let known = |names: Vec<String>| -> Vec<String> {
            names.into_iter().filter(|n| available.contains(n)).collect()
        };
        let validate = |names: &[String]| -> WeaveResult<()> {
            match names.iter().find(|n| !available.contains(n)) {
                Some(unknown) => Err(WeaveError::Contract(format!(
                    "No subagent has name: {unknown}"
                ))),
                None => Ok(()),
            }
        };

        let speakers = match args.speakers {
            Some(requested) => {
                validate(&requested)?;
                requested
            }
            None => match &previous {
                Some(roster) => known(roster.speakers.clone()),
                None => available.clone(),
            },
        };
        if speakers.is_empty() {
            if available.is_empty() {
                return Err(WeaveError::Contract(
                    "No subagents available. Use the Task tool to create a subagent.".into(),
                ));
            }
            let quoted: Vec<String> = available.iter().map(|n| format!("\"{n}\"")).collect();
            return Err(WeaveError::Contract(format!(
                "No speakers specified. Available speakers: [{}]",
                quoted.join(", ")
            )));
        }

        let mut listeners = match args.listeners {
            Some(requested) => {
                validate(&requested)?;
                requested
            }
            None => known(previous.map(|r| r.listeners).unwrap_or_default()),
        };
        listeners.retain(|l| !speakers.contains(l));

        let resolve = |names: &[String]| -> Vec<(String, AgentId)> {
            names
                .iter()
                .filter_map(|n| state.subagent(n).map(|id| (n.clone(), id)))
                .collect()
        };
        let speaking = resolve(&speakers);
        let participants: Vec<(String, AgentId)> =
            speaking.iter().cloned().chain(resolve(&listeners)).collect();

        info!(agent = %state.log_id(), ?speakers, ?listeners, "discussion round");
        session.set_roster(
            agent,
            Roster {
                speakers: speakers.clone(),
                listeners: listeners.clone(),
            },
        )?;

        if let Some(prompt) = args.prompt.filter(|p| !p.is_empty()) {
            let prompt = session.log_fragment(Party::Agent(agent), prompt, call_ref.clone())?;
            for (_, id) in &participants {
                session.harken(*id, prompt.clone())?;
            }
        }

        if speaking.len() == 1 && listeners.is_empty() {
            let (_, speaker) = &speaking[0];
            let reply = self.respond(session, *speaker, None).await?;
            let refs = reply_refs(&reply);
            return Ok(ProvenanceString::caused(reply.into_string(), Cause::Many(refs)));
        }

        let mut replies = Vec::with_capacity(speaking.len());
        let mut refs = Vec::new();
        for (name, speaker) in &speaking {
            let reply = self.respond(session, *speaker, None).await?;
            refs.extend(reply_refs(&reply));
            let relayed = reply.map_value(|v| format!("[{name}]: {v}"));
            for (other_name, other) in &participants {
                if other_name != name {
                    session.harken(*other, relayed.clone())?;
                }
            }
            replies.push(relayed.into_string());
        }
        Ok(ProvenanceString::caused(replies.join("\n\n"), Cause::Many(refs)))
    }
}

/// What a reply stands on: the utterance it tracks, or what caused it.
fn reply_refs(reply: &ProvenanceString) -> Vec<CauseRef> {
    match reply.provenance() {
        Provenance::Substance(id) => vec![CauseRef::Message(*id)],
        Provenance::Cause(cause) => cause.refs().to_vec(),
        Provenance::Novel => Vec::new(),
    }
}

fn attach_monitor(
    session: &mut Session,
    agent: AgentId,
    args: HookArgs,
    call_ref: &CauseRef,
) -> WeaveResult<ProvenanceString> {
    let model = session.agent(agent)?.language_model().to_string();
    let judge = session.create_agent(
        NewAgent::new(JUDGE_NAME, model, Party::Agent(agent), call_ref.clone())
            .with_role(AgentRole::Hook)
            .with_instructions(args.instructions),
    )?;
    session.append(judge, TranscriptEntry::system(JUDGE_SYSTEM), Provenance::Novel)?;
    let count = session.agent(agent)?.monitors().len();
    info!(agent = %agent, judge = %judge, "response monitor attached");
    Ok(ProvenanceString::novel(format!(
        "Hook attached. This agent now has {count} response monitor(s)."
    )))
}
