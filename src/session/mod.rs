//! Event-sourced session state.
//!
//! The [`Session`] owns every agent (an arena addressed by [`AgentId`]) and mirrors
//! every mutation into an append-only log of [`LogEvent`]s. Replaying the log with
//! [`Session::load`] reconstructs the same arena: transcripts, sub-agent maps,
//! response monitors, the interlocutor and the message-id counter.
//!
//! Agents never hold references to each other; sub-agent maps store ids, so the
//! agent graph is a plain DAG rooted at the interlocutor.

pub mod event;
pub mod sink;
pub mod state;
pub mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{WeaveError, WeaveResult};
use crate::provenance::{Cause, CauseRef, Provenance, ProvenanceString};
use crate::types::{AgentId, MessageId, Role, TranscriptEntry};

pub use event::{
    AgentCreatedRecord, AgentRole, FragmentRecord, LogEvent, TranscriptRecord, TruncationRecord,
    USER,
};
pub use sink::{JsonlFileSink, LogSink, MemorySink};
pub use state::SessionState;
pub use store::{SessionIndex, SessionStore};

/// The human or one of the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    User,
    Agent(AgentId),
}

/// A response monitor attached to an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSpec {
    pub judge: AgentId,
    pub instructions: String,
}

/// Who speaks and who listens in an agent's discussion rounds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub speakers: Vec<String>,
    pub listeners: Vec<String>,
}

/// A request and the utterance that answered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recall {
    pub request: String,
    pub response: Option<String>,
    pub n: i64,
}

/// Runtime state of one agent.
#[derive(Debug, Clone)]
pub struct AgentState {
    id: AgentId,
    log_id: String,
    name: String,
    language_model: String,
    parent: Party,
    role: Option<AgentRole>,
    instructions: Option<String>,
    created_by: Cause,
    transcript: Vec<TranscriptEntry>,
    /// Log position of each transcript entry
    message_ids: Vec<MessageId>,
    subagents: Vec<(String, AgentId)>,
    monitors: Vec<MonitorSpec>,
    roster: Option<Roster>,
}

impl AgentState {
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Identifier used for this agent in the log.
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language_model(&self) -> &str {
        &self.language_model
    }

    pub fn parent(&self) -> Party {
        self.parent
    }

    pub fn role(&self) -> Option<AgentRole> {
        self.role
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Message id under which transcript entry `index` was logged.
    pub fn message_id(&self, index: usize) -> Option<MessageId> {
        self.message_ids.get(index).copied()
    }

    pub fn last_message_id(&self) -> Option<MessageId> {
        self.message_ids.last().copied()
    }

    pub fn subagent(&self, name: &str) -> Option<AgentId> {
        self.subagents
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Sub-agent names in creation order.
    pub fn subagent_names(&self) -> Vec<String> {
        self.subagents.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn monitors(&self) -> &[MonitorSpec] {
        &self.monitors
    }

    pub fn roster(&self) -> Option<&Roster> {
        self.roster.as_ref()
    }

    /// Read the `n`th request/response pair. Requests are user entries that are not
    /// `<system>` notes; negative `n` counts from the end.
    pub fn recall(&self, n: i64) -> WeaveResult<Recall> {
        let requests: Vec<usize> = self
            .transcript
            .iter()
            .enumerate()
            .filter(|(_, e)| e.role == Role::User && !e.content.starts_with("<system>"))
            .map(|(i, _)| i)
            .collect();
        let count = requests.len() as i64;
        let index = if n < 0 { count + n } else { n };
        if index < 0 || index >= count {
            return Err(WeaveError::Contract(format!(
                "No request at index {n}: the log holds {count} requests"
            )));
        }
        let start = requests[index as usize];
        let end = requests
            .get(index as usize + 1)
            .copied()
            .unwrap_or(self.transcript.len());
        let response = self.transcript[start + 1..end]
            .iter()
            .rev()
            .find(|e| e.is_utterance())
            .map(|e| e.content.clone());
        Ok(Recall {
            request: self.transcript[start].content.clone(),
            response,
            n: index,
        })
    }
}

/// Parameters for [`Session::create_agent`].
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub language_model: String,
    pub parent: Party,
    pub cause: Cause,
    pub role: Option<AgentRole>,
    pub instructions: Option<String>,
}

impl NewAgent {
    pub fn new(
        name: impl Into<String>,
        language_model: impl Into<String>,
        parent: Party,
        cause: impl Into<Cause>,
    ) -> Self {
        Self {
            name: name.into(),
            language_model: language_model.into(),
            parent,
            cause: cause.into(),
            role: None,
            instructions: None,
        }
    }

    /// The interlocutor: an agent the human talks to directly.
    pub fn interlocutor(name: impl Into<String>, language_model: impl Into<String>) -> Self {
        Self::new(name, language_model, Party::User, CauseRef::User)
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Multi-agent state backed by an event log.
pub struct Session {
    id: String,
    path: Option<PathBuf>,
    sinks: Vec<Arc<dyn LogSink>>,
    next_message_id: MessageId,
    agents: Vec<AgentState>,
    log_ids: HashMap<String, AgentId>,
    interlocutor: Option<AgentId>,
    state: SessionState,
}

impl Session {
    /// A session with no sinks attached. Add one with [`Session::with_sink`].
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            sinks: Vec::new(),
            next_message_id: MessageId(0),
            agents: Vec::new(),
            log_ids: HashMap::new(),
            interlocutor: None,
            state: SessionState::new(),
        }
    }

    /// Start a session logging to the JSONL file at `path`.
    pub fn create(path: impl AsRef<Path>) -> WeaveResult<Self> {
        let path = path.as_ref();
        let sink = JsonlFileSink::open(path)?;
        let mut session = Self::new(session_id_for(path)).with_sink(Arc::new(sink));
        session.path = Some(path.to_path_buf());
        info!(session = %session.id, path = %path.display(), "session created");
        Ok(session)
    }

    /// Replay the log at `path` and keep appending to it.
    pub async fn load(path: impl AsRef<Path>) -> WeaveResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let mut events = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: LogEvent =
                serde_json::from_str(line).map_err(|e| WeaveError::MalformedLog {
                    line: index + 1,
                    message: e.to_string(),
                })?;
            events.push((index + 1, event));
        }

        let mut session = Self::replay_numbered(session_id_for(path), events)?;
        session.sinks.push(Arc::new(JsonlFileSink::open(path)?));
        session.path = Some(path.to_path_buf());
        info!(
            session = %session.id,
            agents = session.agents.len(),
            next_message_id = %session.next_message_id,
            "session loaded"
        );
        Ok(session)
    }

    /// Rebuild a session from events alone. No sinks are attached.
    pub fn replay(
        id: impl Into<String>,
        events: impl IntoIterator<Item = LogEvent>,
    ) -> WeaveResult<Self> {
        let numbered = events
            .into_iter()
            .enumerate()
            .map(|(index, event)| (index + 1, event));
        Self::replay_numbered(id.into(), numbered)
    }

    fn replay_numbered(
        id: String,
        events: impl IntoIterator<Item = (usize, LogEvent)>,
    ) -> WeaveResult<Self> {
        let mut session = Self::new(id);
        let mut last: Option<MessageId> = None;
        for (line, event) in events {
            let message_id = event.message_id();
            if let Some(prev) = last {
                if message_id <= prev {
                    return Err(WeaveError::MalformedLog {
                        line,
                        message: format!("message_id {message_id} does not follow {prev}"),
                    });
                }
            }
            last = Some(message_id);
            session
                .apply(event)
                .map_err(|message| WeaveError::MalformedLog { line, message })?;
        }
        session.next_message_id = last.map(MessageId::next).unwrap_or(MessageId(0));
        Ok(session)
    }

    fn apply(&mut self, event: LogEvent) -> Result<(), String> {
        match event {
            LogEvent::AgentCreated(r) => {
                if r.agent == USER || self.log_ids.contains_key(&r.agent) {
                    return Err(format!("agent id {:?} is already in use", r.agent));
                }
                let parent = self.party(&r.parent)?;
                self.insert_agent(AgentState {
                    id: AgentId(self.agents.len()),
                    log_id: r.agent,
                    name: r.name,
                    language_model: r.language_model,
                    parent,
                    role: r.role,
                    instructions: r.instructions,
                    created_by: r.cause,
                    transcript: Vec::new(),
                    message_ids: Vec::new(),
                    subagents: Vec::new(),
                    monitors: Vec::new(),
                    roster: None,
                });
            }
            LogEvent::TranscriptEntry(r) => {
                let id = self.lookup(&r.agent)?;
                let agent = &mut self.agents[id.0];
                agent.transcript.push(r.entry());
                agent.message_ids.push(r.message_id);
            }
            LogEvent::Fragment(r) => {
                self.party(&r.agent)?;
            }
            LogEvent::TranscriptTruncated(r) => {
                let id = self.lookup(&r.agent)?;
                let agent = &mut self.agents[id.0];
                agent.transcript.truncate(r.length);
                agent.message_ids.truncate(r.length);
            }
        }
        Ok(())
    }

    fn lookup(&self, log_id: &str) -> Result<AgentId, String> {
        self.log_ids
            .get(log_id)
            .copied()
            .ok_or_else(|| format!("unknown agent {log_id:?}"))
    }

    fn party(&self, log_id: &str) -> Result<Party, String> {
        if log_id == USER {
            Ok(Party::User)
        } else {
            self.lookup(log_id).map(Party::Agent)
        }
    }

    fn insert_agent(&mut self, agent: AgentState) {
        let id = agent.id;
        match agent.parent {
            Party::User => self.interlocutor = Some(id),
            Party::Agent(parent) => {
                let parent = &mut self.agents[parent.0];
                match agent.role {
                    None | Some(AgentRole::Child) => {
                        match parent.subagents.iter_mut().find(|(n, _)| *n == agent.name) {
                            Some(slot) => slot.1 = id,
                            None => parent.subagents.push((agent.name.clone(), id)),
                        }
                    }
                    Some(AgentRole::Hook) => parent.monitors.push(MonitorSpec {
                        judge: id,
                        instructions: agent.instructions.clone().unwrap_or_default(),
                    }),
                    Some(AgentRole::Delegate) => {}
                }
            }
        }
        self.log_ids.insert(agent.log_id.clone(), id);
        self.agents.push(agent);
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Attach another destination, e.g. a live viewer.
    pub fn add_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.sinks.push(sink);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn next_message_id(&self) -> MessageId {
        self.next_message_id
    }

    pub fn interlocutor(&self) -> Option<AgentId> {
        self.interlocutor
    }

    pub fn agents(&self) -> &[AgentState] {
        &self.agents
    }

    pub fn agent(&self, id: AgentId) -> WeaveResult<&AgentState> {
        self.agents
            .get(id.0)
            .ok_or_else(|| WeaveError::Session(format!("no agent {id}")))
    }

    fn agent_mut(&mut self, id: AgentId) -> WeaveResult<&mut AgentState> {
        self.agents
            .get_mut(id.0)
            .ok_or_else(|| WeaveError::Session(format!("no agent {id}")))
    }

    pub fn find_agent(&self, log_id: &str) -> Option<AgentId> {
        self.log_ids.get(log_id).copied()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn flush(&self) -> WeaveResult<()> {
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }

    // ─── Writing ────────────────────────────────────────────────────────

    fn write(&mut self, build: impl FnOnce(MessageId) -> LogEvent) -> WeaveResult<MessageId> {
        let message_id = self.next_message_id;
        let event = build(message_id);
        for sink in &self.sinks {
            sink.write(&event)?;
        }
        self.next_message_id = message_id.next();
        debug!(
            message_id = %message_id,
            kind = event.kind(),
            agent = event.agent(),
            "logged"
        );
        Ok(message_id)
    }

    fn party_log_id(&self, party: Party) -> WeaveResult<String> {
        match party {
            Party::User => Ok(USER.to_string()),
            Party::Agent(id) => Ok(self.agent(id)?.log_id.clone()),
        }
    }

    fn allocate_log_id(&self, name: &str) -> String {
        let sanitized: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        let base = match sanitized.trim_matches('_') {
            "" => "agent",
            base => base,
        };
        let mut candidate = base.to_string();
        let mut suffix = 1;
        while candidate == USER || self.log_ids.contains_key(&candidate) {
            candidate = format!("{base}{suffix}");
            suffix += 1;
        }
        candidate
    }

    /// Create an agent and log its creation.
    ///
    /// Children (role absent or `child`) are linked into the parent's sub-agent map
    /// and their name must be free there. Hooks become response monitors of the
    /// parent. A parent of [`Party::User`] makes the new agent the interlocutor.
    pub fn create_agent(&mut self, new: NewAgent) -> WeaveResult<AgentId> {
        if let Party::Agent(parent) = new.parent {
            let parent = self.agent(parent)?;
            let linked = matches!(new.role, None | Some(AgentRole::Child));
            if linked && parent.subagent(&new.name).is_some() {
                return Err(WeaveError::Contract(format!(
                    "There is already a subagent of this name: {}. Existing subagents: {:?}",
                    new.name,
                    parent.subagent_names()
                )));
            }
        }

        let log_id = self.allocate_log_id(&new.name);
        let parent_log_id = self.party_log_id(new.parent)?;
        let record_log_id = log_id.clone();
        let new_for_log = new.clone();
        self.write(|message_id| {
            LogEvent::AgentCreated(AgentCreatedRecord {
                message_id,
                agent: record_log_id,
                name: new_for_log.name,
                parent: parent_log_id,
                language_model: new_for_log.language_model,
                cause: new_for_log.cause,
                role: new_for_log.role,
                instructions: new_for_log.instructions,
            })
        })?;

        let id = AgentId(self.agents.len());
        info!(agent = %log_id, name = %new.name, role = ?new.role, "agent created");
        self.insert_agent(AgentState {
            id,
            log_id,
            name: new.name,
            language_model: new.language_model,
            parent: new.parent,
            role: new.role,
            instructions: new.instructions,
            created_by: new.cause,
            transcript: Vec::new(),
            message_ids: Vec::new(),
            subagents: Vec::new(),
            monitors: Vec::new(),
            roster: None,
        });
        Ok(id)
    }

    fn record_entry(
        &mut self,
        agent: AgentId,
        entry: TranscriptEntry,
        provenance: Provenance,
        tool_call: Option<MessageId>,
    ) -> WeaveResult<MessageId> {
        let log_id = self.agent(agent)?.log_id.clone();
        let (substance, cause) = match provenance {
            Provenance::Novel => (None, None),
            Provenance::Substance(id) => (Some(id), None),
            Provenance::Cause(cause) => (None, Some(cause)),
        };
        let record_entry = entry.clone();
        let message_id = self.write(|message_id| {
            LogEvent::TranscriptEntry(TranscriptRecord {
                message_id,
                agent: log_id,
                role: record_entry.role,
                content: record_entry.content,
                tool_calls: record_entry.tool_calls,
                tool_call,
                tool_call_id: record_entry.tool_call_id,
                name: record_entry.name,
                is_error: record_entry.is_error,
                substance,
                cause,
            })
        })?;
        let state = self.agent_mut(agent)?;
        state.transcript.push(entry);
        state.message_ids.push(message_id);
        Ok(message_id)
    }

    /// Append an entry to an agent's transcript.
    pub fn append(
        &mut self,
        agent: AgentId,
        entry: TranscriptEntry,
        provenance: Provenance,
    ) -> WeaveResult<MessageId> {
        self.record_entry(agent, entry, provenance, None)
    }

    /// Append a tool result answering a call made in assistant turn `tool_call`.
    pub fn append_tool_result(
        &mut self,
        agent: AgentId,
        entry: TranscriptEntry,
        provenance: Provenance,
        tool_call: MessageId,
    ) -> WeaveResult<MessageId> {
        self.record_entry(agent, entry, provenance, Some(tool_call))
    }

    /// Give an agent a user-role input.
    pub fn harken(
        &mut self,
        agent: AgentId,
        input: impl Into<ProvenanceString>,
    ) -> WeaveResult<MessageId> {
        let input = input.into();
        let provenance = input.provenance().clone();
        self.append(agent, TranscriptEntry::user(input.into_string()), provenance)
    }

    /// Log text that belongs to no transcript of its author, e.g. a prompt broadcast
    /// to several sub-agents. Returns it tracked, ready to hand to its recipients.
    pub fn log_fragment(
        &mut self,
        by: Party,
        content: impl Into<String>,
        cause: impl Into<Cause>,
    ) -> WeaveResult<ProvenanceString> {
        let content = content.into();
        let agent = self.party_log_id(by)?;
        let cause = cause.into();
        let record_content = content.clone();
        let message_id = self.write(|message_id| {
            LogEvent::Fragment(FragmentRecord {
                message_id,
                agent,
                content: record_content,
                cause,
            })
        })?;
        Ok(ProvenanceString::tracked(content, message_id))
    }

    /// Log what the human typed.
    pub fn user_says(&mut self, content: impl Into<String>) -> WeaveResult<ProvenanceString> {
        self.log_fragment(Party::User, content, CauseRef::User)
    }

    /// Cut an agent's transcript back to `length` entries.
    pub fn truncate(
        &mut self,
        agent: AgentId,
        length: usize,
        cause: Option<Cause>,
    ) -> WeaveResult<()> {
        let current = self.agent(agent)?;
        if length >= current.transcript.len() {
            return Ok(());
        }
        let log_id = current.log_id.clone();
        self.write(|message_id| {
            LogEvent::TranscriptTruncated(TruncationRecord {
                message_id,
                agent: log_id,
                length,
                cause,
            })
        })?;
        let state = self.agent_mut(agent)?;
        state.transcript.truncate(length);
        state.message_ids.truncate(length);
        Ok(())
    }

    pub(crate) fn set_roster(&mut self, agent: AgentId, roster: Roster) -> WeaveResult<()> {
        self.agent_mut(agent)?.roster = Some(roster);
        Ok(())
    }

    // ─── Snapshots ──────────────────────────────────────────────────────

    /// A comparable snapshot of the agent graph.
    pub fn graph(&self) -> SessionGraph {
        let log_id = |party: Party| match party {
            Party::User => USER.to_string(),
            Party::Agent(id) => self.agents[id.0].log_id.clone(),
        };
        let agents = self
            .agents
            .iter()
            .map(|a| AgentNode {
                log_id: a.log_id.clone(),
                name: a.name.clone(),
                parent: log_id(a.parent),
                language_model: a.language_model.clone(),
                role: a.role,
                instructions: a.instructions.clone(),
                cause: a.created_by.clone(),
                transcript: a.transcript.clone(),
                subagents: a
                    .subagents
                    .iter()
                    .map(|(name, id)| (name.clone(), self.agents[id.0].log_id.clone()))
                    .collect(),
                monitors: a
                    .monitors
                    .iter()
                    .map(|m| self.agents[m.judge.0].log_id.clone())
                    .collect(),
            })
            .collect();
        SessionGraph {
            agents,
            interlocutor: self.interlocutor.map(|id| self.agents[id.0].log_id.clone()),
        }
    }
}

fn session_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string())
}

/// One agent in a [`SessionGraph`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentNode {
    pub log_id: String,
    pub name: String,
    pub parent: String,
    pub language_model: String,
    pub role: Option<AgentRole>,
    pub instructions: Option<String>,
    pub cause: Cause,
    pub transcript: Vec<TranscriptEntry>,
    pub subagents: Vec<(String, String)>,
    pub monitors: Vec<String>,
}

/// Agents, their links and transcripts, with log ids in place of arena ids.
/// Transcript provenance is not part of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionGraph {
    pub agents: Vec<AgentNode>,
    pub interlocutor: Option<String>,
}

impl SessionGraph {
    /// A canonical event stream that replays to this graph: every agent in creation
    /// order, then every transcript.
    pub fn to_events(&self) -> Vec<LogEvent> {
        let mut next = MessageId(0);
        let mut take = || {
            let id = next;
            next = id.next();
            id
        };
        let mut events = Vec::new();
        for agent in &self.agents {
            events.push(LogEvent::AgentCreated(AgentCreatedRecord {
                message_id: take(),
                agent: agent.log_id.clone(),
                name: agent.name.clone(),
                parent: agent.parent.clone(),
                language_model: agent.language_model.clone(),
                cause: agent.cause.clone(),
                role: agent.role,
                instructions: agent.instructions.clone(),
            }));
        }
        for agent in &self.agents {
            for entry in &agent.transcript {
                events.push(LogEvent::TranscriptEntry(TranscriptRecord {
                    message_id: take(),
                    agent: agent.log_id.clone(),
                    role: entry.role,
                    content: entry.content.clone(),
                    tool_calls: entry.tool_calls.clone(),
                    tool_call: None,
                    tool_call_id: entry.tool_call_id.clone(),
                    name: entry.name.clone(),
                    is_error: entry.is_error,
                    substance: None,
                    cause: None,
                }));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCallRequest;
    use serde_json::json;

    fn memory_session() -> (Session, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Session::new("test").with_sink(sink.clone()), sink)
    }

    #[test]
    fn log_ids_are_sanitized_and_unique() {
        let (mut session, _) = memory_session();
        let primary = session
            .create_agent(NewAgent::interlocutor("Primary", "m"))
            .unwrap();
        let a = session
            .create_agent(
                NewAgent::new("hook_", "m", Party::Agent(primary), MessageId(0))
                    .with_role(AgentRole::Hook),
            )
            .unwrap();
        let b = session
            .create_agent(
                NewAgent::new("hook_", "m", Party::Agent(primary), MessageId(0))
                    .with_role(AgentRole::Hook),
            )
            .unwrap();
        let c = session
            .create_agent(NewAgent::new("Wendell Websearcher!", "m", Party::Agent(primary), MessageId(0)))
            .unwrap();
        let d = session
            .create_agent(NewAgent::new("User", "m", Party::Agent(primary), MessageId(0)))
            .unwrap();
        let ids: Vec<&str> = [primary, a, b, c, d]
            .iter()
            .map(|id| session.agent(*id).unwrap().log_id())
            .collect();
        assert_eq!(ids, ["primary", "hook", "hook1", "wendell_websearcher", "user1"]);
    }

    #[test]
    fn message_ids_have_no_gaps() {
        let (mut session, sink) = memory_session();
        let agent = session
            .create_agent(NewAgent::interlocutor("primary", "m"))
            .unwrap();
        let prompt = session.user_says("hello").unwrap();
        session.harken(agent, prompt).unwrap();
        session
            .append(agent, TranscriptEntry::assistant("hi"), Provenance::Novel)
            .unwrap();
        let ids: Vec<u64> = sink.events().iter().map(|e| e.message_id().0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(session.next_message_id(), MessageId(4));
    }

    #[test]
    fn harken_logs_substance() {
        let (mut session, sink) = memory_session();
        let agent = session
            .create_agent(NewAgent::interlocutor("primary", "m"))
            .unwrap();
        let prompt = session.user_says("hello").unwrap();
        assert_eq!(prompt.substance(), Some(MessageId(1)));
        session.harken(agent, prompt).unwrap();
        let LogEvent::TranscriptEntry(record) = &sink.events()[2] else {
            panic!("expected a transcript entry");
        };
        assert_eq!(record.substance, Some(MessageId(1)));
        assert!(record.cause.is_none());
        assert_eq!(record.role, Role::User);
    }

    #[test]
    fn duplicate_child_name_is_a_contract_error() {
        let (mut session, _) = memory_session();
        let primary = session
            .create_agent(NewAgent::interlocutor("primary", "m"))
            .unwrap();
        session
            .create_agent(NewAgent::new("alice", "m", Party::Agent(primary), MessageId(0)))
            .unwrap();
        let err = session
            .create_agent(NewAgent::new("alice", "m", Party::Agent(primary), MessageId(0)))
            .unwrap_err();
        assert!(matches!(err, WeaveError::Contract(_)));
        assert!(err.to_string().contains("There is already a subagent of this name"));
    }

    #[test]
    fn hooks_attach_as_monitors_not_children() {
        let (mut session, _) = memory_session();
        let primary = session
            .create_agent(NewAgent::interlocutor("primary", "m"))
            .unwrap();
        let judge = session
            .create_agent(
                NewAgent::new("hook_", "m", Party::Agent(primary), MessageId(0))
                    .with_role(AgentRole::Hook)
                    .with_instructions("be polite"),
            )
            .unwrap();
        let agent = session.agent(primary).unwrap();
        assert!(agent.subagent_names().is_empty());
        assert_eq!(
            agent.monitors(),
            &[MonitorSpec {
                judge,
                instructions: "be polite".into()
            }]
        );
    }

    #[test]
    fn recall_pairs_requests_with_utterances() {
        let (mut session, _) = memory_session();
        let agent = session
            .create_agent(NewAgent::interlocutor("primary", "m"))
            .unwrap();
        let call = ToolCallRequest::new("c1", "read", json!({}));
        for entry in [
            TranscriptEntry::system("sys"),
            TranscriptEntry::user("first"),
            TranscriptEntry::assistant("one"),
            TranscriptEntry::user("second"),
            TranscriptEntry::assistant_with_calls("", vec![call.clone()]),
            TranscriptEntry::tool_result(&call, "data", false),
            TranscriptEntry::assistant("draft"),
            TranscriptEntry::user("<system>try again</system>"),
            TranscriptEntry::assistant("two"),
        ] {
            session.append(agent, entry, Provenance::Novel).unwrap();
        }
        let state = session.agent(agent).unwrap();
        let last = state.recall(-1).unwrap();
        assert_eq!(last.request, "second");
        assert_eq!(last.response.as_deref(), Some("two"));
        assert_eq!(last.n, 1);
        let first = state.recall(0).unwrap();
        assert_eq!(first.response.as_deref(), Some("one"));
        assert!(matches!(state.recall(2), Err(WeaveError::Contract(_))));
        assert!(matches!(state.recall(-3), Err(WeaveError::Contract(_))));
    }

    #[test]
    fn truncate_is_logged_and_replayed() {
        let (mut session, sink) = memory_session();
        let agent = session
            .create_agent(NewAgent::interlocutor("primary", "m"))
            .unwrap();
        session.harken(agent, "a").unwrap();
        session.harken(agent, "b").unwrap();
        session.truncate(agent, 1, None).unwrap();
        session.truncate(agent, 5, None).unwrap();
        assert_eq!(session.agent(agent).unwrap().transcript().len(), 1);
        assert_eq!(session.agent(agent).unwrap().last_message_id(), Some(MessageId(1)));
        assert_eq!(sink.len(), 4);

        let replayed = Session::replay("r", sink.events()).unwrap();
        assert_eq!(replayed.graph(), session.graph());
    }

    #[test]
    fn replay_single_agent_marks_interlocutor() {
        let lines = [
            r#"{"event_type": "agent_created", "message_id": 0, "agent": "primary", "name": "primary", "parent": "user", "language_model": "m", "cause": "user"}"#,
            r#"{"event_type": "transcript_entry", "message_id": 1, "agent": "primary", "role": "user", "content": "hi"}"#,
        ];
        let events: Vec<LogEvent> = lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let session = Session::replay("r", events).unwrap();
        assert_eq!(session.agents().len(), 1);
        let interlocutor = session.interlocutor().unwrap();
        assert_eq!(session.agent(interlocutor).unwrap().transcript().len(), 1);
        assert_eq!(session.next_message_id(), MessageId(2));
    }

    #[test]
    fn replay_rejects_unknown_agent() {
        let event: LogEvent = serde_json::from_str(
            r#"{"event_type": "transcript_entry", "message_id": 0, "agent": "ghost", "role": "user", "content": "hi"}"#,
        )
        .unwrap();
        let err = Session::replay("r", [event]).err().unwrap();
        assert!(matches!(err, WeaveError::MalformedLog { line: 1, .. }));
    }

    #[test]
    fn replay_rejects_out_of_order_ids() {
        let (mut session, sink) = memory_session();
        session
            .create_agent(NewAgent::interlocutor("primary", "m"))
            .unwrap();
        session.user_says("x").unwrap();
        let mut events = sink.events();
        events.reverse();
        let err = Session::replay("r", events).err().unwrap();
        assert!(matches!(err, WeaveError::MalformedLog { line: 2, .. }));
    }

    #[test]
    fn graph_round_trips_through_events() {
        let (mut session, _) = memory_session();
        let primary = session
            .create_agent(NewAgent::interlocutor("primary", "m"))
            .unwrap();
        let child = session
            .create_agent(NewAgent::new("Alice", "m", Party::Agent(primary), MessageId(0)))
            .unwrap();
        session
            .create_agent(
                NewAgent::new("hook_", "m", Party::Agent(primary), MessageId(0))
                    .with_role(AgentRole::Hook)
                    .with_instructions("no swearing"),
            )
            .unwrap();
        session
            .create_agent(
                NewAgent::new("worker", "m", Party::Agent(child), MessageId(1))
                    .with_role(AgentRole::Delegate),
            )
            .unwrap();
        session.harken(primary, "hello").unwrap();
        session.harken(child, "hi alice").unwrap();

        let graph = session.graph();
        let replayed = Session::replay("copy", graph.to_events()).unwrap();
        assert_eq!(replayed.graph(), graph);
        let again = Session::replay("again", replayed.graph().to_events()).unwrap();
        assert_eq!(again.graph(), graph);
        assert_eq!(graph.interlocutor.as_deref(), Some("primary"));
        assert_eq!(graph.agents[0].subagents, vec![("Alice".to_string(), "alice".to_string())]);
        assert_eq!(graph.agents[0].monitors, vec!["hook".to_string()]);
    }

    #[tokio::test]
    async fn load_appends_to_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat1.jsonl");
        {
            let mut session = Session::create(&path).unwrap();
            let agent = session
                .create_agent(NewAgent::interlocutor("primary", "m"))
                .unwrap();
            session.harken(agent, "hello").unwrap();
        }
        let mut session = Session::load(&path).await.unwrap();
        assert_eq!(session.id(), "chat1");
        assert_eq!(session.next_message_id(), MessageId(2));
        let agent = session.interlocutor().unwrap();
        session.harken(agent, "again").unwrap();

        let reloaded = Session::load(&path).await.unwrap();
        assert_eq!(reloaded.next_message_id(), MessageId(3));
        assert_eq!(reloaded.agent(agent).unwrap().transcript().len(), 2);
    }

    #[tokio::test]
    async fn load_fails_on_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(
            &path,
            "{\"event_type\": \"agent_created\", \"message_id\": 0, \"agent\": \"a\", \"name\": \"a\", \"parent\": \"user\", \"language_model\": \"m\", \"cause\": \"user\"}\n\n{\"event_type\": \"transcript_entry\", \"message_id\": 1, \"agent\": \"a\", \"role\": \"user\"}\n",
        )
        .unwrap();
        let err = Session::load(&path).await.err().unwrap();
        match err {
            WeaveError::MalformedLog { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("content"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
