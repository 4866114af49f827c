use serde::{Deserialize, Serialize};

use crate::provenance::Cause;
use crate::types::{MessageId, Role, ToolCallRequest, TranscriptEntry};

/// Log id of the human interlocutor.
pub const USER: &str = "user";

/// One line of the session log.
///
/// The set of required fields per kind is load-bearing: a record missing one fails
/// to deserialize, and the whole load fails with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LogEvent {
    TranscriptEntry(TranscriptRecord),
    Fragment(FragmentRecord),
    AgentCreated(AgentCreatedRecord),
    TranscriptTruncated(TruncationRecord),
}

impl LogEvent {
    pub fn message_id(&self) -> MessageId {
        match self {
            LogEvent::TranscriptEntry(r) => r.message_id,
            LogEvent::Fragment(r) => r.message_id,
            LogEvent::AgentCreated(r) => r.message_id,
            LogEvent::TranscriptTruncated(r) => r.message_id,
        }
    }

    pub fn agent(&self) -> &str {
        match self {
            LogEvent::TranscriptEntry(r) => &r.agent,
            LogEvent::Fragment(r) => &r.agent,
            LogEvent::AgentCreated(r) => &r.agent,
            LogEvent::TranscriptTruncated(r) => &r.agent,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LogEvent::TranscriptEntry(_) => "transcript_entry",
            LogEvent::Fragment(_) => "fragment",
            LogEvent::AgentCreated(_) => "agent_created",
            LogEvent::TranscriptTruncated(_) => "transcript_truncated",
        }
    }
}

/// Something that entered an agent's transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub message_id: MessageId,
    pub agent: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Assistant turn that requested this tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substance: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
}

impl TranscriptRecord {
    pub fn entry(&self) -> TranscriptEntry {
        TranscriptEntry {
            role: self.role,
            content: self.content.clone(),
            tool_calls: self.tool_calls.clone(),
            tool_call_id: self.tool_call_id.clone(),
            name: self.name.clone(),
            is_error: self.is_error,
        }
    }
}

/// Text an agent produced that never entered its own transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub message_id: MessageId,
    pub agent: String,
    pub content: String,
    pub cause: Cause,
}

/// How a new agent hangs off its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Named sub-agent, reachable through the parent's sub-agent map
    Child,
    /// Judge agent of a response monitor
    Hook,
    /// Nested worker spun up by an agent delegation; not linked by name
    Delegate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCreatedRecord {
    pub message_id: MessageId,
    pub agent: String,
    pub name: String,
    pub parent: String,
    pub language_model: String,
    pub cause: Cause,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,
    /// Monitor instructions, for `role = "hook"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A transcript cut back to `length` entries (judge scratch work).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruncationRecord {
    pub message_id: MessageId,
    pub agent: String,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Cause>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::CauseRef;
    use serde_json::json;

    #[test]
    fn transcript_entry_wire_format() {
        let event = LogEvent::TranscriptEntry(TranscriptRecord {
            message_id: MessageId(4),
            agent: "primary".into(),
            role: Role::Tool,
            content: "ok".into(),
            tool_calls: Vec::new(),
            tool_call: Some(MessageId(3)),
            tool_call_id: Some("c1".into()),
            name: Some("read".into()),
            is_error: false,
            substance: None,
            cause: Some(CauseRef::tool_call(MessageId(3), "c1").into()),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event_type": "transcript_entry",
                "message_id": 4,
                "agent": "primary",
                "role": "tool",
                "content": "ok",
                "tool_call": 3,
                "tool_call_id": "c1",
                "name": "read",
                "cause": "3.c1"
            })
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let line = r#"{"event_type": "fragment", "message_id": 1, "agent": "a", "content": "x"}"#;
        assert!(serde_json::from_str::<LogEvent>(line).is_err());

        let line = r#"{"event_type": "agent_created", "message_id": 0, "agent": "a", "name": "A", "parent": "user", "cause": "user"}"#;
        assert!(serde_json::from_str::<LogEvent>(line).is_err());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let line = r#"{"event_type": "agent_deleted", "message_id": 1, "agent": "a"}"#;
        assert!(serde_json::from_str::<LogEvent>(line).is_err());
    }

    #[test]
    fn legacy_string_ids_parse() {
        let line = r#"{"message_id": "2", "event_type": "transcript_entry", "agent": "primary", "role": "user", "content": "hi", "substance": "1"}"#;
        let event: LogEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.message_id(), MessageId(2));
        let LogEvent::TranscriptEntry(record) = event else {
            panic!("wrong kind");
        };
        assert_eq!(record.substance, Some(MessageId(1)));
        assert_eq!(record.entry().content, "hi");
    }

    #[test]
    fn agent_created_role_is_optional() {
        let line = r#"{"event_type": "agent_created", "message_id": 0, "agent": "primary", "name": "primary", "parent": "user", "language_model": "m", "cause": "user"}"#;
        let event: LogEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.kind(), "agent_created");
        assert_eq!(event.agent(), "primary");
        let LogEvent::AgentCreated(record) = event else {
            panic!("wrong kind");
        };
        assert!(record.role.is_none());
        assert_eq!(record.cause, Cause::One(CauseRef::User));
    }
}
