use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ─── Identifiers ────────────────────────────────────────────────────────────

/// Position of an event in the session log. Strictly increasing, no gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn next(self) -> Self {
        MessageId(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(MessageId)
    }
}

// Older logs wrote ids as digit strings.
impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(MessageId(n)),
            Raw::Str(s) => s
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid message id: {s:?}"))),
        }
    }
}

/// Index of an agent in the session arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentId(pub usize);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── Transcript Types ───────────────────────────────────────────────────────

/// Role of a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry of an agent's transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name, on tool-role entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl TranscriptEntry {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            is_error: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn tool_result(
        call: &ToolCallRequest,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            is_error,
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// An assistant turn with no tool calls
    pub fn is_utterance(&self) -> bool {
        self.role == Role::Assistant && self.tool_calls.is_empty()
    }
}

/// Tool calls of the final assistant turn that have no result yet.
pub fn unanswered_tool_calls(transcript: &[TranscriptEntry]) -> Vec<ToolCallRequest> {
    let Some(pos) = transcript
        .iter()
        .rposition(|e| e.role == Role::Assistant)
    else {
        return Vec::new();
    };
    let answered: Vec<&str> = transcript[pos + 1..]
        .iter()
        .filter(|e| e.role == Role::Tool)
        .filter_map(|e| e.tool_call_id.as_deref())
        .collect();
    transcript[pos]
        .tool_calls
        .iter()
        .filter(|c| !answered.contains(&c.id.as_str()))
        .cloned()
        .collect()
}

// ─── Model Output ───────────────────────────────────────────────────────────

/// Token usage reported by a model, when it reports any
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn new(input: usize, output: usize) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
        }
    }

    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// What a language model returns for one completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl AssistantTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn into_entry(self) -> TranscriptEntry {
        TranscriptEntry::assistant_with_calls(self.text.unwrap_or_default(), self.tool_calls)
    }
}

// ─── Tool Definition ────────────────────────────────────────────────────────

/// Definition of a tool as advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ─── Identifier Tests ───────────────────────────────────────────────

    #[test]
    fn message_id_accepts_int_and_digit_string() {
        let a: MessageId = serde_json::from_str("12").unwrap();
        let b: MessageId = serde_json::from_str("\"12\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "12");
        assert!(serde_json::from_str::<MessageId>("\"twelve\"").is_err());
    }

    #[test]
    fn message_id_next() {
        assert_eq!(MessageId(4).next(), MessageId(5));
    }

    // ─── Transcript Tests ───────────────────────────────────────────────

    #[test]
    fn transcript_entry_serialization_skips_empty_fields() {
        let entry = TranscriptEntry::user("hello");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn tool_result_carries_call_identity() {
        let call = ToolCallRequest::new("c1", "read", json!({"path": "a"}));
        let entry = TranscriptEntry::tool_result(&call, "contents", true);
        assert_eq!(entry.role, Role::Tool);
        assert_eq!(entry.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(entry.name.as_deref(), Some("read"));
        assert!(entry.is_error);
    }

    #[test]
    fn utterance_detection() {
        assert!(TranscriptEntry::assistant("hi").is_utterance());
        let call = ToolCallRequest::new("c1", "read", json!({}));
        assert!(!TranscriptEntry::assistant_with_calls("", vec![call]).is_utterance());
        assert!(!TranscriptEntry::user("hi").is_utterance());
    }

    #[test]
    fn unanswered_calls_after_partial_results() {
        let c1 = ToolCallRequest::new("c1", "a", json!({}));
        let c2 = ToolCallRequest::new("c2", "b", json!({}));
        let transcript = vec![
            TranscriptEntry::user("go"),
            TranscriptEntry::assistant_with_calls("", vec![c1.clone(), c2.clone()]),
            TranscriptEntry::tool_result(&c1, "done", false),
        ];
        let pending = unanswered_tool_calls(&transcript);
        assert_eq!(pending, vec![c2]);
    }

    #[test]
    fn no_unanswered_calls_after_utterance() {
        let transcript = vec![TranscriptEntry::user("go"), TranscriptEntry::assistant("ok")];
        assert!(unanswered_tool_calls(&transcript).is_empty());
        assert!(unanswered_tool_calls(&[]).is_empty());
    }

    // ─── Model Output Tests ─────────────────────────────────────────────

    #[test]
    fn assistant_turn_tolerates_missing_usage() {
        let turn: AssistantTurn = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(turn.text.as_deref(), Some("hi"));
        assert!(turn.usage.is_none());
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn assistant_turn_into_entry() {
        let call = ToolCallRequest::new("c1", "read", json!({}));
        let entry = AssistantTurn::tool_calls(vec![call.clone()]).into_entry();
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.content, "");
        assert_eq!(entry.tool_calls, vec![call]);
    }

    #[test]
    fn token_usage_total() {
        assert_eq!(TokenUsage::new(100, 50).total(), 150);
    }
}
