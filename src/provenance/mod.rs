//! Provenance-carrying strings.
//!
//! Every string that travels between agents remembers where it came from:
//!
//! - **Substance**: the text *is* an earlier logged item (perhaps reformatted, e.g.
//!   `"[alice]: hi"` relaying alice's utterance). Substance implies causation.
//! - **Cause**: the text was *synthesized from* one or more earlier items, or from a
//!   specific tool call (`"12.call_3"`).
//! - **Novel**: neither. A model's free-text utterance is novel.
//!
//! Substance and cause are mutually exclusive, which [`Provenance`] encodes directly.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::MessageId;

/// One thing an item can be caused by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CauseRef {
    /// An earlier logged item
    Message(MessageId),
    /// A specific tool call inside an assistant turn
    ToolCall { message: MessageId, call_id: String },
    /// The human at the keyboard
    User,
}

impl CauseRef {
    pub fn tool_call(message: MessageId, call_id: impl Into<String>) -> Self {
        CauseRef::ToolCall {
            message,
            call_id: call_id.into(),
        }
    }
}

impl From<MessageId> for CauseRef {
    fn from(id: MessageId) -> Self {
        CauseRef::Message(id)
    }
}

impl fmt::Display for CauseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CauseRef::Message(id) => write!(f, "{id}"),
            CauseRef::ToolCall { message, call_id } => write!(f, "{message}.{call_id}"),
            CauseRef::User => f.write_str("user"),
        }
    }
}

impl std::str::FromStr for CauseRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "user" {
            return Ok(CauseRef::User);
        }
        if let Some((message, call_id)) = s.split_once('.') {
            let message = message
                .parse()
                .map_err(|_| format!("invalid tool-call cause: {s:?}"))?;
            if call_id.is_empty() {
                return Err(format!("invalid tool-call cause: {s:?}"));
            }
            return Ok(CauseRef::tool_call(message, call_id));
        }
        s.parse()
            .map(CauseRef::Message)
            .map_err(|_| format!("invalid cause: {s:?}"))
    }
}

impl Serialize for CauseRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CauseRef::Message(id) => id.serialize(serializer),
            other => serializer.collect_str(other),
        }
    }
}

impl<'de> Deserialize<'de> for CauseRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Str(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ok(CauseRef::Message(MessageId(n))),
            Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A single cause or a list of causes. Lists are kept as lists, even of length one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cause {
    Many(Vec<CauseRef>),
    One(CauseRef),
}

impl Cause {
    pub fn many(refs: impl IntoIterator<Item = impl Into<CauseRef>>) -> Self {
        Cause::Many(refs.into_iter().map(Into::into).collect())
    }

    pub fn refs(&self) -> &[CauseRef] {
        match self {
            Cause::Many(refs) => refs,
            Cause::One(r) => std::slice::from_ref(r),
        }
    }
}

impl From<CauseRef> for Cause {
    fn from(r: CauseRef) -> Self {
        Cause::One(r)
    }
}

impl From<MessageId> for Cause {
    fn from(id: MessageId) -> Self {
        Cause::One(CauseRef::Message(id))
    }
}

/// Lineage of a string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Provenance {
    #[default]
    Novel,
    Substance(MessageId),
    Cause(Cause),
}

/// A string value plus its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceString {
    value: String,
    provenance: Provenance,
}

impl ProvenanceString {
    pub fn novel(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            provenance: Provenance::Novel,
        }
    }

    /// Same substance as the logged item `message_id`.
    pub fn tracked(value: impl Into<String>, message_id: MessageId) -> Self {
        Self {
            value: value.into(),
            provenance: Provenance::Substance(message_id),
        }
    }

    /// Synthesized from `cause`.
    pub fn caused(value: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self {
            value: value.into(),
            provenance: Provenance::Cause(cause.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn substance(&self) -> Option<MessageId> {
        match self.provenance {
            Provenance::Substance(id) => Some(id),
            _ => None,
        }
    }

    pub fn cause(&self) -> Option<&Cause> {
        match &self.provenance {
            Provenance::Cause(cause) => Some(cause),
            _ => None,
        }
    }

    /// Replace the text, keeping the lineage (e.g. prefixing a speaker name).
    pub fn map_value(self, f: impl FnOnce(String) -> String) -> Self {
        Self {
            value: f(self.value),
            provenance: self.provenance,
        }
    }

    /// Split into the parts the session log stores.
    pub fn into_parts(self) -> (String, Option<MessageId>, Option<Cause>) {
        match self.provenance {
            Provenance::Novel => (self.value, None, None),
            Provenance::Substance(id) => (self.value, Some(id), None),
            Provenance::Cause(cause) => (self.value, None, Some(cause)),
        }
    }
}

impl Deref for ProvenanceString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ProvenanceString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl From<String> for ProvenanceString {
    fn from(value: String) -> Self {
        Self::novel(value)
    }
}

impl From<&str> for ProvenanceString {
    fn from(value: &str) -> Self {
        Self::novel(value)
    }
}
