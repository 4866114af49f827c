//! Hook output records. These are also the JSON protocol spoken by external
//! command hooks, hence the camelCase field names.

use serde::{Deserialize, Deserializer, Serialize};

use crate::permission::PermissionDecision;

fn yes() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// `decision: "block"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockDecision {
    Block,
}

/// Pre-tool decisions from before the permission vocabulary existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyDecision {
    Approve,
    Block,
}

/// Text injected around a prompt: absent, one string, or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InjectedContext {
    One(String),
    Many(Vec<String>),
}

impl InjectedContext {
    /// `None` for no texts, a bare string for one, a list otherwise.
    pub fn from_texts(mut texts: Vec<String>) -> Option<Self> {
        match texts.len() {
            0 => None,
            1 => texts.pop().map(InjectedContext::One),
            _ => Some(InjectedContext::Many(texts)),
        }
    }

    pub fn texts(&self) -> &[String] {
        match self {
            InjectedContext::One(text) => std::slice::from_ref(text),
            InjectedContext::Many(texts) => texts,
        }
    }
}

// List items may be plain strings or `{"type": "text", "text": ...}` blocks.
impl<'de> Deserialize<'de> for InjectedContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Item {
            Text(String),
            Block { text: String },
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<Item>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(text) => InjectedContext::One(text),
            Raw::Many(items) => InjectedContext::Many(
                items
                    .into_iter()
                    .map(|item| match item {
                        Item::Text(text) | Item::Block { text } => text,
                    })
                    .collect(),
            ),
        })
    }
}

// ─── UserPromptSubmit ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSubmitSpecific {
    /// Appended after the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<InjectedContext>,
    /// Prepended before the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context_pre: Option<InjectedContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSubmitOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<BlockDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "continue", default = "yes", skip_serializing_if = "is_true")]
    pub continue_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub suppress_output: bool,
    #[serde(default)]
    pub hook_specific_output: PromptSubmitSpecific,
}

impl Default for PromptSubmitOutput {
    fn default() -> Self {
        Self {
            decision: None,
            reason: None,
            continue_: true,
            stop_reason: None,
            suppress_output: false,
            hook_specific_output: PromptSubmitSpecific::default(),
        }
    }
}

impl PromptSubmitOutput {
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Some(BlockDecision::Block),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Inject `text` after the prompt.
    pub fn context(text: impl Into<String>) -> Self {
        let mut output = Self::default();
        output.hook_specific_output.additional_context = Some(InjectedContext::One(text.into()));
        output
    }

    /// Inject `text` before the prompt.
    pub fn context_pre(text: impl Into<String>) -> Self {
        let mut output = Self::default();
        output.hook_specific_output.additional_context_pre =
            Some(InjectedContext::One(text.into()));
        output
    }

    /// The prompt must not reach the agent.
    pub fn is_blocked(&self) -> bool {
        self.decision.is_some() || !self.continue_
    }

    /// Text shown to the human when the prompt is blocked.
    pub fn block_message(&self) -> String {
        [self.reason.as_deref(), self.stop_reason.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ─── PreToolUse ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseSpecific {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<PermissionDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreToolUseOutput {
    #[serde(rename = "continue", default = "yes", skip_serializing_if = "is_true")]
    pub continue_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub suppress_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<LegacyDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub hook_specific_output: PreToolUseSpecific,
}

impl Default for PreToolUseOutput {
    fn default() -> Self {
        Self {
            continue_: true,
            stop_reason: None,
            suppress_output: false,
            decision: None,
            reason: None,
            hook_specific_output: PreToolUseSpecific::default(),
        }
    }
}

impl PreToolUseOutput {
    fn vote(decision: PermissionDecision, reason: impl Into<String>) -> Self {
        Self {
            hook_specific_output: PreToolUseSpecific {
                permission_decision: Some(decision),
                permission_decision_reason: Some(reason.into()),
            },
            ..Self::default()
        }
    }

    pub fn allow(reason: impl Into<String>) -> Self {
        Self::vote(PermissionDecision::Allow, reason)
    }

    pub fn ask(reason: impl Into<String>) -> Self {
        Self::vote(PermissionDecision::Ask, reason)
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self::vote(PermissionDecision::Deny, reason)
    }

    /// Rewrite legacy `approve`/`block` into the permission vocabulary. A legacy
    /// decision replaces any explicit permission decision, and its `reason`
    /// replaces the permission reason.
    pub fn normalized(mut self) -> Self {
        let reason = self.reason.take();
        if let Some(legacy) = self.decision.take() {
            let specific = &mut self.hook_specific_output;
            specific.permission_decision = Some(match legacy {
                LegacyDecision::Approve => PermissionDecision::Allow,
                LegacyDecision::Block => PermissionDecision::Deny,
            });
            specific.permission_decision_reason = reason;
        }
        self
    }

    pub fn permission(&self) -> Option<PermissionDecision> {
        self.hook_specific_output.permission_decision
    }

    pub fn permission_reason(&self) -> Option<&str> {
        self.hook_specific_output.permission_decision_reason.as_deref()
    }
}

// ─── PostToolUse ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostToolUseOutput {
    #[serde(rename = "continue", default = "yes", skip_serializing_if = "is_true")]
    pub continue_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<BlockDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Default for PostToolUseOutput {
    fn default() -> Self {
        Self {
            continue_: true,
            stop_reason: None,
            decision: None,
            reason: None,
        }
    }
}

impl PostToolUseOutput {
    /// Feed `reason` back to the model alongside the tool result.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: Some(BlockDecision::Block),
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_continue_means_continue() {
        let output: PreToolUseOutput = serde_json::from_value(json!({})).unwrap();
        assert!(output.continue_);
        let output: PostToolUseOutput =
            serde_json::from_value(json!({"continue": false, "stopReason": "enough"})).unwrap();
        assert!(!output.continue_);
        assert_eq!(output.stop_reason.as_deref(), Some("enough"));
    }

    #[test]
    fn prompt_output_wire_format() {
        let output: PromptSubmitOutput = serde_json::from_value(json!({
            "decision": "block",
            "reason": "no secrets",
            "hookSpecificOutput": {
                "hookEventName": "UserPromptSubmit",
                "additionalContext": [{"type": "text", "text": "a"}, "b"]
            }
        }))
        .unwrap();
        assert!(output.is_blocked());
        assert_eq!(output.block_message(), "no secrets");
        assert_eq!(
            output.hook_specific_output.additional_context,
            Some(InjectedContext::Many(vec!["a".into(), "b".into()]))
        );

        let value = serde_json::to_value(PromptSubmitOutput::context("note")).unwrap();
        assert_eq!(
            value,
            json!({"hookSpecificOutput": {"additionalContext": "note"}})
        );
    }

    #[test]
    fn legacy_decisions_normalize() {
        let output: PreToolUseOutput =
            serde_json::from_value(json!({"decision": "block", "reason": "nope"})).unwrap();
        let output = output.normalized();
        assert_eq!(output.permission(), Some(PermissionDecision::Deny));
        assert_eq!(output.permission_reason(), Some("nope"));
        assert!(output.decision.is_none());

        let output: PreToolUseOutput = serde_json::from_value(json!({"decision": "approve"})).unwrap();
        assert_eq!(output.normalized().permission(), Some(PermissionDecision::Allow));
    }

    #[test]
    fn legacy_decision_overrides_explicit_permission() {
        let output: PreToolUseOutput = serde_json::from_value(json!({
            "decision": "block",
            "reason": "protected path",
            "hookSpecificOutput": {"permissionDecision": "allow", "permissionDecisionReason": "fine"}
        }))
        .unwrap();
        let output = output.normalized();
        assert_eq!(output.permission(), Some(PermissionDecision::Deny));
        assert_eq!(output.permission_reason(), Some("protected path"));

        let output: PreToolUseOutput = serde_json::from_value(json!({
            "decision": "approve",
            "hookSpecificOutput": {"permissionDecision": "ask", "permissionDecisionReason": "sure?"}
        }))
        .unwrap();
        let output = output.normalized();
        assert_eq!(output.permission(), Some(PermissionDecision::Allow));
        assert_eq!(output.permission_reason(), None);
    }

    #[test]
    fn context_normalization() {
        assert_eq!(InjectedContext::from_texts(vec![]), None);
        assert_eq!(
            InjectedContext::from_texts(vec!["A".into()]),
            Some(InjectedContext::One("A".into()))
        );
        let many = InjectedContext::from_texts(vec!["A".into(), "B".into()]).unwrap();
        assert_eq!(many.texts(), ["A".to_string(), "B".to_string()]);
        assert_eq!(serde_json::to_value(&many).unwrap(), json!(["A", "B"]));
    }
}
