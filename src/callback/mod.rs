//! Tools that hand work back to the engine.
//!
//! A tool may answer with a single JSON text block describing work it wants the
//! engine to do on its behalf: run a nested agent, run a shell command, or ask the
//! human to approve a plan. The block is classified once, at the tool-result
//! boundary, into a [`ToolResultKind`].

pub mod shell;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WeaveResult;
use crate::tool::ToolOutput;

pub use shell::{ShellOutcome, ShellRunner, ShellStatus};

/// Seconds a shell delegation may run when it names no timeout.
pub const DEFAULT_SHELL_TIMEOUT_SECS: f64 = 12.0;

/// Text that a cheaper model condenses before the nested agent sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredigestItem {
    /// Shown to the human while the digest runs
    pub digest_description: String,
    pub system_content: Vec<String>,
    pub user_content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Predigest(PredigestItem),
}

/// Run a nested agent and use its final utterance as the tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDelegation {
    #[serde(default)]
    pub subagent_type: Option<String>,
    pub callback_description: String,
    /// Tool subset for the nested agent. `None` means every tool; unknown names
    /// are ignored.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    pub system_content: Vec<String>,
    pub user_content: Vec<UserContent>,
}

/// Run a shell command and use its output as the tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellDelegation {
    pub command: String,
    #[serde(default)]
    pub callback_description: Option<String>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl ShellDelegation {
    /// The requested timeout, or `default_secs` when the request is missing or
    /// not a representable positive duration. Returns the seconds echoed to the
    /// model alongside the duration actually enforced.
    pub fn timeout(&self, default_secs: f64) -> (f64, Duration) {
        [self.timeout, Some(default_secs)]
            .into_iter()
            .flatten()
            .find_map(|secs| positive_duration(secs).map(|d| (secs, d)))
            .unwrap_or((
                DEFAULT_SHELL_TIMEOUT_SECS,
                Duration::from_secs(DEFAULT_SHELL_TIMEOUT_SECS as u64),
            ))
    }
}

/// `secs` as a `Duration`, if it is positive and fits.
pub fn positive_duration(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Ask the human to approve a plan and leave planning mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDelegation {
    pub plan: String,
    pub text_on_accept: String,
    pub text_on_reject: String,
}

/// The wire form of a delegation, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delegation {
    AgentCallback(AgentDelegation),
    BashCallback(ShellDelegation),
    PlanCallback(PlanDelegation),
}

impl Delegation {
    /// The tool output that asks the engine for this delegation.
    pub fn to_tool_output(&self) -> WeaveResult<ToolOutput> {
        Ok(ToolOutput::success(serde_json::to_string(self)?))
    }
}

impl From<AgentDelegation> for Delegation {
    fn from(d: AgentDelegation) -> Self {
        Delegation::AgentCallback(d)
    }
}

impl From<ShellDelegation> for Delegation {
    fn from(d: ShellDelegation) -> Self {
        Delegation::BashCallback(d)
    }
}

impl From<PlanDelegation> for Delegation {
    fn from(d: PlanDelegation) -> Self {
        Delegation::PlanCallback(d)
    }
}

/// What a raw tool result turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResultKind {
    PlainText(ToolOutput),
    Agent(AgentDelegation),
    Shell(ShellDelegation),
    Plan(PlanDelegation),
}

impl ToolResultKind {
    /// Only a successful result made of exactly one block that parses as a
    /// delegation is one. Anything else, including near misses, is plain text.
    pub fn classify(output: ToolOutput) -> Self {
        if output.is_error || output.blocks.len() != 1 || !output.blocks[0].starts_with('{') {
            return ToolResultKind::PlainText(output);
        }
        match serde_json::from_str::<Delegation>(&output.blocks[0]) {
            Ok(Delegation::AgentCallback(d)) => ToolResultKind::Agent(d),
            Ok(Delegation::BashCallback(d)) => ToolResultKind::Shell(d),
            Ok(Delegation::PlanCallback(d)) => ToolResultKind::Plan(d),
            Err(_) => ToolResultKind::PlainText(output),
        }
    }

    pub fn is_delegation(&self) -> bool {
        !matches!(self, ToolResultKind::PlainText(_))
    }
}
