//! Interactive permission decisions.
//!
//! Hooks vote `allow`, `ask` or `deny` on each tool call. An `ask` outcome, and every
//! plan a model submits for review, is put to an [`AskHandler`], typically a terminal
//! prompt or a UI dialog.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// A pre-tool permission vote. Ordered by strictness: `Allow < Ask < Deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow,
    Ask,
    Deny,
}

impl fmt::Display for PermissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionDecision::Allow => write!(f, "allow"),
            PermissionDecision::Ask => write!(f, "ask"),
            PermissionDecision::Deny => write!(f, "deny"),
        }
    }
}

/// Handler for questions put to the human. Returns true to allow.
pub trait AskHandler: Send + Sync {
    /// A hook asked for confirmation before running `tool_name`.
    fn handle<'a>(
        &'a self,
        prompt: &'a str,
        tool_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    /// A model asks to leave planning mode with `plan`.
    fn review_plan<'a>(&'a self, plan: &'a str) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        self.handle(plan, PLAN_REVIEW)
    }
}

/// Tool name passed to [`AskHandler::handle`] by the default plan review.
pub const PLAN_REVIEW: &str = "plan_review";

/// Denies everything. The default when no interactive handler is provided.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoDenyHandler;

impl AskHandler for AutoDenyHandler {
    fn handle<'a>(
        &'a self,
        _prompt: &'a str,
        _tool_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async { false })
    }
}

/// Auto-allow handler for permissive configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAllowHandler;

impl AskHandler for AutoAllowHandler {
    fn handle<'a>(
        &'a self,
        _prompt: &'a str,
        _tool_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async { true })
    }
}
