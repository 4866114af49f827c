//! # weave-core
//!
//! Agentic execution engine: an agent loop that drives language models through tool
//! calls, a hook pipeline with a field-wise merge algebra, an event-sourced session
//! log that records where every piece of text came from, and callback delegation
//! that lets tools hand work back to the engine.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use weave_core::agent::{Engine, Submission};
//! use weave_core::session::{Session, SessionStore};
//! use weave_core::tool::ToolRegistry;
//! # async fn run(model: Arc<dyn weave_core::provider::LanguageModel>) -> weave_core::WeaveResult<()> {
//! let store = SessionStore::new("./sessions");
//! let mut session: Session = store.resume_or_create().await?;
//!
//! let engine = Engine::new(model, ToolRegistry::new());
//! let agent = engine.start(&mut session, "assistant")?;
//! if let Submission::Responded(reply) = engine.submit(&mut session, agent, "hello").await? {
//!     println!("{reply}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`agent`] | The loop: model turns, tool dispatch, monitors, built-in `task`/`discuss`/`hook` |
//! | [`hook`] | `UserPromptSubmit`/`PreToolUse`/`PostToolUse` hooks and their merge strategies |
//! | [`callback`] | Delegations a tool result can request: nested agent, shell command, plan review |
//! | [`session`] | Agent arena mirrored into a JSONL event log; replay and export |
//! | [`provenance`] | Strings that remember the logged message they came from or were caused by |
//! | [`provider`] | `LanguageModel` trait and retry-forever backoff |
//! | [`tool`] | Async tool trait and registry |
//! | [`permission`] | Allow/ask/deny decisions and the human-facing `AskHandler` |
//! | [`config`] | TOML engine configuration |
//! | [`error`] | `WeaveError` with thiserror |

pub mod agent;
pub mod callback;
pub mod config;
pub mod error;
pub mod hook;
pub mod permission;
pub mod provenance;
pub mod provider;
pub mod session;
pub mod tool;
pub mod types;

pub use error::{WeaveError, WeaveResult};
pub use types::*;
