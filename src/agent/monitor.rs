//! Response-acceptance monitors.
//!
//! A monitor reviews each utterance of the agent it watches and may veto it. The
//! default [`JudgeMonitor`] asks a judge agent, attached with the `hook` built-in,
//! to read the latest request/response pair and call `reject` if it falls short.
//! The judge works in scratch space: its transcript is cut back after every review,
//! keeping only the notes it chose to `remember`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{BoxFuture, Engine};
use crate::error::{WeaveError, WeaveResult};
use crate::hook::HookPipeline;
use crate::provenance::{CauseRef, Provenance, ProvenanceString};
use crate::session::{AgentState, MonitorSpec, Session};
use crate::tool::{Tool, ToolOutput, ToolRegistry};
use crate::types::{AgentId, ToolCallRequest, ToolDefinition, TranscriptEntry};

/// Name of judge agents created by the `hook` built-in.
pub const JUDGE_NAME: &str = "hook_";

pub const JUDGE_SYSTEM: &str = "Your job is to evaluate the most recent request/response pair in a log, and to check
if the response is acceptable. The requirements for a response to be acceptable are provided below.
- If the response is acceptable, simply respond OK.
- If the response is unacceptable, use the reject tool to mark it as unacceptable.
";

const SEED_CALL_ID: &str = "ephemeral1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(String),
}

/// Decides whether an utterance stands.
pub trait ResponseMonitor: Send + Sync {
    /// Review the latest utterance of `agent` on behalf of `monitor`.
    fn review<'a>(
        &'a self,
        engine: &'a Engine,
        session: &'a mut Session,
        agent: AgentId,
        monitor: &'a MonitorSpec,
    ) -> BoxFuture<'a, WeaveResult<Verdict>>;
}

/// Runs the monitor's judge agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct JudgeMonitor;

impl ResponseMonitor for JudgeMonitor {
    fn review<'a>(
        &'a self,
        engine: &'a Engine,
        session: &'a mut Session,
        agent: AgentId,
        monitor: &'a MonitorSpec,
    ) -> BoxFuture<'a, WeaveResult<Verdict>> {
        Box::pin(judge(engine, session, agent, monitor))
    }
}

#[derive(Debug, Default)]
struct JudgeNotes {
    rejection: Option<String>,
    remembered: Vec<String>,
}

async fn judge(
    engine: &Engine,
    session: &mut Session,
    agent: AgentId,
    monitor: &MonitorSpec,
) -> WeaveResult<Verdict> {
    let snapshot = Arc::new(session.agent(agent)?.clone());
    let utterance = snapshot.last_message_id();
    let scratch_start = session.agent(monitor.judge)?.transcript().len();
    let notes = Arc::new(Mutex::new(JudgeNotes::default()));

    session.harken(monitor.judge, monitor.instructions.as_str())?;
    let read = ToolCallRequest::new(SEED_CALL_ID, READ_LOG, json!({"n": -1}));
    let seed = session.append(
        monitor.judge,
        TranscriptEntry::assistant_with_calls(
            "Reading the last request/response pair",
            vec![read.clone()],
        ),
        Provenance::Novel,
    )?;
    let recalled = read_log(&snapshot, -1);
    session.append_tool_result(
        monitor.judge,
        TranscriptEntry::tool_result(&read, recalled.text(), recalled.is_error),
        Provenance::Cause(CauseRef::tool_call(seed, SEED_CALL_ID).into()),
        seed,
    )?;

    let tools = ToolRegistry::new()
        .with(RejectTool {
            notes: notes.clone(),
        })
        .with(ReadLogTool {
            snapshot: snapshot.clone(),
        })
        .with(RememberTool {
            notes: notes.clone(),
        });
    let judged = engine
        .scoped(tools)
        .with_hooks(HookPipeline::new())
        .respond(session, monitor.judge, None)
        .await;

    session.truncate(monitor.judge, scratch_start, utterance.map(Into::into))?;
    let judgement = judged?;
    debug!(judge = %monitor.judge, judgement = %judgement, "judge finished");

    let mut notes = notes.lock().await;
    if !notes.remembered.is_empty() {
        let kept = notes
            .remembered
            .drain(..)
            .map(|n| format!("- {n}"))
            .collect::<Vec<_>>()
            .join("\n");
        session.harken(
            monitor.judge,
            ProvenanceString::novel(format!("Notes from earlier reviews:\n{kept}")),
        )?;
    }

    Ok(match notes.rejection.take() {
        Some(reason) => {
            info!(agent = %agent, judge = %monitor.judge, reason = %reason, "response rejected");
            Verdict::Reject(reason)
        }
        None => Verdict::Accept,
    })
}

const REJECT: &str = "reject";
const READ_LOG: &str = "read_log";
const REMEMBER: &str = "remember";

fn string_arg(arguments: &Value, key: &str) -> WeaveResult<String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| WeaveError::Contract(format!("Missing string argument: {key}")))
}

fn read_log(snapshot: &AgentState, n: i64) -> ToolOutput {
    match snapshot
        .recall(n)
        .and_then(|recall| Ok(serde_json::to_string(&recall)?))
    {
        Ok(text) => ToolOutput::success(text),
        Err(e) => ToolOutput::error(e.to_string()),
    }
}

struct RejectTool {
    notes: Arc<Mutex<JudgeNotes>>,
}

#[async_trait]
impl Tool for RejectTool {
    fn name(&self) -> &str {
        REJECT
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: REJECT.into(),
            description: "Use this tool to mark a response as unacceptable.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "The reason why this response is unacceptable, and a reminder of what is acceptable"
                    }
                },
                "required": ["reason"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: Value) -> WeaveResult<ToolOutput> {
        let reason = string_arg(&arguments, "reason")?;
        self.notes.lock().await.rejection = Some(reason);
        Ok(ToolOutput::success("response status: denied"))
    }
}

struct ReadLogTool {
    snapshot: Arc<AgentState>,
}

#[async_trait]
impl Tool for ReadLogTool {
    fn name(&self) -> &str {
        READ_LOG
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: READ_LOG.into(),
            description: "This tool reads a request/response pair from the log.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "n": {
                        "type": "integer",
                        "description": "Which pair to read; negative values count from the end"
                    }
                },
                "required": ["n"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: Value) -> WeaveResult<ToolOutput> {
        let n = arguments.get("n").and_then(|v| v.as_i64()).unwrap_or(-1);
        Ok(read_log(&self.snapshot, n))
    }
}

struct RememberTool {
    notes: Arc<Mutex<JudgeNotes>>,
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        REMEMBER
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: REMEMBER.into(),
            description: "Keep a note for future reviews. Everything else you do during this review is forgotten.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {"note": {"type": "string"}},
                "required": ["note"]
            }),
        }
    }

    async fn execute(&self, _call_id: &str, arguments: Value) -> WeaveResult<ToolOutput> {
        let note = string_arg(&arguments, "note")?;
        self.notes.lock().await.remembered.push(note);
        Ok(ToolOutput::success("Noted."))
    }
}
