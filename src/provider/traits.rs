use async_trait::async_trait;

use crate::error::WeaveResult;
use crate::types::{AssistantTurn, ToolDefinition, TranscriptEntry};

/// A language model endpoint.
///
/// The engine only needs one non-streaming call: given a system prompt, a transcript
/// and the tools on offer, produce the next assistant turn. Wire formats, auth and
/// streaming belong to the implementation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        transcript: &[TranscriptEntry],
        tools: &[ToolDefinition],
    ) -> WeaveResult<AssistantTurn>;
}
