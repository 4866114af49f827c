//! Keep-trying-forever wrapper around model calls.
//!
//! Model failures are transient infrastructure trouble from the engine's point of
//! view. They are retried with exponential backoff, capped, and never surfaced.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::LanguageModel;
use crate::types::{AssistantTurn, ToolDefinition, TranscriptEntry};

/// Backoff between model call attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the first failure
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retrying after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Call the model until it answers.
pub async fn complete_with_retry(
    client: &dyn LanguageModel,
    retry: &RetryConfig,
    model: &str,
    system: &str,
    transcript: &[TranscriptEntry],
    tools: &[ToolDefinition],
) -> AssistantTurn {
    let mut attempt: u32 = 0;
    loop {
        match client.complete(model, system, transcript, tools).await {
            Ok(turn) => return turn,
            Err(e) => {
                attempt = attempt.saturating_add(1);
                let delay = retry.delay_for(attempt);
                warn!(
                    model,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Model call failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
