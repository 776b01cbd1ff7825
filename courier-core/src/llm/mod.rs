use async_trait::async_trait;

use crate::conversation::Turn;
use crate::error::Result;

/// Stateless wrapper around an external completion endpoint.
///
/// One call is one network round trip. Implementations must not retry on
/// their own; the continuation loop is the only retry-like mechanism and it
/// retries for completeness, not for failure recovery.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete a conversation.
    ///
    /// # Arguments
    ///
    /// * `turns` - Non-empty ordered turns (system turn first, then the window)
    /// * `max_tokens` - Positive token ceiling for this call
    ///
    /// # Returns
    ///
    /// The first choice's text, verbatim
    ///
    /// # Errors
    ///
    /// * `Upstream` when the provider reports a structured error
    /// * `MalformedResponse` when the response has no usable choice
    /// * `Transport` on network failure, timeout or bare non-2xx status
    async fn complete(&self, turns: &[Turn], max_tokens: u32) -> Result<String>;

    /// Get model information
    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "unknown".to_string(),
            model_name: "unknown".to_string(),
        }
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub provider: String,
    pub model_name: String,
}

pub mod providers;
pub mod scripted;

pub use providers::OpenAICompatibleClient;
pub use scripted::{RecordedCall, ScriptedCompletionClient};
