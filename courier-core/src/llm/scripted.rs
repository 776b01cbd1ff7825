//! Scripted completion client for deterministic offline runs
//!
//! Returns predetermined replies in order and records every request, so
//! controller and handler behavior can be exercised without a provider.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::conversation::Turn;
use crate::error::{CourierError, Result};

use super::{CompletionClient, ModelInfo};

/// One request seen by a [`ScriptedCompletionClient`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub turns: Vec<Turn>,
    pub max_tokens: u32,
}

/// Completion client that replays a script of results
#[derive(Debug, Default)]
pub struct ScriptedCompletionClient {
    script: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedCompletionClient {
    /// Create a client that returns `replies` in order, then fails
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a client that always returns the same reply
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Default::default()
        }
    }

    /// Queue a reply
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.lock_script().push_back(Ok(reply.into()));
        self
    }

    /// Queue a failure
    pub fn then_fail(self, error: CourierError) -> Self {
        self.lock_script().push_back(Err(error));
        self
    }

    /// Requests seen so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of requests seen so far
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, turns: &[Turn], max_tokens: u32) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                turns: turns.to_vec(),
                max_tokens,
            });

        if let Some(next) = self.lock_script().pop_front() {
            return next;
        }

        self.fallback
            .clone()
            .ok_or_else(|| CourierError::Other("completion script exhausted".to_string()))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "scripted".to_string(),
            model_name: "none".to_string(),
        }
    }
}
