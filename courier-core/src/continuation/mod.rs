//! Continuation Controller
//!
//! Runs one inbound message through the completion client, asking for more
//! text while the reply looks cut off, and records the exchange in the
//! turn ledger once it succeeds.
//!
//! # Flow
//!
//! 1. Ignore empty input
//! 2. Lock the conversation, stage the user turn, classify the message
//! 3. Call the client with `[system, ..window]` and the policy's budget
//! 4. While the kind's truncation strategy says "cut off" and the
//!    continuation bound allows, request a continuation and append it
//! 5. Commit the user and assistant turns together
//!
//! Any client failure aborts the whole operation and leaves the ledger
//! untouched: the staged user turn is only committed alongside a reply.

mod truncation;

pub use truncation::{
    LengthRatio, ReplySnapshot, TerminalPunctuation, TruncationCheck, TruncationConfig,
    TruncationPolicy,
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::budget::{BudgetClassifier, BudgetPolicy, BudgetTable, HeuristicClassifier, QuestionKind};
use crate::config::CourierConfig;
use crate::conversation::{ConversationKey, Turn, TurnLedger};
use crate::error::{CourierError, Result};
use crate::llm::CompletionClient;

/// Default bound on follow-up calls per inbound message
pub const DEFAULT_MAX_CONTINUATIONS: usize = 3;

/// Synthetic user instruction asking the provider to carry on
pub fn continuation_instruction(kind: QuestionKind) -> &'static str {
    match kind {
        QuestionKind::Code => {
            "Continue the remaining code exactly where you stopped. Do not repeat what you already wrote."
        }
        QuestionKind::Short => "Complete the sentence in one sentence.",
        QuestionKind::Long => "Continue exactly where you stopped and finish the answer.",
    }
}

/// Join a continuation onto the text assembled so far: a newline for code,
/// a single space for prose.
pub fn join_segments(kind: QuestionKind, head: &str, tail: &str) -> String {
    match kind {
        QuestionKind::Code => {
            let head = head.trim_end_matches(['\n', '\r']);
            let tail = tail.trim_start_matches(['\n', '\r']);
            format!("{}\n{}", head, tail)
        }
        QuestionKind::Long | QuestionKind::Short => {
            format!("{} {}", head.trim_end(), tail.trim())
        }
    }
}

/// Why the continuation loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The truncation check passed
    Complete,
    /// The continuation bound was reached while the reply still looked cut off
    BudgetExceeded,
}

/// Result of handling one inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationOutcome {
    /// Final assembled reply (trimmed)
    pub reply: String,
    /// Policy chosen for the inbound message
    pub policy: BudgetPolicy,
    /// Follow-up calls made after the first completion
    pub continuations: usize,
    /// Why the loop stopped
    pub stop: StopReason,
}

impl ContinuationOutcome {
    /// Total completion calls made for this message
    pub fn calls(&self) -> usize {
        self.continuations + 1
    }
}

/// Orchestrates completion calls for inbound messages
pub struct ContinuationController {
    ledger: Arc<TurnLedger>,
    classifier: Arc<dyn BudgetClassifier>,
    client: Arc<dyn CompletionClient>,
    truncation: TruncationPolicy,
    budgets: BudgetTable,
    max_continuations: usize,
    system_turn: Turn,
}

impl ContinuationController {
    /// Create a controller with default budgets, truncation policy and bound.
    ///
    /// # Errors
    ///
    /// Returns an error if `system_prompt` is empty.
    pub fn new(
        ledger: Arc<TurnLedger>,
        client: Arc<dyn CompletionClient>,
        system_prompt: impl Into<String>,
    ) -> Result<Self> {
        let budgets = BudgetTable::default();
        Ok(Self {
            ledger,
            classifier: Arc::new(HeuristicClassifier::new(budgets.clone())),
            client,
            truncation: TruncationPolicy::default(),
            budgets,
            max_continuations: DEFAULT_MAX_CONTINUATIONS,
            system_turn: Turn::system(system_prompt).map_err(|_| {
                CourierError::Configuration("system prompt must not be empty".to_string())
            })?,
        })
    }

    /// Build a controller and a fresh ledger from configuration
    pub fn from_config(config: &CourierConfig, client: Arc<dyn CompletionClient>) -> Result<Self> {
        let ledger = Arc::new(TurnLedger::new(config.conversation.window_size));
        Ok(
            Self::new(ledger, client, config.conversation.system_prompt.clone())?
                .with_budgets(config.budgets.clone())
                .with_truncation(TruncationPolicy::new(&config.truncation))
                .with_max_continuations(config.conversation.max_continuations),
        )
    }

    /// Set budgets; also resets the classifier to the heuristic one over them
    pub fn with_budgets(mut self, budgets: BudgetTable) -> Self {
        self.classifier = Arc::new(HeuristicClassifier::new(budgets.clone()));
        self.budgets = budgets;
        self
    }

    /// Swap the classification strategy
    pub fn with_classifier(mut self, classifier: Arc<dyn BudgetClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_truncation(mut self, truncation: TruncationPolicy) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn with_max_continuations(mut self, max_continuations: usize) -> Self {
        self.max_continuations = max_continuations;
        self
    }

    pub fn ledger(&self) -> &Arc<TurnLedger> {
        &self.ledger
    }

    pub fn classifier(&self) -> &Arc<dyn BudgetClassifier> {
        &self.classifier
    }

    pub fn max_continuations(&self) -> usize {
        self.max_continuations
    }

    /// Handle one inbound message for a conversation.
    ///
    /// Returns `Ok(None)` for empty or whitespace-only text. Concurrent calls
    /// for the same key are serialized; other keys are unaffected.
    ///
    /// # Errors
    ///
    /// Propagates the client's error on the first call or on any
    /// continuation; nothing is recorded in the ledger in that case.
    pub async fn handle(
        &self,
        key: &ConversationKey,
        text: &str,
    ) -> Result<Option<ContinuationOutcome>> {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!(key = %key, "Ignoring empty message");
            return Ok(None);
        }

        let user_turn = Turn::user(text)?;
        let mut conversation = self.ledger.lock(key).await;

        let policy = self.classifier.classify(text);
        let mut request = Vec::with_capacity(self.ledger.window_size() * 2 + 1);
        request.push(self.system_turn.clone());
        request.extend(conversation.window_with(&user_turn));

        tracing::info!(
            key = %key,
            kind = %policy.kind,
            max_tokens = policy.max_tokens,
            window = request.len() - 1,
            "Requesting completion"
        );

        let first = self.client.complete(&request, policy.max_tokens).await?;
        let (assembled, continuations, stop) = self.assemble(key, &request, policy, first).await?;

        let reply = assembled.trim().to_string();
        if reply.is_empty() {
            return Err(CourierError::MalformedResponse(
                "completion contained no text".to_string(),
            ));
        }

        if stop == StopReason::BudgetExceeded {
            tracing::warn!(
                key = %key,
                kind = %policy.kind,
                continuations,
                "Continuation bound reached, returning best reply so far"
            );
        }

        conversation.commit([user_turn, Turn::assistant(reply.clone())?]);

        tracing::info!(
            key = %key,
            continuations,
            reply_chars = reply.chars().count(),
            "Reply assembled"
        );

        Ok(Some(ContinuationOutcome {
            reply,
            policy,
            continuations,
            stop,
        }))
    }

    /// Extend `first` until it no longer looks truncated or the bound is hit.
    async fn assemble(
        &self,
        key: &ConversationKey,
        base: &[Turn],
        policy: BudgetPolicy,
        first: String,
    ) -> Result<(String, usize, StopReason)> {
        let check = self.truncation.check_for(policy.kind);
        let mut truncated = check.is_truncated(&ReplySnapshot {
            assembled: &first,
            latest: &first,
            budget: policy.max_tokens,
        });
        let mut assembled = first;
        let mut continuations = 0;

        for iteration in 0..self.max_continuations {
            if !truncated {
                break;
            }

            let budget = self.budgets.continuation(policy.kind);
            let mut request = Vec::with_capacity(base.len() + 2);
            request.extend_from_slice(base);
            request.push(Turn::assistant(assembled.clone())?);
            request.push(Turn::user(continuation_instruction(policy.kind))?);

            tracing::debug!(
                key = %key,
                iteration,
                strategy = check.name(),
                budget,
                "Reply looks truncated, requesting continuation"
            );

            let segment = self.client.complete(&request, budget).await?;
            assembled = join_segments(policy.kind, &assembled, &segment);
            continuations += 1;

            truncated = check.is_truncated(&ReplySnapshot {
                assembled: &assembled,
                latest: &segment,
                budget,
            });
        }

        let stop = if truncated {
            StopReason::BudgetExceeded
        } else {
            StopReason::Complete
        };
        Ok((assembled, continuations, stop))
    }
}
