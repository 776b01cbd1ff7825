//! Truncation Heuristics
//!
//! Two named strategies decide whether a completion stopped before finishing
//! its thought. [`TruncationPolicy`] assigns one strategy per question kind:
//! code replies use [`LengthRatio`], prose replies use [`TerminalPunctuation`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::budget::QuestionKind;
use crate::error::{CourierError, Result};

/// What a strategy gets to look at after each completion call
#[derive(Debug, Clone, Copy)]
pub struct ReplySnapshot<'a> {
    /// Everything assembled so far, including `latest`
    pub assembled: &'a str,
    /// Text returned by the most recent call
    pub latest: &'a str,
    /// Token budget of the most recent call
    pub budget: u32,
}

/// Trait for truncation strategies
pub trait TruncationCheck: Send + Sync {
    /// Whether the reply looks cut off
    fn is_truncated(&self, snapshot: &ReplySnapshot<'_>) -> bool;

    /// Get the strategy name
    fn name(&self) -> &'static str;
}

/// Parameters of the length heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    /// Rough characters produced per token
    pub avg_chars_per_token: f64,
    /// Fraction of the budget's character estimate that counts as "hit the ceiling"
    pub ratio: f64,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            avg_chars_per_token: 3.5,
            ratio: 0.9,
        }
    }
}

impl TruncationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.avg_chars_per_token > 0.0) {
            return Err(CourierError::Configuration(
                "truncation.avg_chars_per_token must be positive".to_string(),
            ));
        }
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(CourierError::Configuration(format!(
                "truncation.ratio must be within (0.0, 1.0], got {}",
                self.ratio
            )));
        }
        Ok(())
    }
}

/// Length heuristic: the latest segment is cut off when it used up most of
/// its budget, i.e. `chars(latest) >= ratio * budget * avg_chars_per_token`.
///
/// Only the latest segment is measured against the budget of the call that
/// produced it; a short closing continuation therefore ends the loop.
#[derive(Debug, Clone)]
pub struct LengthRatio {
    avg_chars_per_token: f64,
    ratio: f64,
}

impl LengthRatio {
    pub fn new(config: &TruncationConfig) -> Self {
        Self {
            avg_chars_per_token: config.avg_chars_per_token,
            ratio: config.ratio,
        }
    }

    /// Character count at or above which a segment counts as truncated
    pub fn threshold(&self, budget: u32) -> f64 {
        self.ratio * budget as f64 * self.avg_chars_per_token
    }
}

impl Default for LengthRatio {
    fn default() -> Self {
        Self::new(&TruncationConfig::default())
    }
}

impl TruncationCheck for LengthRatio {
    fn is_truncated(&self, snapshot: &ReplySnapshot<'_>) -> bool {
        let length = snapshot.latest.trim().chars().count();
        length > 0 && length as f64 >= self.threshold(snapshot.budget)
    }

    fn name(&self) -> &'static str {
        "length_ratio"
    }
}

/// Punctuation heuristic: the assembled reply is complete when its trimmed
/// end is `.`, `!`, `?` or a closing code fence. Trailing quotes, brackets
/// and markdown emphasis are skipped before looking. An empty reply is
/// never considered truncated since there is nothing to continue.
#[derive(Debug, Clone, Default)]
pub struct TerminalPunctuation;

impl TruncationCheck for TerminalPunctuation {
    fn is_truncated(&self, snapshot: &ReplySnapshot<'_>) -> bool {
        let trimmed = snapshot.assembled.trim_end();
        if trimmed.is_empty() || trimmed.ends_with("```") {
            return false;
        }

        let core = trimmed.trim_end_matches(|c: char| {
            matches!(c, '"' | '\'' | ')' | ']' | '*' | '_' | '\u{201D}' | '\u{2019}' | '\u{00BB}')
        });
        !core.ends_with(['.', '!', '?'])
    }

    fn name(&self) -> &'static str {
        "terminal_punctuation"
    }
}

/// One truncation strategy per question kind
#[derive(Clone)]
pub struct TruncationPolicy {
    code: Arc<dyn TruncationCheck>,
    long: Arc<dyn TruncationCheck>,
    short: Arc<dyn TruncationCheck>,
}

impl TruncationPolicy {
    /// Length ratio for code, terminal punctuation for prose
    pub fn new(config: &TruncationConfig) -> Self {
        let prose: Arc<dyn TruncationCheck> = Arc::new(TerminalPunctuation);
        Self {
            code: Arc::new(LengthRatio::new(config)),
            long: prose.clone(),
            short: prose,
        }
    }

    /// Replace the strategy used for one kind
    pub fn with_check(mut self, kind: QuestionKind, check: Arc<dyn TruncationCheck>) -> Self {
        match kind {
            QuestionKind::Code => self.code = check,
            QuestionKind::Long => self.long = check,
            QuestionKind::Short => self.short = check,
        }
        self
    }

    pub fn check_for(&self, kind: QuestionKind) -> &dyn TruncationCheck {
        match kind {
            QuestionKind::Code => self.code.as_ref(),
            QuestionKind::Long => self.long.as_ref(),
            QuestionKind::Short => self.short.as_ref(),
        }
    }

    pub fn is_truncated(&self, kind: QuestionKind, snapshot: &ReplySnapshot<'_>) -> bool {
        self.check_for(kind).is_truncated(snapshot)
    }
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self::new(&TruncationConfig::default())
    }
}

impl std::fmt::Debug for TruncationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TruncationPolicy")
            .field("code", &self.code.name())
            .field("long", &self.long.name())
            .field("short", &self.short.name())
            .finish()
    }
}
