//! Budget classification for inbound messages
//!
//! A [`BudgetClassifier`] maps raw message text to a [`BudgetPolicy`]: the
//! token ceiling for the first completion call plus a [`QuestionKind`] tag
//! that selects which truncation heuristic and continuation wording apply.

use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::error::{CourierError, Result};

/// Messages longer than this (in characters, after trimming) are `Long`
pub const LONG_MESSAGE_THRESHOLD: usize = 120;

/// Fenced code block marker
const CODE_FENCE: &str = "```";

/// Declaration shapes from a handful of common languages. Heuristic only:
/// false negatives are fine, false positives should stay rare.
const CODE_PATTERNS: &[&str] = &[
    // Python
    r"(?m)^\s*def\s+\w+\s*\([^)]*\)\s*(->\s*[^:\n]+)?:",
    r"(?m)^\s*class\s+\w+\s*(\([^)]*\))?\s*:\s*$",
    r"(?m)^\s*for\s+\w+(\s*,\s*\w+)*\s+in\s+[^\n:]+:\s*$",
    // JavaScript / TypeScript
    r"\bfunction\s*\w*\s*\([^)]*\)\s*\{",
    r"\)\s*=>\s*\{",
    r"\bconsole\.log\s*\(",
    // C family loops: a body brace, or a header with `;` or a comparison
    r"\b(for|while)\s*\([^)]*\)\s*\{",
    r"\b(for|while)\s*\([^)]*(;|[<>]=?|[!=]=)[^)]*\)",
    r"(?m)^\s*#include\s*[<\x22]",
    // Rust
    r"\bfn\s+\w+\s*(<[^>]*>)?\s*\(",
    // Java / C#
    r"\bpublic\s+(static\s+)?(void|int|String|boolean)\s+\w+\s*\(",
    // Class bodies
    r"\bclass\s+\w+\s*(extends\s+\w+\s*)?\{",
];

static DEFAULT_CODE_PATTERNS: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(CODE_PATTERNS).expect("built-in code patterns are valid"));

/// Coarse content kind of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Code,
    Long,
    Short,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Code => "code",
            QuestionKind::Long => "long",
            QuestionKind::Short => "short",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token ceiling and kind tag derived from one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetPolicy {
    pub kind: QuestionKind,
    pub max_tokens: u32,
}

/// Per-kind token budgets for first and follow-up completion calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetTable {
    /// First-call budget for code questions
    pub code: u32,
    /// First-call budget for long prose questions
    pub long: u32,
    /// First-call budget for short prose questions
    pub short: u32,
    /// Budget for each code continuation
    pub code_continuation: u32,
    /// Budget for each long-prose continuation
    pub long_continuation: u32,
    /// Budget for finishing a short answer's last sentence
    pub short_continuation: u32,
}

impl Default for BudgetTable {
    fn default() -> Self {
        Self {
            code: 300,
            long: 150,
            short: 50,
            code_continuation: 300,
            long_continuation: 150,
            short_continuation: 20,
        }
    }
}

impl BudgetTable {
    /// First-call budget for a kind
    pub fn initial(&self, kind: QuestionKind) -> u32 {
        match kind {
            QuestionKind::Code => self.code,
            QuestionKind::Long => self.long,
            QuestionKind::Short => self.short,
        }
    }

    /// Follow-up budget for a kind
    pub fn continuation(&self, kind: QuestionKind) -> u32 {
        match kind {
            QuestionKind::Code => self.code_continuation,
            QuestionKind::Long => self.long_continuation,
            QuestionKind::Short => self.short_continuation,
        }
    }

    /// Reject zero budgets
    pub fn validate(&self) -> Result<()> {
        let entries = [
            ("code", self.code),
            ("long", self.long),
            ("short", self.short),
            ("code_continuation", self.code_continuation),
            ("long_continuation", self.long_continuation),
            ("short_continuation", self.short_continuation),
        ];

        for (name, value) in entries {
            if value == 0 {
                return Err(CourierError::Configuration(format!(
                    "budgets.{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Strategy for choosing a budget policy from message text.
///
/// Implementations must be deterministic: the same text always yields the
/// same policy.
pub trait BudgetClassifier: Send + Sync {
    fn classify(&self, text: &str) -> BudgetPolicy;
}

/// Pattern-based classifier: code markers first, then length.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier {
    table: BudgetTable,
}

impl HeuristicClassifier {
    pub fn new(table: BudgetTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &BudgetTable {
        &self.table
    }

    /// Kind of a message, independent of the budget table
    pub fn kind_of(text: &str) -> QuestionKind {
        if looks_like_code(text) {
            QuestionKind::Code
        } else if text.trim().chars().count() > LONG_MESSAGE_THRESHOLD {
            QuestionKind::Long
        } else {
            QuestionKind::Short
        }
    }
}

impl BudgetClassifier for HeuristicClassifier {
    fn classify(&self, text: &str) -> BudgetPolicy {
        let kind = Self::kind_of(text);
        BudgetPolicy {
            kind,
            max_tokens: self.table.initial(kind),
        }
    }
}

/// Whether text contains a code fence or a recognizable declaration
pub fn looks_like_code(text: &str) -> bool {
    text.contains(CODE_FENCE) || DEFAULT_CODE_PATTERNS.is_match(text)
}
