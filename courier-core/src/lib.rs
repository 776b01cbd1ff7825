//! # Courier - Chat Relay with Continuation
//!
//! Courier relays chat messages to a hosted text-completion service and
//! sends back assembled replies. Its core is a transport-agnostic
//! conversation continuation engine that:
//! - Keeps a bounded, per-conversation turn history
//! - Classifies each message to pick a token budget
//! - Detects completions that were cut off mid-thought
//! - Requests follow-up completions within a hard iteration bound
//! - Splits replies into transport-safe chunks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = CourierConfig::load()?;
//!     let client = Arc::new(OpenAICompatibleClient::from_config(&config.provider)?);
//!     let controller = ContinuationController::from_config(&config, client)?;
//!
//!     let key = ConversationKey::from("demo");
//!     if let Some(outcome) = controller.handle(&key, "explain gravity").await? {
//!         for piece in chunk(&outcome.reply, config.transport.chunk_limit) {
//!             println!("{}", piece);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **conversation**: turn ledger with per-key serialization
//! - **budget**: pluggable budget classification
//! - **llm**: completion client trait and the OpenAI-compatible client
//! - **continuation**: truncation strategies and the continuation loop
//! - **chunker**: outbound splitting
//! - **transport** / **handler**: chat-network glue (Telegram long polling)
//! - **dispatch**: per-conversation workers that keep arrival order

pub mod budget;
pub mod chunker;
pub mod config;
pub mod continuation;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod llm;
pub mod transport;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::budget::{
        BudgetClassifier, BudgetPolicy, BudgetTable, HeuristicClassifier, QuestionKind,
    };
    pub use crate::chunker::{DEFAULT_CHUNK_LIMIT, LengthUnit, chunk, chunk_by};
    pub use crate::config::{ConversationConfig, CourierConfig, ProviderConfig, TransportConfig};
    pub use crate::continuation::{
        ContinuationController, ContinuationOutcome, LengthRatio, ReplySnapshot, StopReason,
        TerminalPunctuation, TruncationCheck, TruncationConfig, TruncationPolicy,
    };
    pub use crate::conversation::{
        ConversationGuard, ConversationHistory, ConversationKey, Role, Turn, TurnLedger,
    };
    pub use crate::dispatch::Dispatcher;
    pub use crate::error::{CourierError, Result};
    pub use crate::handler::{Disposition, MessageHandler};
    pub use crate::llm::{
        CompletionClient, ModelInfo, OpenAICompatibleClient, ScriptedCompletionClient,
    };
    pub use crate::transport::{InboundMessage, RecordingTransport, TelegramTransport, Transport};
}
