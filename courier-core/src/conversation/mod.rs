//! Conversation Turn Ledger
//!
//! Bounded, per-conversation history of role-tagged turns.
//!
//! # Features
//!
//! - Immutable [`Turn`] values with non-empty content
//! - Window enforcement with pairwise eviction of the oldest turns
//! - Per-key serialization through [`ConversationGuard`]
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_core::conversation::{ConversationKey, Role, TurnLedger};
//!
//! let ledger = TurnLedger::new(8);
//! let key = ConversationKey::from("chat-1");
//! ledger.append(&key, Role::User, "Hello!").await?;
//! ledger.append(&key, Role::Assistant, "Hi there! How can I help?").await?;
//!
//! let turns = ledger.get(&key).await;
//! ```

mod history;
mod ledger;
mod turn;

pub use history::ConversationHistory;
pub use ledger::{ConversationGuard, ConversationKey, TurnLedger};
pub use turn::{Role, Turn};
