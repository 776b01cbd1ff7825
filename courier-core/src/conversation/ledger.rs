//! Per-conversation turn store with per-key serialization

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::Result;

use super::history::ConversationHistory;
use super::turn::{Role, Turn};

/// Opaque identifier of one chat thread
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ConversationKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<i64> for ConversationKey {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}

/// In-memory turn ledger keyed by conversation.
///
/// The outer map lock is only held to find or create an entry. Each
/// conversation has its own async mutex; holding a [`ConversationGuard`]
/// serializes every read and write for that key while other keys proceed
/// in parallel.
pub struct TurnLedger {
    window_size: usize,
    conversations: RwLock<HashMap<ConversationKey, Arc<Mutex<ConversationHistory>>>>,
}

impl TurnLedger {
    /// Create a ledger whose conversations keep `window_size` exchanges
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            conversations: RwLock::new(HashMap::new()),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Acquire exclusive access to one conversation, creating it lazily
    pub async fn lock(&self, key: &ConversationKey) -> ConversationGuard {
        let entry = self.entry(key).await;
        ConversationGuard {
            key: key.clone(),
            history: entry.lock_owned().await,
        }
    }

    /// Append a single turn, enforcing the window
    pub async fn append(
        &self,
        key: &ConversationKey,
        role: Role,
        content: impl Into<String>,
    ) -> Result<()> {
        let turn = Turn::new(role, content)?;
        let mut guard = self.lock(key).await;
        guard.push(turn);
        Ok(())
    }

    /// Current turns for a conversation, oldest first. Empty if unseen.
    pub async fn get(&self, key: &ConversationKey) -> Vec<Turn> {
        let entry = self.conversations.read().await.get(key).cloned();
        match entry {
            Some(history) => history.lock().await.turns().to_vec(),
            None => Vec::new(),
        }
    }

    /// Number of stored turns for a conversation
    pub async fn len(&self, key: &ConversationKey) -> usize {
        let entry = self.conversations.read().await.get(key).cloned();
        match entry {
            Some(history) => history.lock().await.len(),
            None => 0,
        }
    }

    /// Number of conversations seen so far
    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }

    async fn entry(&self, key: &ConversationKey) -> Arc<Mutex<ConversationHistory>> {
        if let Some(existing) = self.conversations.read().await.get(key) {
            return existing.clone();
        }

        let mut conversations = self.conversations.write().await;
        conversations
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationHistory::new(self.window_size))))
            .clone()
    }
}

impl Default for TurnLedger {
    fn default() -> Self {
        Self::new(8)
    }
}

/// Exclusive handle on one conversation's history
pub struct ConversationGuard {
    key: ConversationKey,
    history: OwnedMutexGuard<ConversationHistory>,
}

impl ConversationGuard {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn turns(&self) -> &[Turn] {
        self.history.turns()
    }

    /// The window that would result from appending `turn`
    pub fn window_with(&self, turn: &Turn) -> Vec<Turn> {
        self.history.window_with(turn)
    }

    /// Append one turn
    pub fn push(&mut self, turn: Turn) {
        let evicted = self.history.push(turn);
        if evicted > 0 {
            tracing::debug!(key = %self.key, evicted, "Evicted oldest turns");
        }
    }

    /// Append several turns in order while still holding the lock
    pub fn commit(&mut self, turns: impl IntoIterator<Item = Turn>) {
        for turn in turns {
            self.push(turn);
        }
    }
}
