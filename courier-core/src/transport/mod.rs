//! Chat Transport
//!
//! The engine never talks to a chat network directly. Inbound events arrive
//! as [`InboundMessage`] values and replies leave through a [`Transport`],
//! one text segment per send.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::chunker::LengthUnit;
use crate::conversation::ConversationKey;
use crate::error::{CourierError, Result};

pub mod telegram;

pub use telegram::TelegramTransport;

/// An inbound chat event. Events without text are no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub key: ConversationKey,
    pub text: Option<String>,
}

impl InboundMessage {
    pub fn new(key: impl Into<ConversationKey>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: Some(text.into()),
        }
    }

    /// An event that carries no text (stickers, photos, joins...)
    pub fn without_text(key: impl Into<ConversationKey>) -> Self {
        Self {
            key: key.into(),
            text: None,
        }
    }
}

/// Outbound side of a chat network
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one text segment to a conversation. Callers keep segments
    /// within the transport's size limit and await each send in order.
    async fn send_text(&self, key: &ConversationKey, text: &str) -> Result<()>;

    /// Get the transport name
    fn name(&self) -> &'static str;

    /// Unit the transport's size limit is counted in
    fn length_unit(&self) -> LengthUnit {
        LengthUnit::Chars
    }
}

/// Transport that records sends in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ConversationKey, String)>>,
    fail_after: Option<usize>,
    length_unit: LengthUnit,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send after the first `sends` succeed
    pub fn failing_after(sends: usize) -> Self {
        Self {
            fail_after: Some(sends),
            ..Self::default()
        }
    }

    /// Measure sends the way a network with this unit does
    pub fn with_length_unit(mut self, unit: LengthUnit) -> Self {
        self.length_unit = unit;
        self
    }

    /// All successful sends, in order
    pub fn sent(&self) -> Vec<(ConversationKey, String)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Texts sent to one conversation, in order
    pub fn sent_to(&self, key: &ConversationKey) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, key: &ConversationKey, text: &str) -> Result<()> {
        let mut sent = self
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.fail_after.is_some_and(|limit| sent.len() >= limit) {
            return Err(CourierError::Transport("send rejected".to_string()));
        }
        sent.push((key.clone(), text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }

    fn length_unit(&self) -> LengthUnit {
        self.length_unit
    }
}
