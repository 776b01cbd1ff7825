//! Inbound message handling
//!
//! Runs one inbound event through the continuation controller and delivers
//! the reply in transport-sized chunks. Failures never escape: the user gets
//! a single apology message and the error is logged.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chunker::{DEFAULT_CHUNK_LIMIT, chunk_by};
use crate::config::CourierConfig;
use crate::continuation::ContinuationController;
use crate::conversation::ConversationKey;
use crate::transport::{InboundMessage, Transport};

/// Command answered with the greeting instead of a completion
pub const START_COMMAND: &str = "/start";

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Disposition {
    /// No text, whitespace only, or an unsupported command
    Ignored,
    /// `/start` was answered with the greeting
    Greeted,
    /// The reply was delivered in `chunks` messages
    Replied { chunks: usize },
    /// Handling failed and the apology was sent
    Apologized { error: String },
    /// A send to the transport failed; later chunks were not sent
    Undelivered { error: String },
}

/// Glue between transport events and the continuation controller
pub struct MessageHandler {
    controller: Arc<ContinuationController>,
    transport: Arc<dyn Transport>,
    chunk_limit: usize,
    apology: String,
    greeting: String,
}

impl MessageHandler {
    pub fn new(controller: Arc<ContinuationController>, transport: Arc<dyn Transport>) -> Self {
        let defaults = CourierConfig::default().conversation;
        Self {
            controller,
            transport,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            apology: defaults.apology,
            greeting: defaults.greeting,
        }
    }

    /// Build a handler with the configured limit and messages
    pub fn from_config(
        config: &CourierConfig,
        controller: Arc<ContinuationController>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(controller, transport)
            .with_chunk_limit(config.transport.chunk_limit)
            .with_apology(config.conversation.apology.clone())
            .with_greeting(config.conversation.greeting.clone())
    }

    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = limit.max(1);
        self
    }

    pub fn with_apology(mut self, apology: impl Into<String>) -> Self {
        self.apology = apology.into();
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    pub fn controller(&self) -> &Arc<ContinuationController> {
        &self.controller
    }

    /// Handle one inbound event end to end
    pub async fn handle(&self, message: InboundMessage) -> Disposition {
        let key = message.key;
        let Some(text) = message.text.filter(|t| !t.trim().is_empty()) else {
            tracing::debug!(key = %key, "Ignoring message without text");
            return Disposition::Ignored;
        };

        match command_name(&text) {
            Some(START_COMMAND) => {
                tracing::info!(key = %key, "Start command received");
                return match self.transport.send_text(&key, &self.greeting).await {
                    Ok(()) => Disposition::Greeted,
                    Err(e) => self.undelivered(&key, e.to_string()),
                };
            }
            Some(command) => {
                tracing::debug!(key = %key, command, "Ignoring unsupported command");
                return Disposition::Ignored;
            }
            None => {}
        }

        tracing::info!(key = %key, chars = text.chars().count(), "Received message");

        match self.controller.handle(&key, &text).await {
            Ok(Some(outcome)) => self.deliver(&key, &outcome.reply).await,
            Ok(None) => Disposition::Ignored,
            Err(e) => {
                tracing::error!(key = %key, kind = e.kind(), error = %e, "Failed to produce reply");
                match self.transport.send_text(&key, &self.apology).await {
                    Ok(()) => Disposition::Apologized {
                        error: e.to_string(),
                    },
                    Err(send_error) => self.undelivered(&key, send_error.to_string()),
                }
            }
        }
    }

    /// Send chunks strictly in order; stop at the first failed send
    async fn deliver(&self, key: &ConversationKey, reply: &str) -> Disposition {
        let chunks = chunk_by(reply, self.chunk_limit, self.transport.length_unit());
        let total = chunks.len();

        for (index, piece) in chunks.iter().enumerate() {
            if let Err(e) = self.transport.send_text(key, piece).await {
                tracing::error!(
                    key = %key,
                    chunk = index,
                    total,
                    error = %e,
                    "Failed to send reply chunk"
                );
                return Disposition::Undelivered {
                    error: e.to_string(),
                };
            }
        }

        tracing::debug!(key = %key, chunks = total, transport = self.transport.name(), "Reply sent");
        Disposition::Replied { chunks: total }
    }

    fn undelivered(&self, key: &ConversationKey, error: String) -> Disposition {
        tracing::error!(key = %key, error = %error, "Failed to send message");
        Disposition::Undelivered { error }
    }
}

/// Bot command at the start of `text`, without any `@botname` suffix
pub fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let name = first.split('@').next().unwrap_or(first);
    let is_command = name.len() > 1
        && name.starts_with('/')
        && name[1..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_command.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::LengthUnit;
    use crate::conversation::TurnLedger;
    use crate::error::CourierError;
    use crate::llm::ScriptedCompletionClient;
    use crate::transport::RecordingTransport;

    fn handler(
        client: Arc<ScriptedCompletionClient>,
        transport: Arc<RecordingTransport>,
    ) -> MessageHandler {
        let controller =
            ContinuationController::new(Arc::new(TurnLedger::new(8)), client, "Be brief.").unwrap();
        MessageHandler::new(Arc::new(controller), transport)
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name("/start"), Some("/start"));
        assert_eq!(command_name("/start@my_bot hello"), Some("/start"));
        assert_eq!(command_name("/help"), Some("/help"));
        assert_eq!(command_name("/r/rust is great"), None);
        assert_eq!(command_name("hello /start"), None);
        assert_eq!(command_name("/"), None);
    }

    #[tokio::test]
    async fn test_reply_is_sent() {
        let client = Arc::new(ScriptedCompletionClient::with_replies(["Hello there."]));
        let transport = Arc::new(RecordingTransport::new());
        let handler = handler(client, transport.clone());

        let disposition = handler.handle(InboundMessage::new("chat", "hi")).await;

        assert_eq!(disposition, Disposition::Replied { chunks: 1 });
        assert_eq!(
            transport.sent_to(&ConversationKey::from("chat")),
            vec!["Hello there."]
        );
    }

    #[tokio::test]
    async fn test_long_reply_is_chunked_in_order() {
        let reply = format!("{}.", "abcdefghij".repeat(25));
        let client = Arc::new(ScriptedCompletionClient::with_replies([reply.clone()]));
        let transport = Arc::new(RecordingTransport::new());
        let handler = handler(client, transport.clone()).with_chunk_limit(100);

        let disposition = handler.handle(InboundMessage::new("chat", "hi")).await;

        assert_eq!(disposition, Disposition::Replied { chunks: 3 });
        let sent = transport.sent_to(&ConversationKey::from("chat"));
        assert_eq!(sent.concat(), reply);
        assert!(sent.iter().all(|piece| piece.chars().count() <= 100));
    }

    #[tokio::test]
    async fn test_chunks_follow_transport_length_unit() {
        let reply = format!("{}.", "😀".repeat(60));
        let client = Arc::new(ScriptedCompletionClient::with_replies([reply.clone()]));
        let transport = Arc::new(RecordingTransport::new().with_length_unit(LengthUnit::Utf16));
        let handler = handler(client, transport.clone()).with_chunk_limit(100);

        let disposition = handler.handle(InboundMessage::new("chat", "hi")).await;

        // 61 characters fit one message by characters but not by UTF-16 units
        assert_eq!(disposition, Disposition::Replied { chunks: 2 });
        let sent = transport.sent_to(&ConversationKey::from("chat"));
        assert_eq!(sent.concat(), reply);
        assert!(sent.iter().all(|piece| piece.encode_utf16().count() <= 100));
    }

    #[tokio::test]
    async fn test_failure_sends_single_apology() {
        let client = Arc::new(
            ScriptedCompletionClient::default()
                .then_fail(CourierError::Upstream("model overloaded".to_string())),
        );
        let transport = Arc::new(RecordingTransport::new());
        let handler = handler(client, transport.clone()).with_apology("Sorry!");
        let key = ConversationKey::from("chat");

        let disposition = handler.handle(InboundMessage::new("chat", "hi")).await;

        assert!(matches!(disposition, Disposition::Apologized { .. }));
        assert_eq!(transport.sent_to(&key), vec!["Sorry!"]);
        assert!(handler.controller().ledger().get(&key).await.is_empty());
    }

    #[tokio::test]
    async fn test_start_command_greets_without_completion() {
        let client = Arc::new(ScriptedCompletionClient::default());
        let transport = Arc::new(RecordingTransport::new());
        let handler = handler(client.clone(), transport.clone()).with_greeting("Welcome!");

        let disposition = handler.handle(InboundMessage::new("chat", "/start")).await;

        assert_eq!(disposition, Disposition::Greeted);
        assert_eq!(client.call_count(), 0);
        assert_eq!(transport.sent_to(&ConversationKey::from("chat")), vec!["Welcome!"]);
    }

    #[tokio::test]
    async fn test_textless_and_commands_ignored() {
        let client = Arc::new(ScriptedCompletionClient::default());
        let transport = Arc::new(RecordingTransport::new());
        let handler = handler(client.clone(), transport.clone());

        assert_eq!(
            handler.handle(InboundMessage::without_text("chat")).await,
            Disposition::Ignored
        );
        assert_eq!(
            handler.handle(InboundMessage::new("chat", "   ")).await,
            Disposition::Ignored
        );
        assert_eq!(
            handler.handle(InboundMessage::new("chat", "/settings")).await,
            Disposition::Ignored
        );
        assert_eq!(client.call_count(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_stops_remaining_chunks() {
        let reply = format!("{}.", "x".repeat(250));
        let client = Arc::new(ScriptedCompletionClient::with_replies([reply]));
        let transport = Arc::new(RecordingTransport::failing_after(1));
        let handler = handler(client.clone(), transport.clone()).with_chunk_limit(100);

        let disposition = handler.handle(InboundMessage::new("chat", "hi")).await;

        assert!(matches!(disposition, Disposition::Undelivered { .. }));
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(client.call_count(), 1);
    }
}
