//! Per-conversation dispatch
//!
//! Each conversation key gets one long-lived worker fed by its own queue,
//! spawned on the first message for that key. Messages for one key are
//! handled strictly in the order they were dispatched; different keys run
//! in parallel. Workers are tracked so shutdown can wait for queued and
//! in-flight messages instead of dropping them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::conversation::ConversationKey;
use crate::handler::MessageHandler;
use crate::transport::InboundMessage;

/// Routes inbound messages to per-key workers
pub struct Dispatcher {
    handler: Arc<MessageHandler>,
    queues: HashMap<ConversationKey, mpsc::UnboundedSender<InboundMessage>>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(handler: Arc<MessageHandler>) -> Self {
        Self {
            handler,
            queues: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    /// Queue a message behind any earlier messages for the same key
    pub fn dispatch(&mut self, message: InboundMessage) {
        self.reap_finished();

        let message = match self.queues.get(&message.key) {
            Some(queue) => match queue.send(message) {
                Ok(()) => return,
                // Worker is gone; start a fresh one with the message
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let key = message.key.clone();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.workers.spawn(run_worker(
            self.handler.clone(),
            key.clone(),
            message,
            receiver,
        ));
        self.queues.insert(key, sender);
    }

    /// Number of conversations with a worker
    pub fn active_conversations(&self) -> usize {
        self.queues.len()
    }

    /// Close every queue and wait until all queued messages are handled.
    ///
    /// Returns the number of workers that finished.
    pub async fn shutdown(mut self) -> usize {
        self.queues.clear();

        let mut finished = 0;
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Conversation worker failed");
            }
            finished += 1;
        }
        tracing::info!(workers = finished, "All conversation workers drained");
        finished
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.workers.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "Conversation worker failed");
            }
        }
    }
}

async fn run_worker(
    handler: Arc<MessageHandler>,
    key: ConversationKey,
    first: InboundMessage,
    mut queue: mpsc::UnboundedReceiver<InboundMessage>,
) {
    tracing::debug!(key = %key, "Conversation worker started");

    let mut next = Some(first);
    while let Some(message) = next {
        let disposition = handler.handle(message).await;
        tracing::debug!(key = %key, ?disposition, "Message handled");
        next = queue.recv().await;
    }

    tracing::debug!(key = %key, "Conversation worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::ContinuationController;
    use crate::conversation::{Role, Turn, TurnLedger};
    use crate::error::Result;
    use crate::llm::CompletionClient;
    use crate::transport::RecordingTransport;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Answers every message after a fixed delay
    struct DelayedEcho {
        delay: Duration,
    }

    #[async_trait]
    impl CompletionClient for DelayedEcho {
        async fn complete(&self, turns: &[Turn], _max_tokens: u32) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            let last = turns.last().map(|t| t.content()).unwrap_or_default();
            Ok(format!("Echo: {}.", last))
        }
    }

    fn dispatcher(delay: Duration) -> (Dispatcher, Arc<TurnLedger>, Arc<RecordingTransport>) {
        let ledger = Arc::new(TurnLedger::new(8));
        let controller = ContinuationController::new(
            ledger.clone(),
            Arc::new(DelayedEcho { delay }),
            "Be brief.",
        )
        .unwrap();
        let transport = Arc::new(RecordingTransport::new());
        let handler = MessageHandler::new(Arc::new(controller), transport.clone());
        (Dispatcher::new(Arc::new(handler)), ledger, transport)
    }

    fn user_texts(turns: &[Turn]) -> Vec<String> {
        turns
            .iter()
            .filter(|t| t.role() == Role::User)
            .map(|t| t.content().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_later_message_waits_behind_earlier_ones() {
        let (mut dispatcher, ledger, _) = dispatcher(Duration::from_millis(50));
        let key = ConversationKey::from(7_i64);

        dispatcher.dispatch(InboundMessage::new(7_i64, "m1"));
        dispatcher.dispatch(InboundMessage::new(7_i64, "m2"));
        // Arrives while m1 is still waiting on its completion
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.dispatch(InboundMessage::new(7_i64, "m3"));

        assert_eq!(dispatcher.active_conversations(), 1);
        assert_eq!(dispatcher.shutdown().await, 1);

        let turns = ledger.get(&key).await;
        assert_eq!(user_texts(&turns), vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_messages() {
        let (mut dispatcher, ledger, transport) = dispatcher(Duration::from_millis(20));

        for i in 0..3 {
            dispatcher.dispatch(InboundMessage::new("a", format!("a{}", i)));
            dispatcher.dispatch(InboundMessage::new("b", format!("b{}", i)));
        }
        assert_eq!(dispatcher.active_conversations(), 2);

        assert_eq!(dispatcher.shutdown().await, 2);

        assert_eq!(transport.sent().len(), 6);
        assert_eq!(ledger.len(&ConversationKey::from("a")).await, 6);
        assert_eq!(ledger.len(&ConversationKey::from("b")).await, 6);
    }

    #[tokio::test]
    async fn test_shutdown_without_messages() {
        let (dispatcher, _, _) = dispatcher(Duration::from_millis(1));
        assert_eq!(dispatcher.shutdown().await, 0);
    }
}
