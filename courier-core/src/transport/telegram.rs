//! Telegram Bot API transport (long polling)

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::chunker::LengthUnit;
use crate::config::TransportConfig;
use crate::conversation::ConversationKey;
use crate::error::{CourierError, Result};

use super::{InboundMessage, Transport};

/// Extra time the HTTP client waits beyond the long-polling timeout
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Telegram transport over the Bot API
pub struct TelegramTransport {
    client: reqwest::Client,
    api_url: String,
    token: String,
    poll_timeout: Duration,
}

impl TelegramTransport {
    /// Create from transport configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no bot token is configured or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                CourierError::Configuration(
                    "transport token not set (transport.token or TELEGRAM_TOKEN)".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.poll_timeout + POLL_GRACE)
            .build()
            .map_err(|e| {
                CourierError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
            poll_timeout: config.poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                // reqwest errors include the URL, which embeds the token
                CourierError::Transport(format!(
                    "Telegram {} request failed: {}",
                    method,
                    e.without_url()
                ))
            })?;

        let status = response.status();
        let envelope: ApiEnvelope<T> = response.json().await.map_err(|e| {
            CourierError::Transport(format!(
                "Telegram {} returned HTTP {} with an unreadable body: {}",
                method,
                status,
                e.without_url()
            ))
        })?;

        envelope.into_result(method)
    }

    /// Fetch pending updates starting at `offset`.
    ///
    /// Returns the inbound messages and the offset to pass next time
    /// (`None` when no update arrived).
    pub async fn poll_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<InboundMessage>, Option<i64>)> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: &["message"],
        };
        let updates: Vec<Update> = self.call("getUpdates", &request).await?;
        tracing::debug!(count = updates.len(), "Received Telegram updates");
        Ok(updates_to_inbound(updates))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, key: &ConversationKey, text: &str) -> Result<()> {
        let chat_id = match key.as_str().parse::<i64>() {
            Ok(id) => serde_json::Value::from(id),
            Err(_) => serde_json::Value::from(key.as_str()),
        };
        let request = SendMessageRequest { chat_id, text };
        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }

    // Bot API message limits are counted in UTF-16 code units
    fn length_unit(&self) -> LengthUnit {
        LengthUnit::Utf16
    }
}

#[derive(Serialize)]
struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: serde_json::Value,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_result(self, method: &str) -> Result<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(CourierError::Transport(format!(
                "Telegram {} returned no result",
                method
            ))),
            (false, _) => Err(CourierError::Transport(format!(
                "Telegram {} failed: {}",
                method,
                self.description
                    .unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }
}

/// A Bot API update; only `message` updates are of interest
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Convert updates into inbound messages and compute the next offset.
///
/// Updates without a message are skipped; messages without text become
/// text-less inbound events. The offset always advances past every update.
pub fn updates_to_inbound(updates: Vec<Update>) -> (Vec<InboundMessage>, Option<i64>) {
    let next_offset = updates.iter().map(|u| u.update_id + 1).max();
    let messages = updates
        .into_iter()
        .filter_map(|update| update.message)
        .map(|message| InboundMessage {
            key: ConversationKey::from(message.chat.id),
            text: message.text,
        })
        .collect();
    (messages, next_offset)
}
