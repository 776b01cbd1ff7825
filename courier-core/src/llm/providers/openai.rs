//! OpenAI-compatible chat completions client (OpenRouter, OpenAI, proxies)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::conversation::Turn;
use crate::error::{CourierError, Result};
use crate::llm::{CompletionClient, ModelInfo};

/// Longest slice of a raw error body kept in error messages
const ERROR_BODY_PREVIEW: usize = 200;

/// Client for a `/chat/completions` endpoint.
pub struct OpenAICompatibleClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    timeout: Duration,
    referer: Option<String>,
    title: Option<String>,
}

impl OpenAICompatibleClient {
    /// Create a client against the default OpenRouter endpoint.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Bearer token
    /// * `model` - Model identifier (e.g., "openai/gpt-3.5-turbo")
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let config = ProviderConfig {
            api_key: Some(api_key.into()),
            model: model.into(),
            ..Default::default()
        };
        Self::from_config(&config)
    }

    /// Create from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                CourierError::Configuration(
                    "provider API key not set (provider.api_key or OPENROUTER_API_KEY)"
                        .to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                CourierError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature.clamp(0.0, 2.0),
            timeout: config.timeout,
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

fn convert_turns(turns: &[Turn]) -> Vec<ChatMessage<'_>> {
    turns
        .iter()
        .map(|turn| ChatMessage {
            role: turn.role().as_str(),
            content: turn.content(),
        })
        .collect()
}

fn preview(body: &str) -> String {
    let mut shown: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
    if body.chars().count() > ERROR_BODY_PREVIEW {
        shown.push_str("...");
    }
    shown
}

/// Map a raw provider answer onto the reply text or an error.
///
/// An `error.message` payload wins regardless of status; a non-2xx status
/// without one is a transport failure; a 2xx body without a first choice's
/// `message.content` is malformed.
fn parse_completion(status: reqwest::StatusCode, body: &str) -> Result<String> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        tracing::debug!(
            status = status.as_u16(),
            code = ?envelope.error.code,
            "Provider returned an error payload"
        );
        return Err(CourierError::Upstream(envelope.error.message));
    }

    if !status.is_success() {
        return Err(CourierError::Transport(format!(
            "HTTP {}: {}",
            status,
            preview(body)
        )));
    }

    let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
        CourierError::MalformedResponse(format!("Failed to parse completion response: {}", e))
    })?;

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        CourierError::MalformedResponse("completion response has no choices".to_string())
    })?;

    choice
        .message
        .and_then(|message| message.content)
        .ok_or_else(|| {
            CourierError::MalformedResponse("first choice has no message content".to_string())
        })
}

#[async_trait]
impl CompletionClient for OpenAICompatibleClient {
    async fn complete(&self, turns: &[Turn], max_tokens: u32) -> Result<String> {
        if turns.is_empty() {
            return Err(CourierError::InvalidRequest(
                "completion request needs at least one turn".to_string(),
            ));
        }
        if max_tokens == 0 {
            return Err(CourierError::InvalidRequest(
                "max_tokens must be positive".to_string(),
            ));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: convert_turns(turns),
            max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CourierError::Transport(format!(
                    "completion request timed out after {:?}",
                    self.timeout
                ))
            } else {
                CourierError::Transport(format!("Failed to send completion request: {}", e))
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CourierError::Transport(format!("Failed to read completion response: {}", e))
        })?;

        parse_completion(status, &body)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "openai-compatible".to_string(),
            model_name: self.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> OpenAICompatibleClient {
        let config = ProviderConfig {
            base_url: server.uri(),
            api_key: Some("test-key".to_string()),
            model: "openai/gpt-3.5-turbo".to_string(),
            timeout,
            ..Default::default()
        };
        OpenAICompatibleClient::from_config(&config).unwrap()
    }

    fn turns() -> Vec<Turn> {
        vec![
            Turn::system("Be brief.").unwrap(),
            Turn::user("explain gravity").unwrap(),
        ]
    }

    #[test]
    fn test_client_creation() {
        let client = OpenAICompatibleClient::new("test-key", "openai/gpt-4o").unwrap();
        assert_eq!(client.model(), "openai/gpt-4o");
        assert_eq!(client.base_url(), "https://openrouter.ai/api/v1");
        assert_eq!(client.model_info().model_name, "openai/gpt-4o");
    }

    #[test]
    fn test_missing_api_key() {
        let result = OpenAICompatibleClient::from_config(&ProviderConfig::default());
        assert!(matches!(result, Err(CourierError::Configuration(_))));
    }

    #[test]
    fn test_convert_turns() {
        let turns = vec![
            Turn::system("You are helpful").unwrap(),
            Turn::user("Hello").unwrap(),
            Turn::assistant("Hi there!").unwrap(),
        ];

        let converted = convert_turns(&turns);

        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[2].role, "assistant");
    }

    #[test]
    fn test_parse_error_payload_is_upstream() {
        let body = r#"{"error":{"message":"Insufficient credits","code":402}}"#;
        let result = parse_completion(reqwest::StatusCode::PAYMENT_REQUIRED, body);
        match result {
            Err(CourierError::Upstream(message)) => assert_eq!(message, "Insufficient credits"),
            other => panic!("expected upstream error, got {:?}", other),
        }

        // Some providers report errors with a 200 status
        let result = parse_completion(reqwest::StatusCode::OK, body);
        assert!(matches!(result, Err(CourierError::Upstream(_))));
    }

    #[test]
    fn test_parse_missing_choices_is_malformed() {
        let result = parse_completion(reqwest::StatusCode::OK, r#"{"id":"gen-1"}"#);
        assert!(matches!(result, Err(CourierError::MalformedResponse(_))));

        let result = parse_completion(reqwest::StatusCode::OK, r#"{"choices":[]}"#);
        assert!(matches!(result, Err(CourierError::MalformedResponse(_))));

        let result =
            parse_completion(reqwest::StatusCode::OK, r#"{"choices":[{"message":{}}]}"#);
        assert!(matches!(result, Err(CourierError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_bare_failure_status_is_transport() {
        let result = parse_completion(reqwest::StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(matches!(result, Err(CourierError::Transport(_))));
    }

    #[tokio::test]
    async fn test_complete_sends_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "openai/gpt-3.5-turbo",
                "max_tokens": 50,
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "explain gravity"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": " Gravity attracts mass. "}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let reply = client.complete(&turns(), 50).await.unwrap();

        // Returned verbatim; trimming is the caller's job
        assert_eq!(reply, " Gravity attracts mass. ");
    }

    #[tokio::test]
    async fn test_complete_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit exceeded", "code": 429}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let result = client.complete(&turns(), 50).await;
        assert!(matches!(result, Err(CourierError::Upstream(m)) if m == "Rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_complete_timeout_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(json!({"choices": [{"message": {"content": "late."}}]})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(100));
        let result = client.complete(&turns(), 50).await;
        assert!(matches!(result, Err(CourierError::Transport(_))));
    }

    #[tokio::test]
    async fn test_complete_rejects_invalid_request_without_calling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        assert!(matches!(
            client.complete(&[], 50).await,
            Err(CourierError::InvalidRequest(_))
        ));
        assert!(matches!(
            client.complete(&turns(), 0).await,
            Err(CourierError::InvalidRequest(_))
        ));
    }
}
