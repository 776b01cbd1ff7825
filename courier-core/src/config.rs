//! Configuration types for the Courier relay

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::budget::BudgetTable;
use crate::continuation::TruncationConfig;
use crate::error::{CourierError, Result};

/// Default system instruction sent ahead of every conversation window
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant chatting over a messaging app. \
Answer clearly and concisely in plain text. Finish every sentence you start. \
Put code in fenced code blocks.";

/// Main configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Chat transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Conversation and continuation behavior
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Per-kind token budgets
    #[serde(default)]
    pub budgets: BudgetTable,

    /// Truncation heuristic parameters
    #[serde(default)]
    pub truncation: TruncationConfig,
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API base URL (the client appends `/chat/completions`)
    pub base_url: String,

    /// Bearer token (prefer env vars)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// Sampling temperature (0.0-2.0)
    pub temperature: f32,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Optional `HTTP-Referer` attribution header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// Optional `X-Title` attribution header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: "openai/gpt-3.5-turbo".to_string(),
            temperature: 0.6,
            timeout: Duration::from_secs(60),
            referer: Some("https://telegram.org".to_string()),
            title: Some("Telegram Bot".to_string()),
        }
    }
}

/// Chat transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bot token (prefer env vars)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Bot API base URL
    pub api_url: String,

    /// Long-polling timeout for `getUpdates`
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Maximum characters per outbound message
    pub chunk_limit: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.telegram.org".to_string(),
            poll_timeout: Duration::from_secs(30),
            chunk_limit: 4000,
        }
    }
}

/// Conversation and continuation behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Exchanges kept per conversation (stored turns never exceed twice this)
    pub window_size: usize,

    /// Hard bound on follow-up calls per inbound message
    pub max_continuations: usize,

    /// Static instruction prepended to every request
    pub system_prompt: String,

    /// Reply sent when handling a message fails
    pub apology: String,

    /// Reply to the `/start` command
    pub greeting: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            window_size: 8,
            max_continuations: 3,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            apology: "Sorry, I couldn't process that message. Please try again.".to_string(),
            greeting: "I'm a bot, please talk to me!".to_string(),
        }
    }
}

impl CourierConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (courier.toml, then the path in COURIER_CONFIG_PATH)
    /// 3. `COURIER_` environment variables (nested keys split on `__`)
    /// 4. `OPENROUTER_API_KEY` / `TELEGRAM_TOKEN` when no token is configured
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is invalid or validation fails.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("COURIER_CONFIG_PATH").map(std::path::PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Same layering as [`CourierConfig::load`], with `path` in place of
    /// `COURIER_CONFIG_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is invalid or validation fails.
    pub fn load_from(path: Option<&std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(CourierConfig::default()))
            .merge(Toml::file("courier.toml"));

        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(
            Env::prefixed("COURIER_")
                .ignore(&["CONFIG_PATH"])
                .split("__"),
        );

        let mut config: CourierConfig = figment.extract().map_err(|e| {
            CourierError::Configuration(format!("Failed to load configuration: {}", e))
        })?;

        config.apply_env_fallbacks();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: CourierConfig = Figment::from(Serialized::defaults(CourierConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                CourierError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Fill missing tokens from the conventional provider/transport env vars.
    fn apply_env_fallbacks(&mut self) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("OPENROUTER_API_KEY").ok();
        }
        if self.transport.token.is_none() {
            self.transport.token = std::env::var("TELEGRAM_TOKEN").ok();
        }
    }

    /// Copy with secrets replaced, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.provider.api_key.is_some() {
            copy.provider.api_key = Some("***".to_string());
        }
        if copy.transport.token.is_some() {
            copy.transport.token = Some("***".to_string());
        }
        copy
    }

    /// Validate the configuration.
    ///
    /// Tokens are not required here; the components that need them check
    /// on construction, so offline commands work without credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.conversation.window_size == 0 {
            return Err(CourierError::Configuration(
                "conversation.window_size must be at least 1".to_string(),
            ));
        }
        if self.conversation.system_prompt.trim().is_empty() {
            return Err(CourierError::Configuration(
                "conversation.system_prompt must not be empty".to_string(),
            ));
        }
        if self.conversation.apology.trim().is_empty() {
            return Err(CourierError::Configuration(
                "conversation.apology must not be empty".to_string(),
            ));
        }
        if self.transport.chunk_limit == 0 {
            return Err(CourierError::Configuration(
                "transport.chunk_limit must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(CourierError::Configuration(format!(
                "provider.temperature must be within 0.0-2.0, got {}",
                self.provider.temperature
            )));
        }
        if self.provider.timeout.is_zero() {
            return Err(CourierError::Configuration(
                "provider.timeout must be positive".to_string(),
            ));
        }
        self.budgets.validate()?;
        self.truncation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CourierConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.conversation.window_size, 8);
        assert_eq!(config.conversation.max_continuations, 3);
        assert_eq!(config.transport.chunk_limit, 4000);
        assert_eq!(config.budgets.code, 300);
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[provider]
model = "mistralai/mistral-7b-instruct"
timeout = "15s"

[conversation]
window_size = 10

[budgets]
short = 40
"#
        )
        .unwrap();

        let config = CourierConfig::from_file(file.path()).unwrap();
        assert_eq!(config.provider.model, "mistralai/mistral-7b-instruct");
        assert_eq!(config.provider.timeout, Duration::from_secs(15));
        assert_eq!(config.conversation.window_size, 10);
        assert_eq!(config.budgets.short, 40);
        assert_eq!(config.budgets.code, 300);
        assert_eq!(config.transport.chunk_limit, 4000);
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let mut config = CourierConfig::default();
        config.conversation.window_size = 0;
        assert!(matches!(
            config.validate(),
            Err(CourierError::Configuration(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_chunk_limit() {
        let mut config = CourierConfig::default();
        config.transport.chunk_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_budget() {
        let mut config = CourierConfig::default();
        config.budgets.short = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = CourierConfig::default();
        config.provider.api_key = Some("sk-secret".to_string());
        config.transport.token = Some("123:abc".to_string());

        let shown = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-secret"));
        assert!(!shown.contains("123:abc"));
    }

    #[test]
    fn test_load_reads_prefixed_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("COURIER_CONVERSATION__MAX_CONTINUATIONS", "5");
            jail.set_env("COURIER_PROVIDER__MODEL", "openai/gpt-4o-mini");
            jail.set_env("OPENROUTER_API_KEY", "sk-env");

            let config = CourierConfig::load().expect("config loads");
            assert_eq!(config.conversation.max_continuations, 5);
            assert_eq!(config.provider.model, "openai/gpt-4o-mini");
            assert_eq!(config.provider.api_key.as_deref(), Some("sk-env"));
            Ok(())
        });
    }

    #[test]
    fn test_load_from_layers_env_over_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "relay.toml",
                r#"
                [transport]
                chunk_limit = 1000

                [conversation]
                window_size = 4
                "#,
            )?;
            jail.set_env("COURIER_TRANSPORT__CHUNK_LIMIT", "500");

            let config = CourierConfig::load_from(Some(std::path::Path::new("relay.toml")))
                .expect("config loads");
            assert_eq!(config.conversation.window_size, 4);
            assert_eq!(config.transport.chunk_limit, 500);
            Ok(())
        });
    }
}
