//! Courier CLI - relay a chat transport to a completion service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier_core::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Pause before polling again after a failed poll
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Chat relay with reply continuation", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to courier.toml plus COURIER_* variables)
    #[arg(short, long, global = true, env = "COURIER_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram relay until interrupted
    Run,
    /// Send one message through the continuation engine and print the reply
    Ask {
        /// Message text
        text: String,
        /// Conversation key
        #[arg(short, long, default_value = "cli")]
        key: String,
    },
    /// Show how a message would be budgeted
    Classify {
        /// Message text
        text: String,
    },
    /// Print the effective configuration with secrets redacted
    Config,
    /// Version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("courier {}", env!("CARGO_PKG_VERSION"));
            println!("courier-core {}", courier_core::VERSION);
        }
        Commands::Config => {
            let config = load_config(cli.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
        Commands::Classify { text } => {
            let config = load_config(cli.config.as_deref())?;
            let classifier = HeuristicClassifier::new(config.budgets.clone());
            let policy = classifier.classify(&text);
            let output = serde_json::json!({
                "kind": policy.kind,
                "max_tokens": policy.max_tokens,
                "continuation_tokens": config.budgets.continuation(policy.kind),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Ask { text, key } => {
            let config = load_config(cli.config.as_deref())?;
            ask(&config, &key, &text).await?;
        }
        Commands::Run => {
            let config = load_config(cli.config.as_deref())?;
            run(&config).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<CourierConfig> {
    CourierConfig::load_from(path).with_context(|| match path {
        Some(path) => format!("loading configuration from {}", path.display()),
        None => "loading configuration".to_string(),
    })
}

fn controller(config: &CourierConfig) -> Result<ContinuationController> {
    let client = Arc::new(OpenAICompatibleClient::from_config(&config.provider)?);
    tracing::info!(
        provider = %client.model_info().provider,
        model = %client.model_info().model_name,
        "Completion client ready"
    );
    Ok(ContinuationController::from_config(config, client)?)
}

async fn ask(config: &CourierConfig, key: &str, text: &str) -> Result<()> {
    let controller = controller(config)?;
    let key = ConversationKey::from(key);

    match controller.handle(&key, text).await? {
        Some(outcome) => {
            tracing::info!(
                kind = %outcome.policy.kind,
                calls = outcome.calls(),
                stop = ?outcome.stop,
                "Reply assembled"
            );
            for piece in chunk(&outcome.reply, config.transport.chunk_limit) {
                println!("{}", piece);
            }
        }
        None => println!("(nothing to send for an empty message)"),
    }
    Ok(())
}

async fn run(config: &CourierConfig) -> Result<()> {
    let transport = Arc::new(TelegramTransport::from_config(&config.transport)?);
    let controller = Arc::new(controller(config)?);
    let handler = Arc::new(MessageHandler::from_config(
        config,
        controller,
        transport.clone(),
    ));

    tracing::info!(
        window = config.conversation.window_size,
        max_continuations = config.conversation.max_continuations,
        chunk_limit = config.transport.chunk_limit,
        "Relay started, press Ctrl-C to stop"
    );

    let mut dispatcher = Dispatcher::new(handler);
    let mut offset = None;
    loop {
        let polled = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            polled = transport.poll_updates(offset) => polled,
        };

        match polled {
            Ok((messages, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for message in messages {
                    dispatcher.dispatch(message);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Polling failed, retrying");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
            }
        }
    }

    // Finish every message already taken from the transport
    let workers = dispatcher.shutdown().await;
    tracing::info!(workers, "Relay stopped");
    Ok(())
}
