mod compose;
mod error;
mod flow;
mod health;
mod helpers;
mod mail;
mod schedule;
mod session;
mod state;
mod telegram;
mod traits;

use clap::Parser;
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::mail::{GmailMailer, MailCredentials};
use crate::schedule::TokioScheduler;
use crate::session::SessionStore;
use crate::state::{Config, Metrics, State};
use crate::telegram::parse_update;
use crate::traits::{GenAiClient, TelegramApiImpl};

#[derive(Parser)]
#[command(name = "mailbot", about = "Telegram email composer bot")]
struct Args {
    /// Telegram bot token
    #[arg(long, env = "MAILBOT_TELEGRAM_TOKEN")]
    telegram_token: String,

    /// Telegram API base URL
    #[arg(long, default_value = "https://api.telegram.org", env = "MAILBOT_API_URL")]
    api_url: String,

    /// Chat-completions API base URL
    #[arg(long, default_value = "https://api.openai.com", env = "MAILBOT_GENAI_URL")]
    genai_url: String,

    /// Chat-completions API key
    #[arg(long, env = "MAILBOT_GENAI_KEY")]
    genai_key: String,

    /// Model used to draft email bodies
    #[arg(long, default_value = "gpt-4o-mini", env = "MAILBOT_GENAI_MODEL")]
    genai_model: String,

    /// Gmail API base URL
    #[arg(long, default_value = "https://gmail.googleapis.com", env = "MAILBOT_GMAIL_URL")]
    gmail_url: String,

    /// Path to the Gmail OAuth token JSON
    #[arg(long, default_value = "token.json", env = "MAILBOT_GMAIL_TOKEN_FILE")]
    gmail_token_file: PathBuf,

    /// Base64-encoded Gmail token JSON; takes precedence over the file
    #[arg(long, env = "MAILBOT_GMAIL_TOKEN_BASE64")]
    gmail_token_base64: Option<String>,

    /// Directory for downloaded attachments
    #[arg(long, default_value = "/tmp/mailbot/downloads", env = "MAILBOT_DOWNLOAD_DIR")]
    download_dir: PathBuf,

    /// Port for the health/stats endpoint
    #[arg(long, default_value_t = 3000, env = "MAILBOT_HEALTH_PORT")]
    health_port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailbot=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let credentials = match MailCredentials::load(&args.gmail_token_file, args.gmail_token_base64) {
        Ok(creds) => creds,
        Err(e) => {
            error!("Cannot load Gmail credentials: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&args.download_dir) {
        error!(dir = %args.download_dir.display(), "Cannot create download dir: {e}");
        std::process::exit(1);
    }

    let http = Client::new();
    let mailer = Arc::new(GmailMailer {
        http: http.clone(),
        api_url: args.gmail_url,
        credentials,
    });
    let state = Arc::new(State {
        config: Config {
            download_dir: args.download_dir,
        },
        metrics: Metrics::new(),
        store: SessionStore::new(),
        chat_api: Box::new(TelegramApiImpl {
            http: http.clone(),
            api_url: args.api_url.clone(),
            token: args.telegram_token.clone(),
        }),
        generator: Box::new(GenAiClient {
            http: http.clone(),
            api_url: args.genai_url,
            api_key: args.genai_key,
            model: args.genai_model,
        }),
        mailer: mailer.clone(),
        scheduler: Box::new(TokioScheduler { mailer }),
    });

    match tokio::net::TcpListener::bind(("0.0.0.0", args.health_port)).await {
        Ok(listener) => {
            tokio::spawn(health::run_health_server(listener, state.clone()));
        }
        Err(e) => warn!(port = args.health_port, "Health server disabled: {e}"),
    }

    info!("mailbot starting");
    poll_loop(&state, &http, &args.api_url, &args.telegram_token).await;
}

/// Long-poll getUpdates forever. Updates are handled one at a time, in
/// arrival order; a handler error never stops the loop.
async fn poll_loop(state: &Arc<State>, http: &Client, api_url: &str, token: &str) {
    let url = format!("{api_url}/bot{token}/getUpdates");
    let mut offset: i64 = 0;
    let mut backoff = 1u64;

    loop {
        let batch: Result<Value, reqwest::Error> = async {
            http.get(&url)
                .query(&[("timeout", "30".to_string()), ("offset", offset.to_string())])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        let batch = match batch {
            Ok(v) => {
                backoff = 1;
                v
            }
            Err(e) => {
                error!("Poll failed: {e}, retrying in {backoff}s...");
                tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(60);
                continue;
            }
        };

        for update in batch["result"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(id) = update["update_id"].as_i64() {
                offset = offset.max(id + 1);
            }
            let Some(event) = parse_update(update) else {
                continue;
            };
            let chat_id = event.chat_id;
            if let Err(e) = flow::handle_event(state, event).await {
                error!(chat_id, "Event handling failed: {e}");
                state.metrics.inc_errors();
            }
        }
    }
}
