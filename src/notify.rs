//! Alert delivery. Best-effort: a failed send is logged and swallowed by
//! callers, never retried within the tick and never rolled back into the
//! alert state machine.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::exchange::FetchError;
use crate::registry::ChatId;
use crate::state::Config;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), FetchError>;
}

pub struct TelegramNotifier {
    client: Client,
    base: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(cfg: &Config, token: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.fetch_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base: cfg.telegram_base.clone(),
            token,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), FetchError> {
        let url = format!("{}/bot{}/sendMessage", self.base, self.token);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Plain-text alert body. Kept deliberately unadorned; formatting layers
/// are out of scope.
pub fn format_alert(symbol: &str, imbalance: f64, threshold: f64) -> String {
    let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        "{} imbalance alert\n\
         Current imbalance: {:.3}\n\
         Alert threshold (X): {:.3}\n\
         Time (UTC): {}\n\
         Buyers are stronger than sellers.",
        symbol, imbalance, threshold, now
    )
}
