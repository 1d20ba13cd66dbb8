//! The command layer: the three entry points the core exposes
//! (subscribe, unsubscribe, start monitoring) plus the text parsing in
//! front of them. Input errors never reach the registry; they come back as
//! user-facing reply text.

use std::sync::Arc;

use thiserror::Error;

use crate::exchange::MarketCatalog;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::registry::{ChatId, SubscriptionRegistry};
use crate::scheduler::PollScheduler;
use crate::state::Config;

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("Symbol must contain letters only (e.g. BTC)")]
    BadSymbol,
    #[error("X must be a number")]
    BadThreshold,
    #[error("Usage: /set SYMBOL X")]
    Usage,
    #[error("Pair not found on Binance")]
    PairNotFound,
}

/// Trim, uppercase, and append the quote currency: "btc" -> "BTCUSDT".
/// The base component must be non-empty and letters only.
pub fn normalize_symbol(input: &str, quote: &str) -> Result<String, InputError> {
    let base = input.trim().to_uppercase();
    if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(InputError::BadSymbol);
    }
    Ok(format!("{}{}", base, quote))
}

pub fn parse_threshold(input: &str) -> Result<f64, InputError> {
    let x: f64 = input.trim().parse().map_err(|_| InputError::BadThreshold)?;
    if !x.is_finite() {
        return Err(InputError::BadThreshold);
    }
    Ok(x)
}

pub struct CommandHandler {
    cfg: Config,
    registry: Arc<SubscriptionRegistry>,
    catalog: Arc<dyn MarketCatalog>,
    scheduler: Arc<PollScheduler>,
}

impl CommandHandler {
    pub fn new(
        cfg: Config,
        registry: Arc<SubscriptionRegistry>,
        catalog: Arc<dyn MarketCatalog>,
        scheduler: Arc<PollScheduler>,
    ) -> Self {
        Self {
            cfg,
            registry,
            catalog,
            scheduler,
        }
    }

    /// Dispatch one message of command text. Returns the reply to send, or
    /// `None` for text that is not a command.
    pub async fn handle_text(&self, chat_id: ChatId, text: &str) -> Option<String> {
        let mut parts = text.split_whitespace();
        // group chats address commands as "/cmd@BotName"
        let command = parts.next()?;
        let command = command.split('@').next().unwrap_or(command);
        let reply = match command {
            "/start" => self.start_monitoring(),
            "/set" => {
                let args: Vec<&str> = parts.collect();
                match args.as_slice() {
                    [symbol, threshold] => self.subscribe(chat_id, symbol, threshold).await,
                    _ => InputError::Usage.to_string(),
                }
            }
            "/del" => self.unsubscribe(chat_id).await,
            _ => return None,
        };
        Some(reply)
    }

    /// Create or wholesale-replace the subscription for this chat.
    pub async fn subscribe(
        &self,
        chat_id: ChatId,
        symbol_text: &str,
        threshold_text: &str,
    ) -> String {
        let symbol = match normalize_symbol(symbol_text, &self.cfg.quote_currency) {
            Ok(s) => s,
            Err(err) => return err.to_string(),
        };
        let threshold = match parse_threshold(threshold_text) {
            Ok(x) => x,
            Err(err) => return err.to_string(),
        };

        // Best-effort validation: a catalog outage must not block subscribing.
        match self.catalog.has_symbol(&symbol).await {
            Ok(false) => return InputError::PairNotFound.to_string(),
            Ok(true) => {}
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Command,
                    "catalog_unavailable",
                    obj(&[
                        ("symbol", v_str(&symbol)),
                        ("error", v_str(&err.to_string())),
                    ]),
                );
            }
        }

        self.registry.set(chat_id, symbol.clone(), threshold).await;
        log(
            Level::Info,
            Domain::Command,
            "subscribed",
            obj(&[
                ("chat_id", v_num(chat_id as f64)),
                ("symbol", v_str(&symbol)),
                ("threshold", v_num(threshold)),
            ]),
        );
        format!("Set {} X={}", symbol, threshold)
    }

    pub async fn unsubscribe(&self, chat_id: ChatId) -> String {
        if self.registry.remove(chat_id).await {
            log(
                Level::Info,
                Domain::Command,
                "unsubscribed",
                obj(&[("chat_id", v_num(chat_id as f64))]),
            );
            "Alerts disabled".to_string()
        } else {
            "Nothing to delete".to_string()
        }
    }

    /// Idempotent trigger for the poll loop; replies with the help text.
    pub fn start_monitoring(&self) -> String {
        self.scheduler.ensure_started();
        format!(
            "This bot watches the Binance order book.\n\
             \n\
             When buying pressure becomes much stronger\n\
             than selling pressure, you get an alert.\n\
             \n\
             Commands:\n\
             /start  - show this message\n\
             /set BTC 0.3  - set or replace alert\n\
             /del    - disable alerts\n\
             \n\
             X controls sensitivity:\n\
             higher X = stronger buyer pressure\n\
             required for a notification.\n\
             \n\
             Poll interval: {}ms; top bids/asks: {}",
            self.cfg.poll_interval_ms, self.cfg.depth
        )
    }
}
