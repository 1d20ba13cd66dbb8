//! Thin command transport: long-polls the Telegram Bot API and hands
//! message text to the command layer. Nothing here holds state beyond the
//! update offset; transport errors back off and retry, never abort.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use crate::command::CommandHandler;
use crate::exchange::FetchError;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::notify::Notifier;
use crate::registry::ChatId;
use crate::state::Config;

const LONG_POLL_SECS: u64 = 30;
const ERROR_BACKOFF_MS: u64 = 1000;

#[derive(Deserialize, Debug)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Deserialize, Debug)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize, Debug)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Chat {
    id: ChatId,
}

pub struct TelegramTransport {
    client: Client,
    base: String,
    token: String,
    commands: Arc<CommandHandler>,
    notifier: Arc<dyn Notifier>,
}

impl TelegramTransport {
    pub fn new(
        cfg: &Config,
        token: String,
        commands: Arc<CommandHandler>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        // the long poll itself must outlive the per-fetch timeout
        let client = Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()?;
        Ok(Self {
            client,
            base: cfg.telegram_base.clone(),
            token,
            commands,
            notifier,
        })
    }

    async fn poll_once(&self, offset: i64) -> Result<Vec<Update>, FetchError> {
        let url = format!(
            "{}/bot{}/getUpdates?timeout={}&offset={}",
            self.base, self.token, LONG_POLL_SECS, offset
        );
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
            });
        }
        let body: UpdatesResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        if !body.ok {
            return Err(FetchError::Decode("getUpdates returned ok=false".to_string()));
        }
        Ok(body.result)
    }

    /// Runs until process shutdown.
    pub async fn run(&self) {
        log(
            Level::Info,
            Domain::System,
            "transport_started",
            obj(&[("kind", v_str("telegram_long_poll"))]),
        );
        let mut offset: i64 = 0;
        loop {
            let updates = match self.poll_once(offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    log(
                        Level::Warn,
                        Domain::System,
                        "transport_poll_failed",
                        obj(&[("error", v_str(&err.to_string()))]),
                    );
                    sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else { continue };
                let Some(text) = message.text else { continue };
                if let Some(reply) = self.commands.handle_text(message.chat.id, &text).await {
                    if let Err(err) = self.notifier.send(message.chat.id, &reply).await {
                        log(
                            Level::Warn,
                            Domain::Notify,
                            "reply_failed",
                            obj(&[
                                ("chat_id", v_num(message.chat.id as f64)),
                                ("error", v_str(&err.to_string())),
                            ]),
                        );
                    }
                }
            }
        }
    }
}
