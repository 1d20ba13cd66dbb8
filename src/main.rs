use std::sync::Arc;

use anyhow::{anyhow, Result};

use depthwatch::command::CommandHandler;
use depthwatch::exchange::ExchangeKind;
use depthwatch::logging::{log, obj, v_num, v_str, Domain, Level};
use depthwatch::notify::TelegramNotifier;
use depthwatch::registry::SubscriptionRegistry;
use depthwatch::scheduler::PollScheduler;
use depthwatch::state::{load_env_file, Config};
use depthwatch::telegram::TelegramTransport;

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file(".env");
    let cfg = Config::from_env();
    let token = cfg
        .telegram_token
        .clone()
        .ok_or_else(|| anyhow!("TELEGRAM_TOKEN is not set"))?;

    let exchange = ExchangeKind::from_env().build(&cfg)?;
    let notifier = Arc::new(TelegramNotifier::new(&cfg, token.clone())?);
    let registry = Arc::new(SubscriptionRegistry::new());

    let scheduler = Arc::new(PollScheduler::new(
        cfg.clone(),
        registry.clone(),
        exchange.clone(),
        notifier.clone(),
    ));
    let commands = Arc::new(CommandHandler::new(
        cfg.clone(),
        registry,
        exchange,
        scheduler,
    ));
    let transport = TelegramTransport::new(&cfg, token, commands, notifier)?;

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("poll_ms", v_num(cfg.poll_interval_ms as f64)),
            ("depth", v_num(cfg.depth as f64)),
            ("hysteresis_band", v_num(cfg.hysteresis_band)),
            ("quote", v_str(&cfg.quote_currency)),
        ]),
    );

    // The poll loop launches on the first /start; the transport runs the
    // process lifetime.
    transport.run().await;
    Ok(())
}
