//! The poll loop: one fetch-evaluate cycle per subscription per tick.
//!
//! Exactly one loop runs per process no matter how many times the start
//! trigger fires. No failure inside a tick is allowed to end the loop: a
//! fetch error skips that subscription for the tick, a delivery error is
//! swallowed after the state transition has committed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::{sleep, Duration};

use crate::alert::AlertState;
use crate::exchange::retry::{retry_fetch, RetryConfig};
use crate::exchange::OrderBookSource;
use crate::imbalance::imbalance;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::notify::{format_alert, Notifier};
use crate::registry::{ChatId, Subscription, SubscriptionRegistry};
use crate::state::Config;

pub struct PollScheduler {
    cfg: Config,
    registry: Arc<SubscriptionRegistry>,
    source: Arc<dyn OrderBookSource>,
    notifier: Arc<dyn Notifier>,
    retry: RetryConfig,
    started: AtomicBool,
}

impl PollScheduler {
    pub fn new(
        cfg: Config,
        registry: Arc<SubscriptionRegistry>,
        source: Arc<dyn OrderBookSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let retry = RetryConfig {
            max_retries: cfg.fetch_retries,
            ..RetryConfig::default()
        };
        Self {
            cfg,
            registry,
            source,
            notifier,
            retry,
            started: AtomicBool::new(false),
        }
    }

    /// Idempotent start trigger: spawns the loop on the first call only.
    /// Returns whether this call actually started it.
    pub fn ensure_started(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await });
        log(
            Level::Info,
            Domain::Sched,
            "loop_started",
            obj(&[("poll_ms", v_num(self.cfg.poll_interval_ms as f64))]),
        );
        true
    }

    /// Runs until process shutdown; there is no other stop condition.
    async fn run(&self) {
        loop {
            if self.registry.is_empty().await {
                sleep(Duration::from_millis(self.cfg.idle_interval_ms)).await;
                continue;
            }
            self.tick().await;
            sleep(Duration::from_millis(self.cfg.poll_interval_ms)).await;
        }
    }

    /// One pass over a point-in-time snapshot of the registry.
    pub async fn tick(&self) {
        for (chat_id, sub) in self.registry.snapshot().await {
            if !sub.is_complete() {
                log(
                    Level::Warn,
                    Domain::Sched,
                    "incomplete_subscription_skipped",
                    obj(&[("chat_id", v_num(chat_id as f64))]),
                );
                continue;
            }
            self.evaluate(chat_id, &sub).await;
        }
    }

    async fn evaluate(&self, chat_id: ChatId, sub: &Subscription) {
        let depth = self.cfg.depth;
        let book = match retry_fetch(&self.retry, "fetch_order_book", || {
            self.source.fetch_order_book(&sub.symbol, depth)
        })
        .await
        {
            Ok(book) => book,
            Err(err) => {
                // Skip this subscription for this tick only; no state change.
                log(
                    Level::Warn,
                    Domain::Market,
                    "fetch_failed",
                    obj(&[
                        ("chat_id", v_num(chat_id as f64)),
                        ("symbol", v_str(&sub.symbol)),
                        ("error", v_str(&err.to_string())),
                    ]),
                );
                return;
            }
        };

        let reading = imbalance(&book, depth);
        log(
            Level::Debug,
            Domain::Market,
            "imbalance_reading",
            obj(&[
                ("symbol", v_str(&sub.symbol)),
                ("imbalance", v_num(reading)),
                ("threshold", v_num(sub.threshold)),
            ]),
        );

        let mut alert = sub.alert;
        let fired = alert.apply(reading, sub.threshold, self.cfg.hysteresis_band);

        if fired {
            log(
                Level::Info,
                Domain::Alert,
                "alert_fired",
                obj(&[
                    ("chat_id", v_num(chat_id as f64)),
                    ("symbol", v_str(&sub.symbol)),
                    ("imbalance", v_num(reading)),
                    ("threshold", v_num(sub.threshold)),
                ]),
            );
            let text = format_alert(&sub.symbol, reading, sub.threshold);
            if let Err(err) = self.notifier.send(chat_id, &text).await {
                // Delivery is best-effort; the transition above stands.
                log(
                    Level::Warn,
                    Domain::Notify,
                    "delivery_failed",
                    obj(&[
                        ("chat_id", v_num(chat_id as f64)),
                        ("error", v_str(&err.to_string())),
                    ]),
                );
            }
        } else if alert == AlertState::NoAlert && sub.alert != AlertState::NoAlert {
            log(
                Level::Debug,
                Domain::Alert,
                "alert_rearmed",
                obj(&[
                    ("chat_id", v_num(chat_id as f64)),
                    ("symbol", v_str(&sub.symbol)),
                ]),
            );
        }

        self.registry.store_alert(chat_id, sub, alert).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::FetchError;
    use crate::imbalance::{BookLevel, OrderBook};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    fn test_config() -> Config {
        Config {
            poll_interval_ms: 1,
            idle_interval_ms: 1,
            depth: 10,
            hysteresis_band: 0.02,
            quote_currency: "USDT".to_string(),
            fetch_timeout_ms: 1000,
            fetch_retries: 0,
            binance_base: String::new(),
            telegram_token: None,
            telegram_base: String::new(),
        }
    }

    /// Book whose top-of-book volumes produce the given imbalance.
    fn book_with_imbalance(v: f64) -> OrderBook {
        // bid_vol + ask_vol = 2, bid_vol - ask_vol = 2v
        OrderBook {
            bids: vec![BookLevel { price: 100.0, size: 1.0 + v }],
            asks: vec![BookLevel { price: 101.0, size: 1.0 - v }],
        }
    }

    #[derive(Default)]
    struct ScriptedSource {
        books: Mutex<HashMap<String, Result<OrderBook, FetchError>>>,
        fetches: AtomicU32,
    }

    impl ScriptedSource {
        fn set_imbalance(&self, symbol: &str, v: f64) {
            self.books
                .lock()
                .unwrap()
                .insert(symbol.to_string(), Ok(book_with_imbalance(v)));
        }

        fn set_error(&self, symbol: &str) {
            self.books
                .lock()
                .unwrap()
                .insert(symbol.to_string(), Err(FetchError::Status { code: 503 }));
        }
    }

    #[async_trait]
    impl OrderBookSource for ScriptedSource {
        async fn fetch_order_book(
            &self,
            symbol: &str,
            _depth: usize,
        ) -> Result<OrderBook, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.books.lock().unwrap().get(symbol) {
                Some(Ok(book)) => Ok(book.clone()),
                Some(Err(_)) => Err(FetchError::Status { code: 503 }),
                None => Err(FetchError::UnknownSymbol(symbol.to_string())),
            }
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        sent: Mutex<Vec<(ChatId, String)>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), FetchError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Status { code: 500 });
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn scheduler(
        source: Arc<ScriptedSource>,
        notifier: Arc<CountingNotifier>,
    ) -> (Arc<PollScheduler>, Arc<SubscriptionRegistry>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let sched = Arc::new(PollScheduler::new(
            test_config(),
            registry.clone(),
            source,
            notifier,
        ));
        (sched, registry)
    }

    #[tokio::test]
    async fn alert_fires_and_is_delivered() {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let (sched, registry) = scheduler(source.clone(), notifier.clone());

        registry.set(1, "BTCUSDT".to_string(), 0.3).await;
        source.set_imbalance("BTCUSDT", 0.5);
        sched.tick().await;

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 1);
        assert!(sent[0].1.contains("BTCUSDT"));
    }

    #[tokio::test]
    async fn sustained_pressure_is_damped_until_it_moves() {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let (sched, registry) = scheduler(source.clone(), notifier.clone());
        registry.set(1, "BTCUSDT".to_string(), 0.3).await;

        for (v, expected_total) in [(0.5, 1), (0.51, 1), (0.55, 2), (0.2, 2), (0.31, 3)] {
            source.set_imbalance("BTCUSDT", v);
            sched.tick().await;
            assert_eq!(
                notifier.sent.lock().unwrap().len(),
                expected_total,
                "after reading {}",
                v
            );
        }
    }

    #[tokio::test]
    async fn one_failing_fetch_does_not_block_others() {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let (sched, registry) = scheduler(source.clone(), notifier.clone());

        registry.set(1, "AAAUSDT".to_string(), 0.3).await;
        registry.set(2, "BBBUSDT".to_string(), 0.3).await;
        source.set_error("AAAUSDT");
        source.set_imbalance("BBBUSDT", 0.6);
        sched.tick().await;

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 2);
        // the failed entry keeps its state untouched for the next tick
        assert_eq!(
            registry.get(1).await.unwrap().alert,
            AlertState::NoAlert
        );
    }

    #[tokio::test]
    async fn delivery_failure_still_commits_the_transition() {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let (sched, registry) = scheduler(source.clone(), notifier.clone());

        registry.set(1, "BTCUSDT".to_string(), 0.3).await;
        source.set_imbalance("BTCUSDT", 0.5);
        notifier.fail.store(true, Ordering::SeqCst);
        sched.tick().await;

        assert!(notifier.sent.lock().unwrap().is_empty());
        assert_eq!(
            registry.get(1).await.unwrap().alert,
            AlertState::Alerted(0.5)
        );

        // same reading next tick: no re-fire even though nothing was delivered
        notifier.fail.store(false, Ordering::SeqCst);
        sched.tick().await;
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_trigger_is_idempotent() {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let (sched, _registry) = scheduler(source, notifier);

        assert!(sched.ensure_started());
        assert!(!sched.ensure_started());
        assert!(!sched.ensure_started());
    }

    #[tokio::test]
    async fn duplicate_start_does_not_duplicate_notifications() {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let (sched, registry) = scheduler(source.clone(), notifier.clone());

        registry.set(1, "BTCUSDT".to_string(), 0.3).await;
        source.set_imbalance("BTCUSDT", 0.5);

        sched.ensure_started();
        sched.ensure_started();

        // wait for the loop's first tick rather than racing it
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while notifier.sent.lock().unwrap().is_empty() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "poll loop never ticked"
            );
            sleep(Duration::from_millis(5)).await;
        }

        // with one loop the reading fires once and is then damped; a second
        // loop would race the baseline and double-send within a few ticks
        sleep(Duration::from_millis(50)).await;
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn incomplete_entries_are_never_polled() {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let (sched, registry) = scheduler(source.clone(), notifier.clone());

        registry.set(3, String::new(), 0.3).await;
        registry.set(4, "BTCUSDT".to_string(), f64::NAN).await;
        source.set_imbalance("BTCUSDT", 0.9);
        sched.tick().await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());

        // a complete entry alongside them is still evaluated
        registry.set(5, "BTCUSDT".to_string(), 0.3).await;
        sched.tick().await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_symbol_at_poll_time_is_skipped() {
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let (sched, registry) = scheduler(source, notifier.clone());

        registry.set(1, "GONEUSDT".to_string(), 0.3).await;
        sched.tick().await;
        assert!(notifier.sent.lock().unwrap().is_empty());
    }
}
