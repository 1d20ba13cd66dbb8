//! The subscription registry: the one shared mutable structure.
//!
//! Command handlers replace or remove whole entries; the poll scheduler
//! snapshots the map at tick start and writes alert state back per entry.
//! A coarse async RwLock is enough; there is no cross-entry transaction.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::alert::AlertState;

/// Subscriber identity (Telegram chat id).
pub type ChatId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Normalized pair, e.g. "BTCUSDT".
    pub symbol: String,
    pub threshold: f64,
    pub alert: AlertState,
}

impl Subscription {
    pub fn new(symbol: String, threshold: f64) -> Self {
        Self {
            symbol,
            threshold,
            alert: AlertState::NoAlert,
        }
    }

    /// An entry must have a symbol and a usable threshold before it is
    /// eligible for polling. Construction makes this nearly impossible to
    /// violate; the scheduler still checks rather than crashing the loop.
    pub fn is_complete(&self) -> bool {
        !self.symbol.is_empty() && self.threshold.is_finite()
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<HashMap<ChatId, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale create-or-replace. Replacing resets the alert baseline.
    pub async fn set(&self, chat_id: ChatId, symbol: String, threshold: f64) {
        let mut map = self.inner.write().await;
        map.insert(chat_id, Subscription::new(symbol, threshold));
    }

    /// Returns whether an entry existed.
    pub async fn remove(&self, chat_id: ChatId) -> bool {
        self.inner.write().await.remove(&chat_id).is_some()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn get(&self, chat_id: ChatId) -> Option<Subscription> {
        self.inner.read().await.get(&chat_id).cloned()
    }

    /// Point-in-time copy for one tick, so additions and removals during
    /// the tick cannot skip or duplicate entries mid-cycle.
    pub async fn snapshot(&self) -> Vec<(ChatId, Subscription)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(id, sub)| (*id, sub.clone()))
            .collect()
    }

    /// Write an evaluated alert state back for the subscription captured in
    /// a tick snapshot. If the entry was removed or replaced since the
    /// snapshot was taken, the stale result is dropped: a fresh
    /// subscription starts from `NoAlert`, not from an old baseline.
    pub async fn store_alert(&self, chat_id: ChatId, seen: &Subscription, alert: AlertState) {
        let mut map = self.inner.write().await;
        if let Some(current) = map.get_mut(&chat_id) {
            if current.symbol == seen.symbol && current.threshold == seen.threshold {
                current.alert = alert;
            }
        }
    }
}
