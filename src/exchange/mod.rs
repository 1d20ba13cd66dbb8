use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::imbalance::OrderBook;
use crate::state::Config;

mod binance;
pub mod retry;

pub use binance::Binance;

/// Typed fetch failure so callers can tell transient trouble (worth a
/// bounded retry, or just the next tick) from permanent rejection.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http status {code}")]
    Status { code: u16 },
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            FetchError::Status { code } => retry::is_retryable_http_status(*code),
            FetchError::UnknownSymbol(_) | FetchError::Decode(_) => false,
        }
    }
}

/// Supplies current bid/ask levels for a symbol on demand.
#[async_trait]
pub trait OrderBookSource: Send + Sync {
    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError>;
}

/// Best-effort symbol validation at subscribe time. Unavailability must not
/// block subscribing, so callers treat an `Err` as "unknown, proceed".
#[async_trait]
pub trait MarketCatalog: Send + Sync {
    async fn has_symbol(&self, symbol: &str) -> Result<bool, FetchError>;
}

#[derive(Clone, Copy, Debug)]
pub enum ExchangeKind {
    Binance,
}

impl ExchangeKind {
    pub fn from_env() -> Self {
        // Single venue today; the seam stays so another source slots in.
        ExchangeKind::Binance
    }

    pub fn build(self, cfg: &Config) -> anyhow::Result<Arc<Binance>> {
        match self {
            ExchangeKind::Binance => Ok(Arc::new(Binance::new(cfg)?)),
        }
    }
}
