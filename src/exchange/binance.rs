use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::exchange::{FetchError, MarketCatalog, OrderBookSource};
use crate::imbalance::{BookLevel, OrderBook};
use crate::state::Config;

pub struct Binance {
    client: Client,
    base: String,
}

impl Binance {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.fetch_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base: cfg.binance_base.clone(),
        })
    }
}

/// REST depth payload: levels arrive as ["price", "qty"] string pairs.
#[derive(Deserialize, Debug)]
struct DepthResponse {
    bids: Vec<(String, String)>,
    asks: Vec<(String, String)>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    code: i64,
    #[allow(dead_code)]
    msg: String,
}

// Binance rejects an unknown pair with HTTP 400 and code -1121/-1100.
const CODE_INVALID_SYMBOL: i64 = -1121;
const CODE_ILLEGAL_CHARS: i64 = -1100;

fn parse_levels(raw: Vec<(String, String)>) -> Result<Vec<BookLevel>, FetchError> {
    raw.into_iter()
        .map(|(price, size)| {
            let price = price
                .parse::<f64>()
                .map_err(|_| FetchError::Decode(format!("bad price {:?}", price)))?;
            let size = size
                .parse::<f64>()
                .map_err(|_| FetchError::Decode(format!("bad size {:?}", size)))?;
            Ok(BookLevel { price, size })
        })
        .collect()
}

fn classify_status(symbol: &str, code: u16, body: &str) -> FetchError {
    if code == 400 {
        if let Ok(err) = serde_json::from_str::<ApiError>(body) {
            if err.code == CODE_INVALID_SYMBOL || err.code == CODE_ILLEGAL_CHARS {
                return FetchError::UnknownSymbol(symbol.to_string());
            }
        }
    }
    FetchError::Status { code }
}

#[async_trait]
impl OrderBookSource for Binance {
    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, FetchError> {
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base, symbol, depth
        );
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(symbol, status.as_u16(), &body));
        }
        let depth_resp: DepthResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(OrderBook {
            bids: parse_levels(depth_resp.bids)?,
            asks: parse_levels(depth_resp.asks)?,
        })
    }
}

#[async_trait]
impl MarketCatalog for Binance {
    async fn has_symbol(&self, symbol: &str) -> Result<bool, FetchError> {
        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base, symbol);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        let body = resp.text().await.unwrap_or_default();
        match classify_status(symbol, status.as_u16(), &body) {
            FetchError::UnknownSymbol(_) => Ok(false),
            err => Err(err),
        }
    }
}
