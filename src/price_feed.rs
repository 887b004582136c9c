//! Reference price lookups for window assets.
//!
//! The registry only needs "what is BTC trading at right now". A missing
//! quote is `None`, never an error: callers decide whether to defer.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Latest quote for `symbol` (`BTCUSDT`), or None when no quote is available.
    async fn current_price(&self, symbol: &str) -> Option<Decimal>;
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

/// Binance spot ticker over REST. Keeps the last good quote per symbol and
/// serves it when a request fails.
pub struct BinancePriceFeed {
    base_url: String,
    http: reqwest::Client,
    last_good: DashMap<String, Decimal>,
}

impl BinancePriceFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            last_good: DashMap::new(),
        })
    }

    async fn fetch(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/api/v3/ticker/price?symbol={symbol}", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Source(format!("ticker {symbol} returned {status}")));
        }
        let ticker: TickerPrice = resp.json().await?;
        let price = Decimal::from_str(ticker.price.trim())
            .map_err(|e| AppError::Source(format!("ticker {symbol} price {:?}: {e}", ticker.price)))?;
        if price <= Decimal::ZERO {
            return Err(AppError::Source(format!("ticker {symbol} returned non-positive price")));
        }
        Ok(price)
    }
}

#[async_trait]
impl PriceFeed for BinancePriceFeed {
    async fn current_price(&self, symbol: &str) -> Option<Decimal> {
        match self.fetch(symbol).await {
            Ok(price) => {
                debug!(symbol, price = %price, "[PRICE] quote");
                self.last_good.insert(symbol.to_string(), price);
                Some(price)
            }
            Err(e) => {
                let cached = self.last_good.get(symbol).map(|p| *p);
                warn!(
                    symbol,
                    cached = cached.is_some(),
                    "[PRICE] quote failed: {e}"
                );
                cached
            }
        }
    }
}
