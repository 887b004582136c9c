//! In-memory stand-ins for the venue, the order book and the price feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};
use crate::fetcher::{MarketFilter, MarketSource, RawMarket};
use crate::outcome_prices::OutcomePriceSource;
use crate::price_feed::PriceFeed;

pub fn raw_market(id: &str, question: &str, yes: &str, no: &str) -> RawMarket {
    RawMarket {
        id: Some(id.to_string()),
        question: Some(question.to_string()),
        outcome_prices: Some(format!(r#"["{yes}", "{no}"]"#)),
        outcomes: Some(r#"["Yes", "No"]"#.to_string()),
        active: Some(true),
        closed: Some(false),
        ..RawMarket::default()
    }
}

pub fn raw_window_market(id: &str, question: &str, end: DateTime<Utc>, yes: &str, no: &str) -> RawMarket {
    RawMarket {
        clob_token_ids: Some(format!(r#"["{id}-yes", "{id}-no"]"#)),
        end_date: Some(end.to_rfc3339()),
        ..raw_market(id, question, yes, no)
    }
}

/// Serves a fixed market list page by page and records every call.
#[derive(Default)]
pub struct FakeSource {
    markets: Mutex<Vec<RawMarket>>,
    calls: Mutex<Vec<(usize, usize)>>,
    fail_from: Mutex<Option<usize>>,
}

impl FakeSource {
    pub fn new(markets: Vec<RawMarket>) -> Self {
        Self {
            markets: Mutex::new(markets),
            ..Self::default()
        }
    }

    pub fn set_markets(&self, markets: Vec<RawMarket>) {
        *self.markets.lock() = markets;
    }

    /// Every call at or past `offset` fails.
    pub fn fail_from_offset(&self, offset: usize) {
        *self.fail_from.lock() = Some(offset);
    }

    pub fn heal(&self) {
        *self.fail_from.lock() = None;
    }

    /// `(page_size, offset)` per call.
    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MarketSource for FakeSource {
    async fn fetch_markets(
        &self,
        _filter: &MarketFilter,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<RawMarket>> {
        self.calls.lock().push((page_size, offset));
        if matches!(*self.fail_from.lock(), Some(from) if offset >= from) {
            return Err(AppError::Source("fake outage".to_string()));
        }
        let markets = self.markets.lock();
        let start = offset.min(markets.len());
        let end = (offset + page_size).min(markets.len());
        Ok(markets[start..end].to_vec())
    }
}

#[derive(Default)]
pub struct FakeFeed {
    prices: Mutex<HashMap<String, Decimal>>,
    lookups: AtomicUsize,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(symbol: &str, price: Decimal) -> Self {
        let feed = Self::default();
        feed.set(symbol, price);
        feed
    }

    pub fn set(&self, symbol: &str, price: Decimal) {
        self.prices.lock().insert(symbol.to_string(), price);
    }

    pub fn clear(&self, symbol: &str) {
        self.prices.lock().remove(symbol);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for FakeFeed {
    async fn current_price(&self, symbol: &str) -> Option<Decimal> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.prices.lock().get(symbol).copied()
    }
}

/// Midpoints by token id.
#[derive(Default)]
pub struct FakeBook {
    mids: Mutex<HashMap<String, Decimal>>,
    lookups: AtomicUsize,
}

impl FakeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token_id: &str, mid: Decimal) {
        self.mids.lock().insert(token_id.to_string(), mid);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutcomePriceSource for FakeBook {
    async fn midpoint(&self, token_id: &str) -> Option<Decimal> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.mids.lock().get(token_id).copied()
    }
}
