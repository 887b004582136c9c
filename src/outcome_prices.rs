//! Live outcome-token prices from the CLOB order book.
//!
//! Gamma's `outcomePrices` lag the book. Window scanners refresh yes/no from
//! the CLOB midpoint when it answers and keep the listing's prices otherwise.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};

#[async_trait]
pub trait OutcomePriceSource: Send + Sync {
    /// Midpoint for one outcome token, or None when the book has no answer.
    async fn midpoint(&self, token_id: &str) -> Option<Decimal>;
}

/// Yes and no midpoints fetched side by side. None unless both sides answer,
/// so a window never mixes book and listing prices.
pub async fn live_prices(
    source: &dyn OutcomePriceSource,
    yes_token_id: &str,
    no_token_id: &str,
) -> Option<(Decimal, Decimal)> {
    let (yes, no) = tokio::join!(source.midpoint(yes_token_id), source.midpoint(no_token_id));
    Some((yes?, no?))
}

#[derive(Debug, Deserialize)]
struct MidpointResponse {
    mid: String,
}

pub struct ClobClient {
    base_url: String,
    http: reqwest::Client,
}

impl ClobClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn fetch_midpoint(&self, token_id: &str) -> Result<Decimal> {
        let url = format!("{}/midpoint?token_id={token_id}", self.base_url);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Source(format!("midpoint {token_id} returned {status}")));
        }
        let body: MidpointResponse = resp.json().await?;
        parse_mid(&body.mid)
            .ok_or_else(|| AppError::Source(format!("midpoint {token_id} unusable: {:?}", body.mid)))
    }
}

#[async_trait]
impl OutcomePriceSource for ClobClient {
    async fn midpoint(&self, token_id: &str) -> Option<Decimal> {
        match self.fetch_midpoint(token_id).await {
            Ok(mid) => Some(mid),
            Err(e) => {
                debug!(token_id, "[CLOB] midpoint failed: {e}");
                None
            }
        }
    }
}

/// Midpoints are probabilities; anything outside (0, 1] is rejected.
fn parse_mid(raw: &str) -> Option<Decimal> {
    let mid = Decimal::from_str(raw.trim()).ok()?;
    (mid > Decimal::ZERO && mid <= Decimal::ONE).then_some(mid)
}
