use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::types::Market;

/// Query constraints passed through to the venue's `/markets` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketFilter {
    pub active: bool,
    pub closed: bool,
    /// Gamma sort key (`volume24hr`, `startDate`, ...).
    pub order: Option<String>,
    pub ascending: bool,
}

impl Default for MarketFilter {
    fn default() -> Self {
        Self {
            active: true,
            closed: false,
            order: None,
            ascending: false,
        }
    }
}

impl MarketFilter {
    pub fn ordered_by(order: &str, ascending: bool) -> Self {
        Self {
            order: Some(order.to_string()),
            ascending,
            ..Self::default()
        }
    }
}

/// One market record exactly as the Gamma API returns it. Every field is
/// optional; validation happens in [`parse_market`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarket {
    pub id: Option<String>,
    pub condition_id: Option<String>,
    pub question: Option<String>,
    pub slug: Option<String>,
    pub active: Option<bool>,
    pub closed: Option<bool>,
    /// Number or decimal string depending on the endpoint.
    pub volume: Option<serde_json::Value>,
    /// JSON-encoded array, e.g. `"[\"0.55\", \"0.45\"]"`.
    pub outcome_prices: Option<String>,
    pub outcomes: Option<String>,
    pub clob_token_ids: Option<String>,
    pub end_date: Option<String>,
    pub end_date_iso: Option<String>,
}

#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn fetch_markets(
        &self,
        filter: &MarketFilter,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<RawMarket>>;
}

// ---------------------------------------------------------------------------
// Gamma REST client
// ---------------------------------------------------------------------------

pub struct GammaClient {
    base_url: String,
    http: reqwest::Client,
}

impl GammaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl MarketSource for GammaClient {
    async fn fetch_markets(
        &self,
        filter: &MarketFilter,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<RawMarket>> {
        let mut url = format!(
            "{}/markets?active={}&closed={}&limit={}&offset={}",
            self.base_url, filter.active, filter.closed, page_size, offset
        );
        if let Some(order) = &filter.order {
            url.push_str(&format!("&order={order}&ascending={}", filter.ascending));
        }

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Source(format!("GET /markets returned {status}")));
        }
        let body: serde_json::Value = resp.json().await?;

        let items = match body {
            serde_json::Value::Array(items) => items,
            _ => {
                return Err(AppError::Source(
                    "GAMMA /markets response was not an array".to_string(),
                ))
            }
        };

        let mut markets = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<RawMarket>(item) {
                Ok(m) => markets.push(m),
                Err(e) => debug!("[FETCH] skipping undecodable market record: {e}"),
            }
        }
        Ok(markets)
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub page_size: usize,
    /// 0 = no cap.
    pub max_items: usize,
    /// 0 = no throttle.
    pub max_rps: u32,
}

/// Walk `/markets` pages until the cap, a short page, or an empty page.
/// Sleeps `1s / max_rps` between calls. A failure on the first page is an
/// error; a failure later returns the pages already collected.
pub async fn fetch_all(
    source: &dyn MarketSource,
    filter: &MarketFilter,
    limits: PageLimits,
) -> Result<Vec<RawMarket>> {
    let page_size = limits.page_size.max(1);
    let mut all: Vec<RawMarket> = Vec::new();
    let mut offset = 0usize;

    loop {
        let to_fetch = if limits.max_items > 0 {
            page_size.min(limits.max_items.saturating_sub(all.len()))
        } else {
            page_size
        };
        if to_fetch == 0 {
            break;
        }

        let batch = match source.fetch_markets(filter, to_fetch, offset).await {
            Ok(b) => b,
            Err(e) if all.is_empty() => return Err(e),
            Err(e) => {
                warn!(offset, collected = all.len(), "[FETCH] page failed, using partial results: {e}");
                break;
            }
        };
        if batch.is_empty() {
            break;
        }

        let got = batch.len();
        offset += got;
        all.extend(batch);
        if got < to_fetch {
            break;
        }

        if limits.max_rps > 0 {
            tokio::time::sleep(Duration::from_secs(1) / limits.max_rps).await;
        }
    }

    // A misbehaving source can overshoot the requested page size.
    if limits.max_items > 0 {
        all.truncate(limits.max_items);
    }
    Ok(all)
}

// ---------------------------------------------------------------------------
// Record parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoId,
    NoOutcomes,
    BadPrices,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rejection::NoId => "no_id",
            Rejection::NoOutcomes => "no_outcomes",
            Rejection::BadPrices => "bad_prices",
        };
        write!(f, "{s}")
    }
}

/// Turn a raw record into a [`Market`]. Token ids and end time are optional
/// here; the window scanner requires them, the mispricing scanner does not.
pub fn parse_market(raw: &RawMarket) -> std::result::Result<Market, Rejection> {
    let id = raw
        .condition_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| raw.id.as_deref().filter(|s| !s.is_empty()))
        .ok_or(Rejection::NoId)?
        .to_string();

    let prices: Vec<Decimal> = raw
        .outcome_prices
        .as_deref()
        .and_then(|s| serde_json::from_str::<Vec<serde_json::Value>>(s).ok())
        .ok_or(Rejection::BadPrices)?
        .iter()
        .map(decimal_from_value)
        .collect::<Option<Vec<_>>>()
        .ok_or(Rejection::BadPrices)?;

    let outcomes: Vec<String> = raw
        .outcomes
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    let yes_idx = outcomes
        .iter()
        .position(|o| o.eq_ignore_ascii_case("Yes") || o.eq_ignore_ascii_case("Up"));
    let no_idx = outcomes
        .iter()
        .position(|o| o.eq_ignore_ascii_case("No") || o.eq_ignore_ascii_case("Down"));
    let (yes_idx, no_idx) = match (yes_idx, no_idx) {
        (Some(y), Some(n)) => (y, n),
        _ if prices.len() == 2 && outcomes.len() <= 2 => (0, 1),
        _ => return Err(Rejection::NoOutcomes),
    };

    let yes_price = *prices.get(yes_idx).ok_or(Rejection::BadPrices)?;
    let no_price = *prices.get(no_idx).ok_or(Rejection::BadPrices)?;

    let token_ids: Vec<String> = raw
        .clob_token_ids
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    let yes_token_id = token_ids.get(yes_idx).cloned();
    let no_token_id = token_ids.get(no_idx).cloned();

    let end_time = raw
        .end_date
        .as_deref()
        .and_then(parse_end_time)
        .or_else(|| raw.end_date_iso.as_deref().and_then(parse_end_time));

    let volume = raw
        .volume
        .as_ref()
        .and_then(decimal_from_value)
        .unwrap_or(Decimal::ZERO);

    Ok(Market {
        id,
        question: raw.question.clone().unwrap_or_default(),
        slug: raw.slug.clone(),
        yes_price,
        no_price,
        volume,
        active: raw.active.unwrap_or(false),
        closed: raw.closed.unwrap_or(false),
        end_time,
        yes_token_id,
        no_token_id,
    })
}

/// Parse every record, counting what was dropped per reason.
pub fn parse_markets(raws: &[RawMarket]) -> (Vec<Market>, Vec<(Rejection, usize)>) {
    let mut markets = Vec::with_capacity(raws.len());
    let mut rejected: Vec<(Rejection, usize)> = Vec::new();
    for raw in raws {
        match parse_market(raw) {
            Ok(m) => markets.push(m),
            Err(reason) => {
                debug!(
                    market = raw.id.as_deref().unwrap_or("?"),
                    reason = %reason,
                    "[FILTER] skipping malformed market"
                );
                match rejected.iter_mut().find(|(r, _)| *r == reason) {
                    Some((_, n)) => *n += 1,
                    None => rejected.push((reason, 1)),
                }
            }
        }
    }
    (markets, rejected)
}

fn decimal_from_value(v: &serde_json::Value) -> Option<Decimal> {
    match v {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| Decimal::from_scientific(&n.to_string()).ok()),
        _ => None,
    }
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub fn parse_end_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{raw_market, FakeSource};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_string_prices_and_tokens() {
        let raw = RawMarket {
            condition_id: Some("0xabc".to_string()),
            question: Some("Will BTC be above $100,000?".to_string()),
            outcome_prices: Some(r#"["0.48", "0.49"]"#.to_string()),
            outcomes: Some(r#"["Yes", "No"]"#.to_string()),
            clob_token_ids: Some(r#"["tok-yes", "tok-no"]"#.to_string()),
            volume: Some(serde_json::json!("12345.67")),
            end_date: Some("2026-01-01T12:15:00Z".to_string()),
            active: Some(true),
            closed: Some(false),
            ..RawMarket::default()
        };
        let m = parse_market(&raw).unwrap();
        assert_eq!(m.id, "0xabc");
        assert_eq!(m.yes_price, dec!(0.48));
        assert_eq!(m.no_price, dec!(0.49));
        assert_eq!(m.volume, dec!(12345.67));
        assert_eq!(m.yes_token_id.as_deref(), Some("tok-yes"));
        assert_eq!(m.no_token_id.as_deref(), Some("tok-no"));
        assert_eq!(m.end_time, Some(Utc.with_ymd_and_hms(2026, 1, 1, 12, 15, 0).unwrap()));
        assert!(m.active && !m.closed);
    }

    #[test]
    fn reversed_outcome_labels_follow_the_labels() {
        let raw = RawMarket {
            id: Some("7".to_string()),
            outcome_prices: Some(r#"["0.30", "0.70"]"#.to_string()),
            outcomes: Some(r#"["Down", "Up"]"#.to_string()),
            clob_token_ids: Some(r#"["down-tok", "up-tok"]"#.to_string()),
            ..RawMarket::default()
        };
        let m = parse_market(&raw).unwrap();
        assert_eq!(m.yes_price, dec!(0.70));
        assert_eq!(m.no_price, dec!(0.30));
        assert_eq!(m.yes_token_id.as_deref(), Some("up-tok"));
    }

    #[test]
    fn numeric_prices_are_accepted() {
        let raw = RawMarket {
            id: Some("7".to_string()),
            outcome_prices: Some("[0.55, 0.45]".to_string()),
            ..RawMarket::default()
        };
        let m = parse_market(&raw).unwrap();
        assert_eq!(m.yes_price, dec!(0.55));
        assert_eq!(m.no_price, dec!(0.45));
        assert!(m.yes_token_id.is_none());
    }

    #[test]
    fn malformed_records_are_rejected_with_a_reason() {
        let no_id = RawMarket {
            outcome_prices: Some(r#"["0.5", "0.5"]"#.to_string()),
            ..RawMarket::default()
        };
        assert_eq!(parse_market(&no_id), Err(Rejection::NoId));

        let bad_prices = RawMarket {
            id: Some("1".to_string()),
            outcome_prices: Some(r#"["abc", "0.5"]"#.to_string()),
            ..RawMarket::default()
        };
        assert_eq!(parse_market(&bad_prices), Err(Rejection::BadPrices));

        let three_way = RawMarket {
            id: Some("1".to_string()),
            outcome_prices: Some(r#"["0.2", "0.3", "0.5"]"#.to_string()),
            outcomes: Some(r#"["A", "B", "C"]"#.to_string()),
            ..RawMarket::default()
        };
        assert_eq!(parse_market(&three_way), Err(Rejection::NoOutcomes));
    }

    #[test]
    fn parse_markets_counts_rejections() {
        let raws = vec![
            raw_market("a", "Q1", "0.5", "0.5"),
            RawMarket::default(),
            RawMarket::default(),
        ];
        let (markets, rejected) = parse_markets(&raws);
        assert_eq!(markets.len(), 1);
        assert_eq!(rejected, vec![(Rejection::NoId, 2)]);
    }

    #[test]
    fn date_only_end_time_is_midnight_utc() {
        assert_eq!(
            parse_end_time("2026-03-01"),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_end_time("soon"), None);
    }

    fn many(n: usize) -> Vec<RawMarket> {
        (0..n)
            .map(|i| raw_market(&format!("m{i}"), "Q", "0.5", "0.5"))
            .collect()
    }

    #[tokio::test]
    async fn fetch_all_respects_max_items() {
        let source = FakeSource::new(many(250));
        let limits = PageLimits { page_size: 100, max_items: 150, max_rps: 0 };
        let got = fetch_all(&source, &MarketFilter::default(), limits).await.unwrap();
        assert_eq!(got.len(), 150);
        assert_eq!(source.calls(), vec![(100, 0), (50, 100)]);
    }

    #[tokio::test]
    async fn fetch_all_stops_on_short_page() {
        let source = FakeSource::new(many(130));
        let limits = PageLimits { page_size: 100, max_items: 0, max_rps: 0 };
        let got = fetch_all(&source, &MarketFilter::default(), limits).await.unwrap();
        assert_eq!(got.len(), 130);
        assert_eq!(source.calls(), vec![(100, 0), (100, 100)]);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_all_sleeps_between_pages() {
        let source = FakeSource::new(many(300));
        let limits = PageLimits { page_size: 100, max_items: 0, max_rps: 2 };
        let started = tokio::time::Instant::now();
        let got = fetch_all(&source, &MarketFilter::default(), limits).await.unwrap();
        assert_eq!(got.len(), 300);
        // three full pages, an empty fourth; 500ms between each call
        assert_eq!(source.calls().len(), 4);
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn first_page_failure_is_an_error() {
        let source = FakeSource::new(many(10));
        source.fail_from_offset(0);
        let limits = PageLimits { page_size: 5, max_items: 0, max_rps: 0 };
        assert!(fetch_all(&source, &MarketFilter::default(), limits).await.is_err());
    }

    #[tokio::test]
    async fn later_page_failure_keeps_partial_results() {
        let source = FakeSource::new(many(10));
        source.fail_from_offset(5);
        let limits = PageLimits { page_size: 5, max_items: 0, max_rps: 0 };
        let got = fetch_all(&source, &MarketFilter::default(), limits).await.unwrap();
        assert_eq!(got.len(), 5);
    }
}
