use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::schedule::run_every;
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::broadcast::{Broadcaster, PublishReport};
use crate::config::AssetProfile;
use crate::error::Result;
use crate::fetcher::{fetch_all, parse_market, MarketFilter, MarketSource, PageLimits};
use crate::outcome_prices::{live_prices, OutcomePriceSource};
use crate::price_feed::PriceFeed;
use crate::question::{parse_window_question, QuestionMismatch};
use crate::state::{UpsertResult, WindowRegistry};
use crate::types::{Market, ObservedWindow, Signal, WindowEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRejection {
    Closed,
    Question(QuestionMismatch),
    NoTokens,
    NoEndTime,
}

impl std::fmt::Display for WindowRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowRejection::Closed => write!(f, "closed"),
            WindowRejection::Question(q) => write!(f, "{q}"),
            WindowRejection::NoTokens => write!(f, "no_tokens"),
            WindowRejection::NoEndTime => write!(f, "no_end_time"),
        }
    }
}

/// Decide whether `market` is a window for `asset` and lift it into an observation.
pub fn observe_window(
    market: &Market,
    asset: &AssetProfile,
    now: DateTime<Utc>,
) -> std::result::Result<ObservedWindow, WindowRejection> {
    if market.closed {
        return Err(WindowRejection::Closed);
    }
    let parsed = parse_window_question(&market.question, asset).map_err(WindowRejection::Question)?;
    let (Some(yes_token_id), Some(no_token_id)) = (&market.yes_token_id, &market.no_token_id) else {
        return Err(WindowRejection::NoTokens);
    };
    let end_time = market.end_time.ok_or(WindowRejection::NoEndTime)?;

    Ok(ObservedWindow {
        market_id: market.id.clone(),
        asset: asset.symbol.clone(),
        feed_symbol: asset.feed_symbol.clone(),
        question: market.question.clone(),
        target_price: parsed.target_price,
        window_minutes: parsed.window_minutes,
        end_time,
        yes_token_id: yes_token_id.clone(),
        no_token_id: no_token_id.clone(),
        yes_price: market.yes_price,
        no_price: market.no_price,
        observed_at: now,
    })
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowScanSummary {
    pub fetched: usize,
    /// Records that did not parse as a market at all.
    pub rejected: usize,
    pub matched: usize,
    /// Matched windows whose yes/no came from the order book this cycle.
    pub live_priced: usize,
    pub created: usize,
    pub updated: usize,
    pub deferred: usize,
    pub expired: usize,
    pub report: PublishReport,
}

/// Periodic window discovery for one asset. Windows live in the shared
/// registry, so several scanners can run side by side.
pub struct WindowScanner {
    asset: AssetProfile,
    source: Arc<dyn MarketSource>,
    feed: Arc<dyn PriceFeed>,
    outcome_prices: Option<Arc<dyn OutcomePriceSource>>,
    registry: Arc<WindowRegistry>,
    fabric: Arc<Broadcaster<Signal>>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    filter: MarketFilter,
    limits: PageLimits,
    interval: Duration,
}

impl WindowScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        asset: AssetProfile,
        source: Arc<dyn MarketSource>,
        feed: Arc<dyn PriceFeed>,
        registry: Arc<WindowRegistry>,
        fabric: Arc<Broadcaster<Signal>>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        limits: PageLimits,
        interval: Duration,
    ) -> Self {
        Self {
            asset,
            source,
            feed,
            outcome_prices: None,
            registry,
            fabric,
            health,
            latency,
            // Rolling short-timeframe markets are created minutes before they open.
            filter: MarketFilter::ordered_by("startDate", false),
            limits,
            interval,
        }
    }

    /// Refresh matched windows' yes/no from `book` before each upsert.
    pub fn with_outcome_prices(mut self, book: Arc<dyn OutcomePriceSource>) -> Self {
        self.outcome_prices = Some(book);
        self
    }

    pub async fn run(self, stop: watch::Receiver<bool>) {
        info!(
            asset = %self.asset.symbol,
            "Window scanner started (every {}s)",
            self.interval.as_secs()
        );
        let this = &self;
        let name = format!("Window scanner {}", self.asset.symbol);
        run_every(&name, self.interval, stop, move || this.tick()).await;
    }

    async fn tick(&self) {
        if let Err(e) = self.scan_once().await {
            self.health.inc_window_scan_failures();
            error!(asset = %self.asset.symbol, "Window scan failed: {e}");
        }
    }

    /// Fetch and upsert every matching window, publish the cycle's events,
    /// then sweep and publish expiries.
    pub async fn scan_once(&self) -> Result<WindowScanSummary> {
        let started = Instant::now();
        let raws = fetch_all(self.source.as_ref(), &self.filter, self.limits).await?;
        let now = Utc::now();

        let mut summary = WindowScanSummary {
            fetched: raws.len(),
            ..WindowScanSummary::default()
        };
        let mut events: Vec<Signal> = Vec::new();

        for raw in &raws {
            let market = match parse_market(raw) {
                Ok(m) => m,
                Err(_) => {
                    summary.rejected += 1;
                    continue;
                }
            };
            let mut observed = match observe_window(&market, &self.asset, now) {
                Ok(o) => o,
                Err(WindowRejection::Question(_)) => continue,
                Err(reason) => {
                    debug!(
                        asset = %self.asset.symbol,
                        market_id = %market.id,
                        reason = %reason,
                        "[WINDOW] candidate skipped"
                    );
                    continue;
                }
            };
            summary.matched += 1;

            if let Some(book) = &self.outcome_prices {
                if let Some((yes, no)) =
                    live_prices(book.as_ref(), &observed.yes_token_id, &observed.no_token_id).await
                {
                    observed.yes_price = yes;
                    observed.no_price = no;
                    summary.live_priced += 1;
                }
            }

            match self.registry.upsert(observed, self.feed.as_ref()).await {
                UpsertResult::Created(w) => {
                    summary.created += 1;
                    info!(
                        asset = %w.asset,
                        market_id = %w.market_id,
                        target = %w.target_price,
                        start = %w.start_price,
                        "[WINDOW] new window | target ${} | start ${} | ends {}",
                        w.target_price,
                        w.start_price,
                        w.end_time,
                    );
                    events.push(Signal::Window(WindowEvent::Created(w)));
                }
                UpsertResult::Updated(w) => {
                    summary.updated += 1;
                    events.push(Signal::Window(WindowEvent::Updated(w)));
                }
                UpsertResult::Deferred => {
                    summary.deferred += 1;
                    warn!(
                        asset = %self.asset.symbol,
                        market_id = %market.id,
                        "[WINDOW] no reference price, deferring new window"
                    );
                }
                UpsertResult::Stale => {}
            }
        }

        summary.report = self.fabric.publish_all(&events);

        let expired = self.registry.sweep_expired(Utc::now(), self.feed.as_ref()).await;
        summary.expired = expired.len();
        let mut expiries: Vec<Signal> = Vec::with_capacity(expired.len());
        for e in expired {
            if e.outcome.is_none() {
                warn!(
                    market_id = %e.window.market_id,
                    asset = %e.window.asset,
                    "[WINDOW] expired without an end price, outcome unknown"
                );
            }
            expiries.push(Signal::Window(WindowEvent::Expired(e)));
        }
        summary.report.absorb(self.fabric.publish_all(&expiries));

        self.latency.record(started.elapsed());
        self.health.mark_window_scan(now);

        info!(
            asset = %self.asset.symbol,
            matched = summary.matched,
            rejected = summary.rejected,
            live_priced = summary.live_priced,
            created = summary.created,
            expired = summary.expired,
            active = self.registry.len(),
            "[SCAN] {} windows | matched: {} | rejected: {} | new: {} | expired: {} | took {:?}",
            self.asset.symbol,
            summary.matched,
            summary.rejected,
            summary.created,
            summary.expired,
            started.elapsed(),
        );
        Ok(summary)
    }
}
