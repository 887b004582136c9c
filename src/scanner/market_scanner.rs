use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{error, info};

use super::schedule::run_every;
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::broadcast::{Broadcaster, PublishReport};
use crate::detector::find_opportunities;
use crate::error::Result;
use crate::fetcher::{fetch_all, parse_markets, MarketFilter, MarketSource, PageLimits};
use crate::types::{Opportunity, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketScanSummary {
    pub fetched: usize,
    pub rejected: usize,
    pub opportunities: usize,
    pub report: PublishReport,
}

/// Periodic mispricing scan across all active markets.
pub struct MarketScanner {
    source: Arc<dyn MarketSource>,
    fabric: Arc<Broadcaster<Signal>>,
    latest: Arc<RwLock<Vec<Opportunity>>>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    filter: MarketFilter,
    limits: PageLimits,
    min_spread_pct: Decimal,
    interval: Duration,
}

impl MarketScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn MarketSource>,
        fabric: Arc<Broadcaster<Signal>>,
        latest: Arc<RwLock<Vec<Opportunity>>>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        limits: PageLimits,
        min_spread_pct: Decimal,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            fabric,
            latest,
            health,
            latency,
            filter: MarketFilter::ordered_by("volume24hr", false),
            limits,
            min_spread_pct,
            interval,
        }
    }

    pub async fn run(self, stop: watch::Receiver<bool>) {
        info!(
            "Market scanner started (every {}s, min spread {}%)",
            self.interval.as_secs(),
            self.min_spread_pct
        );
        let this = &self;
        run_every("Market scanner", self.interval, stop, move || this.tick()).await;
    }

    async fn tick(&self) {
        if let Err(e) = self.scan_once().await {
            self.health.inc_market_scan_failures();
            error!("Market scan failed: {e}");
        }
    }

    /// One fetch → classify → publish cycle. Every market is classified
    /// before anything is published.
    pub async fn scan_once(&self) -> Result<MarketScanSummary> {
        let started = Instant::now();
        let raws = fetch_all(self.source.as_ref(), &self.filter, self.limits).await?;
        let (markets, rejected) = parse_markets(&raws);
        let rejected: usize = rejected.iter().map(|(_, n)| n).sum();

        let now = Utc::now();
        let opportunities = find_opportunities(&markets, self.min_spread_pct, now);
        *self.latest.write() = opportunities.clone();

        let signals: Vec<Signal> = opportunities.into_iter().map(Signal::Opportunity).collect();
        let report = self.fabric.publish_all(&signals);

        self.latency.record(started.elapsed());
        self.health.mark_market_scan(now);

        let summary = MarketScanSummary {
            fetched: raws.len(),
            rejected,
            opportunities: signals.len(),
            report,
        };
        info!(
            markets = summary.fetched,
            rejected = summary.rejected,
            opportunities = summary.opportunities,
            delivered = report.delivered,
            dropped = report.dropped,
            "[SCAN] markets: {} | rejected: {} | opportunities: {} | took {:?}",
            summary.fetched,
            summary.rejected,
            summary.opportunities,
            started.elapsed(),
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::RawMarket;
    use crate::testkit::{raw_market, FakeSource};
    use crate::types::Classification;
    use rust_decimal_macros::dec;

    struct Harness {
        source: Arc<FakeSource>,
        fabric: Arc<Broadcaster<Signal>>,
        latest: Arc<RwLock<Vec<Opportunity>>>,
        health: Arc<HealthState>,
        scanner: MarketScanner,
    }

    fn harness(markets: Vec<RawMarket>) -> Harness {
        let source = Arc::new(FakeSource::new(markets));
        let fabric = Arc::new(Broadcaster::new(100));
        let latest = Arc::new(RwLock::new(Vec::new()));
        let health = Arc::new(HealthState::new());
        let scanner = MarketScanner::new(
            source.clone(),
            fabric.clone(),
            latest.clone(),
            health.clone(),
            Arc::new(LatencyStats::new()),
            PageLimits { page_size: 100, max_items: 200, max_rps: 0 },
            dec!(1.0),
            Duration::from_secs(30),
        );
        Harness { source, fabric, latest, health, scanner }
    }

    #[tokio::test]
    async fn publishes_only_mispriced_markets() {
        let h = harness(vec![
            raw_market("under", "Q1", "0.48", "0.49"),
            raw_market("fair", "Q2", "0.50", "0.50"),
            raw_market("severe", "Q3", "0.60", "0.55"),
            RawMarket::default(),
        ]);
        let mut rx = h.fabric.subscribe();

        let summary = h.scanner.scan_once().await.unwrap();
        assert_eq!(summary.fetched, 4);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.opportunities, 2);
        assert_eq!(summary.report.delivered, 2);

        let mut classes = Vec::new();
        while let Ok(Signal::Opportunity(o)) = rx.try_recv() {
            classes.push((o.market.id, o.classification));
        }
        assert_eq!(
            classes,
            vec![
                ("under".to_string(), Classification::Underpriced),
                ("severe".to_string(), Classification::SevereMispricing),
            ]
        );
        assert_eq!(h.latest.read().len(), 2);
        assert!(h.health.last_market_scan().is_some());
    }

    #[tokio::test]
    async fn source_outage_fails_the_cycle_and_keeps_last_results() {
        let h = harness(vec![raw_market("under", "Q1", "0.48", "0.49")]);
        h.scanner.scan_once().await.unwrap();

        h.source.fail_from_offset(0);
        assert!(h.scanner.scan_once().await.is_err());
        assert_eq!(h.latest.read().len(), 1);

        h.scanner.tick().await;
        assert_eq!(h.health.market_scan_failures(), 1);

        h.source.heal();
        h.source.set_markets(vec![raw_market("fair", "Q", "0.5", "0.5")]);
        h.scanner.scan_once().await.unwrap();
        assert!(h.latest.read().is_empty());
    }
}
