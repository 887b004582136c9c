//! Control surface over the scanners, the registry and the broadcast fabric.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::health::HealthState;
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::broadcast::{BroadcastStats, Broadcaster};
use crate::config::Config;
use crate::fetcher::{MarketSource, PageLimits};
use crate::outcome_prices::OutcomePriceSource;
use crate::price_feed::PriceFeed;
use crate::scanner::{MarketScanner, WindowScanner};
use crate::state::WindowRegistry;
use crate::types::{Opportunity, Signal, Window};

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub running: bool,
    pub active_windows: usize,
    pub latest_opportunities: usize,
    pub fabric: BroadcastStats,
    pub market_scan: LatencySummary,
    pub window_scan: LatencySummary,
    pub market_scan_failures: u64,
    pub window_scan_failures: u64,
}

pub struct Engine {
    config: Config,
    source: Arc<dyn MarketSource>,
    feed: Arc<dyn PriceFeed>,
    outcome_prices: Option<Arc<dyn OutcomePriceSource>>,
    registry: Arc<WindowRegistry>,
    fabric: Arc<Broadcaster<Signal>>,
    latest: Arc<RwLock<Vec<Opportunity>>>,
    health: Arc<HealthState>,
    market_latency: Arc<LatencyStats>,
    window_latency: Arc<LatencyStats>,
    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: Config, source: Arc<dyn MarketSource>, feed: Arc<dyn PriceFeed>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            fabric: Arc::new(Broadcaster::new(config.subscriber_capacity)),
            config,
            source,
            feed,
            outcome_prices: None,
            registry: WindowRegistry::new(),
            latest: Arc::new(RwLock::new(Vec::new())),
            health: Arc::new(HealthState::new()),
            market_latency: Arc::new(LatencyStats::new()),
            window_latency: Arc::new(LatencyStats::new()),
            stop_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Window scanners refresh yes/no from `book` before each upsert.
    pub fn with_outcome_prices(mut self, book: Arc<dyn OutcomePriceSource>) -> Self {
        self.outcome_prices = Some(book);
        self
    }

    /// Spawn the market scanner and one window scanner per configured asset.
    /// A second call while running is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Engine already running, start ignored");
            return;
        }
        self.stop_tx.send_replace(false);

        let limits = PageLimits {
            page_size: self.config.page_size,
            max_items: self.config.max_markets,
            max_rps: self.config.max_rps,
        };

        let market_scanner = MarketScanner::new(
            Arc::clone(&self.source),
            Arc::clone(&self.fabric),
            Arc::clone(&self.latest),
            Arc::clone(&self.health),
            Arc::clone(&self.market_latency),
            limits,
            self.config.min_spread_pct,
            self.config.scan_interval,
        );
        let stop = self.stop_tx.subscribe();
        tasks.push(tokio::spawn(async move { market_scanner.run(stop).await }));

        for asset in &self.config.window_assets {
            let mut scanner = WindowScanner::new(
                asset.clone(),
                Arc::clone(&self.source),
                Arc::clone(&self.feed),
                Arc::clone(&self.registry),
                Arc::clone(&self.fabric),
                Arc::clone(&self.health),
                Arc::clone(&self.window_latency),
                limits,
                self.config.window_scan_interval,
            );
            if let Some(book) = &self.outcome_prices {
                scanner = scanner.with_outcome_prices(Arc::clone(book));
            }
            let stop = self.stop_tx.subscribe();
            tasks.push(tokio::spawn(async move { scanner.run(stop).await }));
        }

        self.health.set_running(true);
        info!(
            "Engine started: market scanner + {} window scanner(s) [{}]",
            self.config.window_assets.len(),
            self.config
                .window_assets
                .iter()
                .map(|a| a.symbol.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    /// Signal every scanner to stop at its next tick boundary and wait for
    /// in-flight cycles to finish.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Scanner task ended abnormally: {e}");
            }
        }
        self.health.set_running(false);
        info!("Engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.health.running()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<Signal> {
        self.fabric.subscribe()
    }

    pub fn active_windows(&self) -> Vec<Window> {
        self.registry.active()
    }

    pub fn sniper_ready(&self, min_secs: f64, max_secs: f64) -> Vec<Window> {
        self.registry.sniper_ready(min_secs, max_secs)
    }

    /// Opportunities from the most recent successful market scan.
    pub fn latest_opportunities(&self) -> Vec<Opportunity> {
        self.latest.read().clone()
    }

    #[cfg(test)]
    pub fn registry(&self) -> Arc<WindowRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            running: self.is_running(),
            active_windows: self.registry.active().len(),
            latest_opportunities: self.latest.read().len(),
            fabric: self.fabric.stats(),
            market_scan: self.market_latency.summary(),
            window_scan: self.window_latency.summary(),
            market_scan_failures: self.health.market_scan_failures(),
            window_scan_failures: self.health.window_scan_failures(),
        }
    }
}
