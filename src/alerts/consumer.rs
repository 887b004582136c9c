use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::cooldown::CooldownLedger;
use crate::types::{ExpiredWindow, Opportunity, Signal, Window, WindowEvent};

/// Signals handled between two ledger prunes.
const PRUNE_EVERY: u64 = 256;

/// Fabric subscriber that turns signals into operator alerts, throttled per
/// market by a [`CooldownLedger`]. Window resolutions always alert.
pub struct AlertConsumer {
    rx: mpsc::Receiver<Signal>,
    ledger: CooldownLedger,
    handled: u64,
}

impl AlertConsumer {
    pub fn new(rx: mpsc::Receiver<Signal>, cooldown: Duration) -> Self {
        Self {
            rx,
            ledger: CooldownLedger::new(cooldown),
            handled: 0,
        }
    }

    pub async fn run(mut self) {
        while let Some(signal) = self.rx.recv().await {
            self.handle(&signal, Utc::now());
        }
        debug!("[ALERT] fabric closed, consumer exiting");
    }

    /// Returns whether an alert was emitted.
    fn handle(&mut self, signal: &Signal, now: DateTime<Utc>) -> bool {
        self.handled += 1;
        if self.handled % PRUNE_EVERY == 0 {
            let pruned = self.ledger.prune(now);
            debug!(pruned, tracked = self.ledger.len(), "[ALERT] cooldown ledger pruned");
        }

        match signal {
            Signal::Opportunity(o) => {
                if !self.ledger.should_alert(&o.market.id, now) {
                    debug!(market_id = %o.market.id, "[ALERT] opportunity suppressed by cooldown");
                    return false;
                }
                log_opportunity(o);
                true
            }
            Signal::Window(WindowEvent::Created(w)) => {
                if !self.ledger.should_alert(&window_key(&w.market_id), now) {
                    return false;
                }
                log_window_detected(w, now);
                true
            }
            Signal::Window(WindowEvent::Updated(_)) => false,
            Signal::Window(WindowEvent::Expired(e)) => {
                log_window_resolved(e);
                true
            }
        }
    }
}

/// Window detections throttle apart from opportunities on the same market.
fn window_key(market_id: &str) -> String {
    format!("win:{market_id}")
}

fn log_opportunity(o: &Opportunity) {
    info!(
        event = "OPPORTUNITY",
        market_id = %o.market.id,
        classification = %o.classification,
        total = %o.total_price,
        spread_pct = %o.spread_pct,
        "OPPORTUNITY  | {} | yes: {} | no: {} | total: {} | spread: {:.2}% | {}",
        o.classification, o.yes_price, o.no_price, o.total_price, o.spread_pct, o.market.question,
    );
}

fn log_window_detected(w: &Window, now: DateTime<Utc>) {
    info!(
        event = "WINDOW_DETECTED",
        market_id = %w.market_id,
        asset = %w.asset,
        target = %w.target_price,
        start = %w.start_price,
        "WINDOW NEW   | {} | target: ${} | start: ${} | {}m | ends in {:.0}s",
        w.asset, w.target_price, w.start_price, w.window_minutes, w.remaining_secs(now),
    );
}

fn log_window_resolved(e: &ExpiredWindow) {
    let w = &e.window;
    let end_price = e
        .end_price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    let outcome = e
        .outcome
        .map(|o| o.to_string())
        .unwrap_or_else(|| "UNRESOLVED".to_string());
    info!(
        event = "WINDOW_RESOLVED",
        market_id = %w.market_id,
        asset = %w.asset,
        outcome = %outcome,
        "WINDOW END   | {} | start: ${} | end: ${} | target: ${} | outcome: {}",
        w.asset, w.start_price, end_price, w.target_price, outcome,
    );
}
