use std::collections::{hash_map::Entry, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::price_feed::PriceFeed;
use crate::types::{ExpiredWindow, ObservedWindow, Outcome, Window};

/// How long a resolved window's id keeps rejecting observations after its
/// end time. Covers listings fetched before the end that land after a sweep.
const TOMBSTONE_TTL_SECS: i64 = 600;

/// What `upsert` did with an observation.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertResult {
    /// First sighting; start price snapshotted from the feed.
    Created(Window),
    /// Known window; only yes/no prices and `last_updated` moved.
    Updated(Window),
    /// New window but the feed had no quote. Retried on a later cycle.
    Deferred,
    /// Observation ends at or before its own timestamp, or the window was
    /// already resolved; ignored.
    Stale,
}

#[derive(Default)]
struct Slots {
    windows: HashMap<String, Window>,
    /// Resolved market ids and their end times.
    resolved: HashMap<String, DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// WindowRegistry
// ---------------------------------------------------------------------------

/// Windows keyed by market id. Shared by every window scanner.
///
/// The lock is never held across a price lookup: creation looks the price up
/// first and re-checks the map on insert, and expiry removes under the lock
/// and resolves afterwards. Removed ids are remembered until `end_time` plus
/// [`TOMBSTONE_TTL_SECS`] so a late observation cannot recreate them.
#[derive(Default)]
pub struct WindowRegistry {
    slots: RwLock<Slots>,
}

impl WindowRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn upsert(&self, observed: ObservedWindow, feed: &dyn PriceFeed) -> UpsertResult {
        if observed.end_time <= observed.observed_at {
            return UpsertResult::Stale;
        }
        {
            let mut slots = self.slots.write();
            if slots.resolved.contains_key(&observed.market_id) {
                return UpsertResult::Stale;
            }
            if let Some(w) = slots.windows.get_mut(&observed.market_id) {
                apply_prices(w, &observed);
                return UpsertResult::Updated(w.clone());
            }
        }

        let Some(start_price) = feed.current_price(&observed.feed_symbol).await else {
            return UpsertResult::Deferred;
        };

        let mut slots = self.slots.write();
        // Swept by another scanner while we were waiting on the feed.
        if slots.resolved.contains_key(&observed.market_id) {
            return UpsertResult::Stale;
        }
        match slots.windows.entry(observed.market_id.clone()) {
            // Another scanner created it while we were waiting on the feed.
            Entry::Occupied(mut e) => {
                apply_prices(e.get_mut(), &observed);
                UpsertResult::Updated(e.get().clone())
            }
            Entry::Vacant(e) => {
                let w = Window::from_observed(observed, start_price);
                e.insert(w.clone());
                UpsertResult::Created(w)
            }
        }
    }

    /// Remove every window with `end_time <= now` and resolve it against one
    /// price lookup per asset. Each window is returned exactly once.
    pub async fn sweep_expired(&self, now: DateTime<Utc>, feed: &dyn PriceFeed) -> Vec<ExpiredWindow> {
        let mut expired: Vec<Window> = {
            let mut slots = self.slots.write();
            let ttl = chrono::Duration::seconds(TOMBSTONE_TTL_SECS);
            slots.resolved.retain(|_, end| *end + ttl > now);
            let ids: Vec<String> = slots
                .windows
                .values()
                .filter(|w| w.is_expired(now))
                .map(|w| w.market_id.clone())
                .collect();
            let mut removed = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(w) = slots.windows.remove(&id) {
                    slots.resolved.insert(id, w.end_time);
                    removed.push(w);
                }
            }
            removed
        };
        if expired.is_empty() {
            return Vec::new();
        }
        expired.sort_by(|a, b| a.end_time.cmp(&b.end_time).then_with(|| a.market_id.cmp(&b.market_id)));

        let symbols: BTreeSet<&str> = expired.iter().map(|w| w.feed_symbol.as_str()).collect();
        let prices: HashMap<&str, Option<Decimal>> = join_all(
            symbols
                .into_iter()
                .map(|s| async move { (s, feed.current_price(s).await) }),
        )
        .await
        .into_iter()
        .collect();

        expired
            .iter()
            .map(|w| {
                let end_price = prices.get(w.feed_symbol.as_str()).copied().flatten();
                ExpiredWindow {
                    window: w.clone(),
                    end_price,
                    outcome: end_price.map(|p| Outcome::resolve(p, w.target_price)),
                    resolved_at: now,
                }
            })
            .collect()
    }

    /// Unexpired windows, soonest end first.
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Window> {
        let mut out: Vec<Window> = self
            .slots
            .read()
            .windows
            .values()
            .filter(|w| !w.is_expired(now))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.end_time.cmp(&b.end_time).then_with(|| a.market_id.cmp(&b.market_id)));
        out
    }

    pub fn active(&self) -> Vec<Window> {
        self.active_at(Utc::now())
    }

    /// Active windows with `min_secs <= remaining <= max_secs`.
    pub fn sniper_ready_at(&self, now: DateTime<Utc>, min_secs: f64, max_secs: f64) -> Vec<Window> {
        self.active_at(now)
            .into_iter()
            .filter(|w| w.in_sniper_zone(now, min_secs, max_secs))
            .collect()
    }

    pub fn sniper_ready(&self, min_secs: f64, max_secs: f64) -> Vec<Window> {
        self.sniper_ready_at(Utc::now(), min_secs, max_secs)
    }

    #[cfg(test)]
    pub fn get(&self, market_id: &str) -> Option<Window> {
        self.slots.read().windows.get(market_id).cloned()
    }

    /// Tracked windows, expired-but-unswept included.
    pub fn len(&self) -> usize {
        self.slots.read().windows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.slots.read().windows.is_empty()
    }
}

fn apply_prices(w: &mut Window, observed: &ObservedWindow) {
    w.yes_price = observed.yes_price;
    w.no_price = observed.no_price;
    w.last_updated = w.last_updated.max(observed.observed_at);
}
