//! Shared health state for the /health endpoint.
//! Updated by the scanners and the engine, read by the API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

#[derive(Default)]
pub struct HealthState {
    /// True between `Engine::start` and `Engine::stop`.
    pub running: AtomicBool,
    /// Millisecond timestamp of the last completed market scan (0 = none).
    pub last_market_scan_ms: AtomicU64,
    /// Millisecond timestamp of the last completed window scan, any asset (0 = none).
    pub last_window_scan_ms: AtomicU64,
    pub market_scan_failures: AtomicU64,
    pub window_scan_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, v: bool) {
        self.running.store(v, Ordering::Relaxed);
    }

    pub fn mark_market_scan(&self, at: DateTime<Utc>) {
        self.last_market_scan_ms.store(to_ms(at), Ordering::Relaxed);
    }

    pub fn mark_window_scan(&self, at: DateTime<Utc>) {
        self.last_window_scan_ms.store(to_ms(at), Ordering::Relaxed);
    }

    pub fn inc_market_scan_failures(&self) {
        self.market_scan_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_window_scan_failures(&self) {
        self.window_scan_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn last_market_scan(&self) -> Option<DateTime<Utc>> {
        from_ms(self.last_market_scan_ms.load(Ordering::Relaxed))
    }

    pub fn last_window_scan(&self) -> Option<DateTime<Utc>> {
        from_ms(self.last_window_scan_ms.load(Ordering::Relaxed))
    }

    pub fn market_scan_failures(&self) -> u64 {
        self.market_scan_failures.load(Ordering::Relaxed)
    }

    pub fn window_scan_failures(&self) -> u64 {
        self.window_scan_failures.load(Ordering::Relaxed)
    }
}

fn to_ms(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp_millis()).unwrap_or(0)
}

fn from_ms(ms: u64) -> Option<DateTime<Utc>> {
    if ms == 0 {
        return None;
    }
    DateTime::from_timestamp_millis(i64::try_from(ms).ok()?)
}
