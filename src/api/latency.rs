//! In-memory latency histogram for scan cycle instrumentation.
//! Records wall time from the start of a fetch to the last publish.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Shared latency stats. Scanners record, API reads.
/// Values stored in microseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
    pub max_us: Option<u64>,
}

impl LatencyStats {
    /// Tracks 1us to 1h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record_us(&self, us: u64) {
        // Values past the upper bound are clamped rather than lost.
        let _ = self.inner.lock().saturating_record(us.max(1));
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        self.record_us(us);
    }

    pub fn summary(&self) -> LatencySummary {
        let h = self.inner.lock();
        if h.len() == 0 {
            return LatencySummary {
                samples: 0,
                p50_us: None,
                p95_us: None,
                p99_us: None,
                max_us: None,
            };
        }
        LatencySummary {
            samples: h.len(),
            p50_us: Some(h.value_at_quantile(0.5)),
            p95_us: Some(h.value_at_quantile(0.95)),
            p99_us: Some(h.value_at_quantile(0.99)),
            max_us: Some(h.max()),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}
