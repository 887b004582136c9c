use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Per-market alert suppression. Single owner; not shared across tasks.
pub struct CooldownLedger {
    cooldown: chrono::Duration,
    last_alert: HashMap<String, DateTime<Utc>>,
}

impl CooldownLedger {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX),
            last_alert: HashMap::new(),
        }
    }

    /// True, and `now` recorded, when the market has never alerted or its last
    /// alert is strictly more than the cooldown ago. Otherwise false and the
    /// ledger is untouched.
    pub fn should_alert(&mut self, market_id: &str, now: DateTime<Utc>) -> bool {
        if let Some(&last) = self.last_alert.get(market_id) {
            if now.signed_duration_since(last) <= self.cooldown {
                return false;
            }
        }
        self.last_alert.insert(market_id.to_string(), now);
        true
    }

    /// Forget markets whose cooldown has lapsed. Returns how many were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.last_alert.len();
        let cooldown = self.cooldown;
        self.last_alert
            .retain(|_, last| now.signed_duration_since(*last) <= cooldown);
        before - self.last_alert.len()
    }

    pub fn len(&self) -> usize {
        self.last_alert.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn suppresses_within_cooldown() {
        let mut ledger = CooldownLedger::new(Duration::from_secs(300));
        assert!(ledger.should_alert("m1", t(0)));
        assert!(!ledger.should_alert("m1", t(1)));
        assert!(ledger.should_alert("m1", t(301)));
    }

    #[test]
    fn exactly_at_cooldown_is_still_suppressed() {
        let mut ledger = CooldownLedger::new(Duration::from_secs(300));
        assert!(ledger.should_alert("m1", t(0)));
        assert!(!ledger.should_alert("m1", t(300)));
    }

    #[test]
    fn suppressed_call_does_not_extend_the_cooldown() {
        let mut ledger = CooldownLedger::new(Duration::from_secs(300));
        assert!(ledger.should_alert("m1", t(0)));
        assert!(!ledger.should_alert("m1", t(200)));
        assert!(ledger.should_alert("m1", t(301)));
    }

    #[test]
    fn markets_are_independent() {
        let mut ledger = CooldownLedger::new(Duration::from_secs(300));
        assert!(ledger.should_alert("m1", t(0)));
        assert!(ledger.should_alert("m2", t(1)));
        assert!(!ledger.should_alert("m2", t(2)));
    }

    #[test]
    fn prune_drops_lapsed_entries() {
        let mut ledger = CooldownLedger::new(Duration::from_secs(300));
        ledger.should_alert("old", t(0));
        ledger.should_alert("new", t(200));
        assert_eq!(ledger.prune(t(400)), 1);
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.should_alert("new", t(400)));
        assert!(ledger.should_alert("old", t(400)));
    }
}
