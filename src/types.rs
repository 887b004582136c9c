use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// One market as observed in a single poll cycle. Rebuilt every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub slug: Option<String>,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub volume: Decimal,
    pub active: bool,
    pub closed: bool,
    pub end_time: Option<DateTime<Utc>>,
    pub yes_token_id: Option<String>,
    pub no_token_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Mispricing classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// yes + no < 1.00: buying both outcomes locks in a profit.
    Underpriced,
    /// 1.02 < yes + no <= 1.10
    Overpriced,
    /// yes + no > 1.10
    SevereMispricing,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Classification::Underpriced => "underpriced",
            Classification::Overpriced => "overpriced",
            Classification::SevereMispricing => "severe_mispricing",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub market: Market,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub total_price: Decimal,
    /// |total_price - 1|
    pub spread: Decimal,
    pub spread_pct: Decimal,
    pub classification: Classification,
    pub detected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// A window as parsed from one poll cycle, before the registry decides
/// whether it is new.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedWindow {
    pub market_id: String,
    pub asset: String,
    /// Symbol the price feed knows the asset by.
    pub feed_symbol: String,
    pub question: String,
    pub target_price: Decimal,
    pub window_minutes: u32,
    pub end_time: DateTime<Utc>,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// A tracked "will ASSET be above $X" market.
///
/// `start_price`, `target_price` and `end_time` are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub market_id: String,
    pub asset: String,
    pub feed_symbol: String,
    pub question: String,
    pub target_price: Decimal,
    pub window_minutes: u32,
    pub end_time: DateTime<Utc>,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    /// Asset reference price when the window was first seen.
    pub start_price: Decimal,
    pub detected_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Window {
    pub fn from_observed(observed: ObservedWindow, start_price: Decimal) -> Self {
        Self {
            market_id: observed.market_id,
            asset: observed.asset,
            feed_symbol: observed.feed_symbol,
            question: observed.question,
            target_price: observed.target_price,
            window_minutes: observed.window_minutes,
            end_time: observed.end_time,
            yes_token_id: observed.yes_token_id,
            no_token_id: observed.no_token_id,
            yes_price: observed.yes_price,
            no_price: observed.no_price,
            start_price,
            detected_at: observed.observed_at,
            last_updated: observed.observed_at,
        }
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end_time - now
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> f64 {
        self.time_remaining(now).num_milliseconds() as f64 / 1000.0
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }

    /// Both bounds inclusive.
    pub fn in_sniper_zone(&self, now: DateTime<Utc>, min_secs: f64, max_secs: f64) -> bool {
        let remaining = self.remaining_secs(now);
        remaining >= min_secs && remaining <= max_secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// YES when the asset finished at or above the target.
    pub fn resolve(end_price: Decimal, target_price: Decimal) -> Self {
        if end_price >= target_price {
            Outcome::Yes
        } else {
            Outcome::No
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Yes => write!(f, "YES"),
            Outcome::No => write!(f, "NO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiredWindow {
    pub window: Window,
    /// None when the price feed had no quote for the asset at resolution time.
    pub end_price: Option<Decimal>,
    pub outcome: Option<Outcome>,
    pub resolved_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Broadcast payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowEvent {
    Created(Window),
    Updated(Window),
    Expired(ExpiredWindow),
}

impl WindowEvent {
    pub fn window(&self) -> &Window {
        match self {
            WindowEvent::Created(w) | WindowEvent::Updated(w) => w,
            WindowEvent::Expired(e) => &e.window,
        }
    }
}

/// Everything the engine publishes. Each item carries full current state, not a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    Opportunity(Opportunity),
    Window(WindowEvent),
}

impl Signal {
    pub fn market_id(&self) -> &str {
        match self {
            Signal::Opportunity(o) => &o.market.id,
            Signal::Window(e) => &e.window().market_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn window_ending_at(end_time: DateTime<Utc>) -> Window {
        Window {
            market_id: "m1".to_string(),
            asset: "BTC".to_string(),
            feed_symbol: "BTCUSDT".to_string(),
            question: "Will BTC be above $105,000 in 15 minutes?".to_string(),
            target_price: dec!(105000),
            window_minutes: 15,
            end_time,
            yes_token_id: "yes".to_string(),
            no_token_id: "no".to_string(),
            yes_price: dec!(0.5),
            no_price: dec!(0.5),
            start_price: dec!(104900),
            detected_at: end_time - chrono::Duration::minutes(15),
            last_updated: end_time - chrono::Duration::minutes(15),
        }
    }

    #[test]
    fn outcome_boundary_is_yes() {
        assert_eq!(Outcome::resolve(dec!(105000), dec!(105000)), Outcome::Yes);
        assert_eq!(Outcome::resolve(dec!(105000.01), dec!(105000)), Outcome::Yes);
        assert_eq!(Outcome::resolve(dec!(104999.99), dec!(105000)), Outcome::No);
    }

    #[test]
    fn expiry_is_inclusive_of_end_time() {
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let w = window_ending_at(end);
        assert!(!w.is_expired(end - chrono::Duration::seconds(1)));
        assert!(w.is_expired(end));
    }

    #[test]
    fn sniper_zone_bounds_are_inclusive() {
        let end = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let w = window_ending_at(end);
        assert!(w.in_sniper_zone(end - chrono::Duration::seconds(60), 15.0, 60.0));
        assert!(w.in_sniper_zone(end - chrono::Duration::seconds(15), 15.0, 60.0));
        assert!(!w.in_sniper_zone(end - chrono::Duration::seconds(61), 15.0, 60.0));
        assert!(!w.in_sniper_zone(end - chrono::Duration::seconds(14), 15.0, 60.0));
    }

    #[test]
    fn outcome_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Outcome::Yes).unwrap(), "\"YES\"");
        assert_eq!(Outcome::No.to_string(), "NO");
    }
}
