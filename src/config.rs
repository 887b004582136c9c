use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{AppError, Result};

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
pub const BINANCE_API_URL: &str = "https://api.binance.com";
pub const CLOB_API_URL: &str = "https://clob.polymarket.com";

/// Default per-subscriber buffer for the broadcast fabric.
pub const SUBSCRIBER_CAPACITY: usize = 100;

/// Default assets tracked by the window scanners.
pub const DEFAULT_WINDOW_ASSETS: &[&str] = &["BTC", "ETH", "SOL"];

/// Default length assumed for a window whose question names no timeframe.
pub const DEFAULT_WINDOW_MINUTES: u32 = 15;

/// Classification bounds on `yes + no`.
pub mod price_thresholds {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Overpriced only above this total.
    pub const OVERPRICED_MIN_TOTAL: Decimal = dec!(1.02);
    /// Severe mispricing above this total; overrides overpriced.
    pub const SEVERE_MIN_TOTAL: Decimal = dec!(1.10);
}

/// Search terms for one tracked asset. Pure data: adding an asset never needs
/// a new code path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetProfile {
    /// Upper-case ticker used in logs and window records (`BTC`).
    pub symbol: String,
    /// Symbol passed to the price feed (`BTCUSDT`).
    pub feed_symbol: String,
    /// Lower-case whole-word tokens that identify the asset in question text.
    pub name_tokens: Vec<String>,
}

impl AssetProfile {
    pub fn for_symbol(symbol: &str) -> Self {
        let symbol = symbol.trim().to_uppercase();
        let mut name_tokens = vec![symbol.to_lowercase()];
        match symbol.as_str() {
            "BTC" => name_tokens.push("bitcoin".to_string()),
            "ETH" => name_tokens.push("ethereum".to_string()),
            "SOL" => name_tokens.push("solana".to_string()),
            "XRP" => name_tokens.push("ripple".to_string()),
            _ => {}
        }
        Self {
            feed_symbol: format!("{symbol}USDT"),
            symbol,
            name_tokens,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gamma_api_url: String,
    pub binance_api_url: String,
    pub clob_api_url: String,
    /// Refresh window yes/no prices from CLOB midpoints (LIVE_OUTCOME_PRICES)
    pub live_outcome_prices: bool,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// General mispricing scan cadence (SCAN_INTERVAL_SECS)
    pub scan_interval: Duration,
    /// Window scan cadence, per asset (WINDOW_SCAN_INTERVAL_SECS)
    pub window_scan_interval: Duration,
    /// Minimum |yes + no - 1| in percent before a market is classified (MIN_SPREAD_PCT)
    pub min_spread_pct: Decimal,
    /// Minimum time between two alerts for the same market (ALERT_COOLDOWN_SECS)
    pub alert_cooldown: Duration,
    /// Cap on markets fetched per cycle, 0 = unbounded (MAX_MARKETS)
    pub max_markets: usize,
    /// Markets requested per paginated call (PAGE_SIZE)
    pub page_size: usize,
    /// Paginated calls per second, 0 = no throttle (MAX_RPS)
    pub max_rps: u32,
    /// Assets tracked by window scanners (WINDOW_ASSETS, comma-separated).
    pub window_assets: Vec<AssetProfile>,
    /// Default sniper zone bounds for the API (SNIPER_MIN_SECS / SNIPER_MAX_SECS)
    pub sniper_min_secs: f64,
    pub sniper_max_secs: f64,
    pub subscriber_capacity: usize,
    pub http_timeout: Duration,
    pub price_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            gamma_api_url: env_string("GAMMA_API_URL", GAMMA_API_URL),
            binance_api_url: env_string("BINANCE_API_URL", BINANCE_API_URL),
            clob_api_url: env_string("CLOB_API_URL", CLOB_API_URL),
            live_outcome_prices: env_parse("LIVE_OUTCOME_PRICES", true)?,
            log_level: env_string("LOG_LEVEL", "info"),
            db_path: env_string("DB_PATH", "signals.db"),
            api_port: env_parse("API_PORT", 3000)?,
            scan_interval: Duration::from_secs(env_parse("SCAN_INTERVAL_SECS", 30)?),
            window_scan_interval: Duration::from_secs(env_parse("WINDOW_SCAN_INTERVAL_SECS", 10)?),
            min_spread_pct: env_parse("MIN_SPREAD_PCT", dec!(1.0))?,
            alert_cooldown: Duration::from_secs(env_parse("ALERT_COOLDOWN_SECS", 300)?),
            max_markets: env_parse("MAX_MARKETS", 200)?,
            page_size: env_parse("PAGE_SIZE", 100)?,
            max_rps: env_parse("MAX_RPS", 5)?,
            window_assets: parse_assets(&std::env::var("WINDOW_ASSETS").unwrap_or_else(|_| {
                DEFAULT_WINDOW_ASSETS.join(",")
            })),
            sniper_min_secs: env_parse("SNIPER_MIN_SECS", 15.0)?,
            sniper_max_secs: env_parse("SNIPER_MAX_SECS", 60.0)?,
            subscriber_capacity: env_parse("SUBSCRIBER_CAPACITY", SUBSCRIBER_CAPACITY)?,
            http_timeout: Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30)?),
            price_timeout: Duration::from_secs(env_parse("PRICE_TIMEOUT_SECS", 2)?),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects settings the scanners cannot run with. Called before anything is spawned.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("GAMMA_API_URL", &self.gamma_api_url),
            ("BINANCE_API_URL", &self.binance_api_url),
            ("CLOB_API_URL", &self.clob_api_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(AppError::Config(format!("{name} is not a valid URL: {url:?}")));
            }
        }
        if self.scan_interval.is_zero() || self.window_scan_interval.is_zero() {
            return Err(AppError::Config("scan intervals must be at least 1 second".to_string()));
        }
        if self.page_size == 0 {
            return Err(AppError::Config("PAGE_SIZE must be positive".to_string()));
        }
        if self.subscriber_capacity == 0 {
            return Err(AppError::Config("SUBSCRIBER_CAPACITY must be positive".to_string()));
        }
        if self.min_spread_pct.is_sign_negative() {
            return Err(AppError::Config("MIN_SPREAD_PCT must not be negative".to_string()));
        }
        if !self.sniper_min_secs.is_finite() || !self.sniper_max_secs.is_finite() {
            return Err(AppError::Config("sniper zone bounds must be finite".to_string()));
        }
        if self.sniper_min_secs < 0.0 || self.sniper_min_secs > self.sniper_max_secs {
            return Err(AppError::Config(format!(
                "sniper zone [{}, {}] is empty",
                self.sniper_min_secs, self.sniper_max_secs
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gamma_api_url: GAMMA_API_URL.to_string(),
            binance_api_url: BINANCE_API_URL.to_string(),
            clob_api_url: CLOB_API_URL.to_string(),
            live_outcome_prices: true,
            log_level: "info".to_string(),
            db_path: "signals.db".to_string(),
            api_port: 3000,
            scan_interval: Duration::from_secs(30),
            window_scan_interval: Duration::from_secs(10),
            min_spread_pct: dec!(1.0),
            alert_cooldown: Duration::from_secs(300),
            max_markets: 200,
            page_size: 100,
            max_rps: 5,
            window_assets: parse_assets(&DEFAULT_WINDOW_ASSETS.join(",")),
            sniper_min_secs: 15.0,
            sniper_max_secs: 60.0,
            subscriber_capacity: SUBSCRIBER_CAPACITY,
            http_timeout: Duration::from_secs(30),
            price_timeout: Duration::from_secs(2),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw:?}"))),
        _ => Ok(default),
    }
}

/// `"btc, eth,,SOL"` → BTC, ETH, SOL profiles; duplicates collapse.
pub fn parse_assets(raw: &str) -> Vec<AssetProfile> {
    let mut out: Vec<AssetProfile> = Vec::new();
    for symbol in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let profile = AssetProfile::for_symbol(symbol);
        if !out.iter().any(|p| p.symbol == profile.symbol) {
            out.push(profile);
        }
    }
    out
}
