//! Question-text heuristics for "will ASSET be above $X in N minutes" markets.
//!
//! Everything here is pure and never fails the poll cycle: a question either
//! parses into a [`WindowQuestion`] or yields the reason it did not.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::config::{AssetProfile, DEFAULT_WINDOW_MINUTES};

const DIRECTIONAL_TOKENS: &[&str] = &["above", "below", "up", "down", "higher", "lower"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowQuestion {
    pub target_price: Decimal,
    pub window_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionMismatch {
    NoAsset,
    NoDirection,
    NoTargetPrice,
}

impl std::fmt::Display for QuestionMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuestionMismatch::NoAsset => "no_asset",
            QuestionMismatch::NoDirection => "no_direction",
            QuestionMismatch::NoTargetPrice => "no_target_price",
        };
        write!(f, "{s}")
    }
}

/// Lower-cased alphanumeric runs. `"BTC above $105,000?"` → `btc above 105 000`.
fn tokens(question: &str) -> Vec<String> {
    question
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

/// Whole-token match so `sol` does not hit "solution" and `eth` does not hit "whether".
pub fn matches_asset(question: &str, asset: &AssetProfile) -> bool {
    tokens(question)
        .iter()
        .any(|t| asset.name_tokens.iter().any(|name| name == t))
}

pub fn is_directional(question: &str) -> bool {
    tokens(question)
        .iter()
        .any(|t| DIRECTIONAL_TOKENS.contains(&t.as_str()))
}

/// Price after the first `$`: commas skipped, one decimal point kept, stops at
/// the first other character. `"BTC above $105,000 in 15 minutes"` → 105000.
pub fn extract_target_price(question: &str) -> Option<Decimal> {
    let (_, after) = question.split_once('$')?;

    let mut digits = String::new();
    let mut seen_dot = false;
    for c in after.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ',' => continue,
            '.' if !seen_dot => {
                seen_dot = true;
                digits.push(c);
            }
            _ => break,
        }
    }
    // "$105,000." at the end of a sentence
    let digits = digits.trim_end_matches('.');

    let price = Decimal::from_str(digits).ok()?;
    (price > Decimal::ZERO).then_some(price)
}

/// `15 minutes` → 15, `1 hour` → 60. Defaults to 15 when no timeframe is named.
pub fn parse_window_minutes(question: &str) -> u32 {
    let toks = tokens(question);
    for pair in toks.windows(2) {
        let Ok(n) = pair[0].parse::<u32>() else { continue };
        let unit = pair[1].as_str();
        if unit.starts_with("min") {
            return n;
        }
        if unit.starts_with("hour") || unit == "hr" || unit == "hrs" {
            return n.saturating_mul(60);
        }
    }
    DEFAULT_WINDOW_MINUTES
}

pub fn parse_window_question(
    question: &str,
    asset: &AssetProfile,
) -> Result<WindowQuestion, QuestionMismatch> {
    if !matches_asset(question, asset) {
        return Err(QuestionMismatch::NoAsset);
    }
    if !is_directional(question) {
        return Err(QuestionMismatch::NoDirection);
    }
    let target_price = extract_target_price(question).ok_or(QuestionMismatch::NoTargetPrice)?;
    Ok(WindowQuestion {
        target_price,
        window_minutes: parse_window_minutes(question),
    })
}
