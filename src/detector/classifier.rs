use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::price_thresholds::{OVERPRICED_MIN_TOTAL, SEVERE_MIN_TOTAL};
use crate::types::{Classification, Market, Opportunity};

/// Price arithmetic for one yes/no pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mispricing {
    pub total_price: Decimal,
    pub spread: Decimal,
    pub spread_pct: Decimal,
    pub classification: Classification,
}

/// Classify a yes/no pair. Returns None when either side is zero, when the
/// spread is under `min_spread_pct`, or when the total sits in the
/// (1.00, 1.02] band that is normal venue margin.
pub fn classify(yes: Decimal, no: Decimal, min_spread_pct: Decimal) -> Option<Mispricing> {
    if yes.is_zero() || no.is_zero() {
        return None;
    }

    let total_price = yes + no;
    let spread = (total_price - Decimal::ONE).abs();
    let spread_pct = spread * Decimal::ONE_HUNDRED;
    if spread_pct < min_spread_pct {
        return None;
    }

    let classification = if total_price > SEVERE_MIN_TOTAL {
        Classification::SevereMispricing
    } else if total_price > OVERPRICED_MIN_TOTAL {
        Classification::Overpriced
    } else if total_price < Decimal::ONE {
        Classification::Underpriced
    } else {
        return None;
    };

    Some(Mispricing {
        total_price,
        spread,
        spread_pct,
        classification,
    })
}

/// Closed markets never produce opportunities. Output keeps input order.
pub fn find_opportunities(
    markets: &[Market],
    min_spread_pct: Decimal,
    now: DateTime<Utc>,
) -> Vec<Opportunity> {
    markets
        .iter()
        .filter(|m| !m.closed)
        .filter_map(|m| {
            let mp = classify(m.yes_price, m.no_price, min_spread_pct)?;
            Some(Opportunity {
                market: m.clone(),
                yes_price: m.yes_price,
                no_price: m.no_price,
                total_price: mp.total_price,
                spread: mp.spread,
                spread_pct: mp.spread_pct,
                classification: mp.classification,
                detected_at: now,
            })
        })
        .collect()
}
