//! Row types for the tables in migrations/0001_init.sql.
//! Decimal columns come back as the TEXT they were written as.

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct OpportunityRow {
    pub id: i64,
    pub market_id: String,
    pub question: String,
    pub classification: String,
    pub yes_price: String,
    pub no_price: String,
    pub total_price: String,
    pub spread_pct: String,
    pub detected_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct WindowSnapshotRow {
    pub market_id: String,
    pub asset: String,
    pub question: String,
    pub target_price: String,
    pub start_price: String,
    pub window_minutes: i64,
    pub end_time: i64,
    pub detected_at: i64,
    pub end_price: Option<String>,
    /// "YES" / "NO"; NULL until resolved, and when the end price was unavailable.
    pub outcome: Option<String>,
    pub resolved_at: Option<i64>,
}
