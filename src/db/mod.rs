pub mod models;
pub mod writer;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::Result;
use models::{OpportunityRow, WindowSnapshotRow};

pub use writer::DbWriter;

/// Open (creating if needed) the database at `db_path` and run migrations.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(opts).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database; every pooled connection would
/// otherwise see its own empty schema.
pub async fn connect_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn recent_opportunities(pool: &SqlitePool, limit: i64) -> Result<Vec<OpportunityRow>> {
    let rows = sqlx::query_as::<_, OpportunityRow>(
        r#"
        SELECT id, market_id, question, classification,
               yes_price, no_price, total_price, spread_pct, detected_at
        FROM opportunities
        ORDER BY detected_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn resolved_windows(pool: &SqlitePool, limit: i64) -> Result<Vec<WindowSnapshotRow>> {
    let rows = sqlx::query_as::<_, WindowSnapshotRow>(
        r#"
        SELECT market_id, asset, question, target_price, start_price,
               window_minutes, end_time, detected_at, end_price, outcome, resolved_at
        FROM window_snapshots
        WHERE resolved_at IS NOT NULL
        ORDER BY resolved_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
