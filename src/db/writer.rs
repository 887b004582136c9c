use tokio::sync::mpsc;
use tracing::error;

use crate::error::Result;
use crate::types::{ExpiredWindow, Opportunity, Signal, Window, WindowEvent};

/// Fabric subscriber that persists opportunities and window lifecycles to SQLite.
/// Runs as a dedicated background task; a slow disk costs it dropped signals,
/// never a stalled scanner.
pub struct DbWriter {
    pool: sqlx::SqlitePool,
    rx: mpsc::Receiver<Signal>,
}

impl DbWriter {
    pub fn new(pool: sqlx::SqlitePool, rx: mpsc::Receiver<Signal>) -> Self {
        Self { pool, rx }
    }

    pub async fn run(mut self) {
        while let Some(signal) = self.rx.recv().await {
            if let Err(e) = self.write(&signal).await {
                error!(market_id = %signal.market_id(), "DB write error: {e}");
            }
        }
    }

    async fn write(&self, signal: &Signal) -> Result<()> {
        match signal {
            Signal::Opportunity(o) => self.write_opportunity(o).await,
            Signal::Window(WindowEvent::Created(w)) => self.write_window(w).await,
            // Snapshots record detection state; price moves are not persisted.
            Signal::Window(WindowEvent::Updated(_)) => Ok(()),
            Signal::Window(WindowEvent::Expired(e)) => self.write_resolution(e).await,
        }
    }

    async fn write_opportunity(&self, o: &Opportunity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO opportunities (
                market_id, question, classification,
                yes_price, no_price, total_price, spread_pct, detected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&o.market.id)
        .bind(&o.market.question)
        .bind(o.classification.to_string())
        .bind(o.yes_price.to_string())
        .bind(o.no_price.to_string())
        .bind(o.total_price.to_string())
        .bind(o.spread_pct.to_string())
        .bind(o.detected_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn write_window(&self, w: &Window) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO window_snapshots (
                market_id, asset, question, target_price, start_price,
                window_minutes, end_time, detected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&w.market_id)
        .bind(&w.asset)
        .bind(&w.question)
        .bind(w.target_price.to_string())
        .bind(w.start_price.to_string())
        .bind(i64::from(w.window_minutes))
        .bind(w.end_time.timestamp_millis())
        .bind(w.detected_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts so a resolution still lands if the creation signal was dropped.
    async fn write_resolution(&self, e: &ExpiredWindow) -> Result<()> {
        self.write_window(&e.window).await?;
        sqlx::query(
            r#"
            UPDATE window_snapshots
            SET end_price = ?, outcome = ?, resolved_at = ?
            WHERE market_id = ?
            "#,
        )
        .bind(e.end_price.map(|p| p.to_string()))
        .bind(e.outcome.map(|o| o.to_string()))
        .bind(e.resolved_at.timestamp_millis())
        .bind(&e.window.market_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
