use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::models::{OpportunityRow, WindowSnapshotRow};
use crate::db::{recent_opportunities, resolved_windows};
use crate::engine::{Engine, EngineStats};
use crate::error::AppError;
use crate::types::{Classification, Opportunity, Window};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub engine: Arc<Engine>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/windows", get(get_windows))
        .route("/windows/sniper", get(get_sniper_windows))
        .route("/windows/resolved", get(get_resolved_windows))
        .route("/opportunities", get(get_opportunities))
        .route("/opportunities/history", get(get_opportunity_history))
        .route("/stats", get(get_stats))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SniperQuery {
    pub min_secs: Option<f64>,
    pub max_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpportunitiesQuery {
    pub classification: Option<Classification>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub running: bool,
    pub active_windows: usize,
    pub subscribers: usize,
    pub last_market_scan: Option<DateTime<Utc>>,
    pub last_window_scan: Option<DateTime<Utc>>,
    pub market_scan_failures: u64,
    pub window_scan_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct WindowResponse {
    pub market_id: String,
    pub asset: String,
    pub question: String,
    pub target_price: Decimal,
    pub start_price: Decimal,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub window_minutes: u32,
    pub end_time: DateTime<Utc>,
    pub remaining_secs: f64,
    pub yes_token_id: String,
    pub no_token_id: String,
}

impl WindowResponse {
    fn from_window(w: Window, now: DateTime<Utc>) -> Self {
        Self {
            remaining_secs: w.remaining_secs(now),
            market_id: w.market_id,
            asset: w.asset,
            question: w.question,
            target_price: w.target_price,
            start_price: w.start_price,
            yes_price: w.yes_price,
            no_price: w.no_price,
            window_minutes: w.window_minutes,
            end_time: w.end_time,
            yes_token_id: w.yes_token_id,
            no_token_id: w.no_token_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LatencyResponse {
    pub market_scan: crate::api::latency::LatencySummary,
    pub window_scan: crate::api::latency::LatencySummary,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let engine = &state.engine;
    let health = engine.health();
    let stats = engine.stats();
    Json(HealthResponse {
        status: if stats.running { "ok" } else { "stopped" },
        running: stats.running,
        active_windows: stats.active_windows,
        subscribers: stats.fabric.subscribers,
        last_market_scan: health.last_market_scan(),
        last_window_scan: health.last_window_scan(),
        market_scan_failures: stats.market_scan_failures,
        window_scan_failures: stats.window_scan_failures,
    })
}

async fn get_windows(State(state): State<ApiState>) -> Json<Vec<WindowResponse>> {
    let now = Utc::now();
    let windows = state
        .engine
        .active_windows()
        .into_iter()
        .map(|w| WindowResponse::from_window(w, now))
        .collect();
    Json(windows)
}

async fn get_sniper_windows(
    State(state): State<ApiState>,
    Query(params): Query<SniperQuery>,
) -> Result<Json<Vec<WindowResponse>>, AppError> {
    let cfg = state.engine.config();
    let min_secs = params.min_secs.unwrap_or(cfg.sniper_min_secs);
    let max_secs = params.max_secs.unwrap_or(cfg.sniper_max_secs);
    if !(min_secs.is_finite() && max_secs.is_finite()) || min_secs < 0.0 || min_secs > max_secs {
        return Err(AppError::BadRequest(format!(
            "invalid sniper zone [{min_secs}, {max_secs}]"
        )));
    }

    let now = Utc::now();
    let windows = state
        .engine
        .sniper_ready(min_secs, max_secs)
        .into_iter()
        .map(|w| WindowResponse::from_window(w, now))
        .collect();
    Ok(Json(windows))
}

async fn get_resolved_windows(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<WindowSnapshotRow>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 1000);
    Ok(Json(resolved_windows(&state.pool, limit).await?))
}

async fn get_opportunities(
    State(state): State<ApiState>,
    Query(params): Query<OpportunitiesQuery>,
) -> Json<Vec<Opportunity>> {
    let opportunities = state
        .engine
        .latest_opportunities()
        .into_iter()
        .filter(|o| params.classification.map_or(true, |c| o.classification == c))
        .collect();
    Json(opportunities)
}

async fn get_opportunity_history(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<OpportunityRow>>, AppError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(recent_opportunities(&state.pool, limit).await?))
}

async fn get_stats(State(state): State<ApiState>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let stats = state.engine.stats();
    Json(LatencyResponse {
        market_scan: stats.market_scan,
        window_scan: stats.window_scan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_assets, Config};
    use crate::testkit::{raw_window_market, FakeFeed, FakeSource};
    use rust_decimal_macros::dec;

    async fn state_with_window(secs_left: i64) -> ApiState {
        let end = Utc::now() + chrono::Duration::seconds(secs_left);
        let source = Arc::new(FakeSource::new(vec![raw_window_market(
            "w1",
            "Will SOL be above $200 in 15 minutes?",
            end,
            "0.6",
            "0.4",
        )]));
        let feed = Arc::new(FakeFeed::with_price("SOLUSDT", dec!(199.5)));
        let config = Config {
            window_assets: parse_assets("SOL"),
            max_rps: 0,
            ..Config::default()
        };
        let engine = Arc::new(Engine::new(config.clone(), source.clone(), feed.clone()));

        // Drive one window cycle directly instead of starting the scheduler.
        let scanner = crate::scanner::WindowScanner::new(
            config.window_assets[0].clone(),
            source,
            feed,
            engine.registry(),
            Arc::new(crate::broadcast::Broadcaster::new(4)),
            Arc::new(crate::api::health::HealthState::new()),
            Arc::new(crate::api::latency::LatencyStats::new()),
            crate::fetcher::PageLimits { page_size: 100, max_items: 0, max_rps: 0 },
            config.window_scan_interval,
        );
        scanner.scan_once().await.unwrap();

        ApiState {
            pool: crate::db::connect_memory().await.unwrap(),
            engine,
        }
    }

    #[tokio::test]
    async fn sniper_route_uses_query_bounds() {
        let state = state_with_window(40).await;

        let Json(hit) = get_sniper_windows(
            State(state.clone()),
            Query(SniperQuery { min_secs: Some(15.0), max_secs: Some(60.0) }),
        )
        .await
        .unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].target_price, dec!(200));
        assert_eq!(hit[0].start_price, dec!(199.5));

        let Json(miss) = get_sniper_windows(
            State(state.clone()),
            Query(SniperQuery { min_secs: Some(0.0), max_secs: Some(10.0) }),
        )
        .await
        .unwrap();
        assert!(miss.is_empty());

        let Json(all) = get_windows(State(state)).await;
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn inverted_sniper_bounds_are_a_bad_request() {
        let state = state_with_window(40).await;
        let res = get_sniper_windows(
            State(state),
            Query(SniperQuery { min_secs: Some(60.0), max_secs: Some(15.0) }),
        )
        .await;
        assert!(matches!(res, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn health_reports_stopped_engine() {
        let state = state_with_window(600).await;
        let Json(h) = get_health(State(state)).await;
        assert_eq!(h.status, "stopped");
        assert_eq!(h.active_windows, 1);
    }
}
