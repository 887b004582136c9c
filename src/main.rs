mod alerts;
mod api;
mod broadcast;
mod config;
mod db;
mod detector;
mod engine;
mod error;
mod fetcher;
mod outcome_prices;
mod price_feed;
mod question;
mod scanner;
mod state;
mod types;

#[cfg(test)]
mod testkit;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::alerts::AlertConsumer;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::DbWriter;
use crate::engine::Engine;
use crate::error::Result;
use crate::fetcher::GammaClient;
use crate::outcome_prices::ClobClient;
use crate::price_feed::BinancePriceFeed;

#[tokio::main]
async fn main() {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Collaborators ---
    let source = Arc::new(GammaClient::new(&cfg.gamma_api_url, cfg.http_timeout)?);
    let feed = Arc::new(BinancePriceFeed::new(&cfg.binance_api_url, cfg.price_timeout)?);
    let mut engine = Engine::new(cfg.clone(), source, feed);
    if cfg.live_outcome_prices {
        let book = Arc::new(ClobClient::new(&cfg.clob_api_url, cfg.price_timeout)?);
        engine = engine.with_outcome_prices(book);
        info!("Window prices refreshed from CLOB midpoints at {}", cfg.clob_api_url);
    }
    let engine = Arc::new(engine);

    // --- Subscribers: attached before start so the first cycle reaches them ---
    let alerts = AlertConsumer::new(engine.subscribe(), cfg.alert_cooldown);
    tokio::spawn(async move { alerts.run().await });

    let writer = DbWriter::new(pool.clone(), engine.subscribe());
    tokio::spawn(async move { writer.run().await });

    info!(
        "Scanning up to {} markets every {}s (min spread {}%), windows every {}s, alert cooldown {}s",
        cfg.max_markets,
        cfg.scan_interval.as_secs(),
        cfg.min_spread_pct,
        cfg.window_scan_interval.as_secs(),
        cfg.alert_cooldown.as_secs(),
    );
    engine.start();

    // --- HTTP API server ---
    let app = router(ApiState {
        pool: pool.clone(),
        engine: Arc::clone(&engine),
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.stop().await;
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
