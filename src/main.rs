//! TRIARB: triangular arbitrage engine.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores execution history, and runs the feed loop: fetch a ticker
//! snapshot every interval, hand it to the engine, repeat until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use triarb::config::AppConfig;
use triarb::dashboard::{self, routes::DashboardState};
use triarb::engine::controller::ExecutionController;
use triarb::engine::executor::{ExecutionSettings, Executor};
use triarb::engine::Engine;
use triarb::exchange::binance::BinanceClient;
use triarb::storage::HistoryStore;

const BANNER: &str = r#"
 _____ ____  ___    _    ____  ____
|_   _|  _ \|_ _|  / \  |  _ \| __ )
  | | | |_) || |  / _ \ | |_) |  _ \
  | | |  _ < | | / ___ \|  _ <| |_) |
  |_| |_| \_\___/_/   \_\_| \_\____/

  Triangular arbitrage engine v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        base = %cfg.arbitrage.base(),
        paths = ?cfg.arbitrage.paths(),
        simulation_only = cfg.trading.simulation_only,
        capital = cfg.trading.capital,
        min_profit_pct = cfg.trading.min_profit_pct,
        "TRIARB starting up"
    );

    // -- Exchange --------------------------------------------------------

    let client = Arc::new(
        BinanceClient::from_config(&cfg.exchange, !cfg.trading.simulation_only)
            .context("Failed to initialise exchange client")?,
    );

    // -- Controller and history ------------------------------------------

    let settings = ExecutionSettings::from_trading(&cfg.trading)?;
    let executor = Executor::new(client.clone(), settings);
    let mut controller = ExecutionController::new(executor, &cfg.trading);

    if cfg.storage.log_history {
        let store = HistoryStore::new(&cfg.storage.history_path);
        let records = store.load()?;
        controller = controller.with_history(records).with_store(store);
    }
    let controller = Arc::new(controller);

    let engine = Arc::new(Engine::new(&cfg, controller.clone()));

    // -- Dashboard -------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(engine.clone()));
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let feed_interval = Duration::from_millis(cfg.exchange.feed_interval_ms);
    let mut interval = tokio::time::interval(feed_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_ms = cfg.exchange.feed_interval_ms,
        exchange = client.base_url(),
        "Entering feed loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let raw = match client.fetch_ticker_snapshot().await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, "Ticker fetch failed, skipping tick");
                        continue;
                    }
                };

                if engine.on_snapshot(&raw).await.is_none() {
                    warn!("Ticker snapshot unusable, skipping tick");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    if controller.is_in_flight() {
        error!("Shutting down with an execution in flight; check the exchange for open orders");
    }

    let history = controller.history().await;
    info!(
        ticks = engine.ticks_processed(),
        executions = controller.executions_started(),
        recorded = history.len(),
        settled = history.iter().filter(|r| r.success).count(),
        "TRIARB shut down cleanly."
    );

    Ok(())
}

/// Initialise tracing with env filter and optional JSON output.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("triarb=info"));

    let json_logging = std::env::var("TRIARB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
