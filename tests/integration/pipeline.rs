//! End-to-end pipeline tests.
//!
//! Feeds ticker snapshots through `Engine::on_snapshot` with a scripted
//! exchange behind the executor and checks what gets executed, what the
//! exchange saw, and what lands in the history.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use triarb::config::AppConfig;
use triarb::engine::controller::ExecutionController;
use triarb::engine::executor::{ExecutionSettings, Executor, Sleeper};
use triarb::engine::Engine;
use triarb::exchange::{ExchangeError, QuoteValidity};
use triarb::storage::HistoryStore;
use triarb::types::OutcomeKind;

use crate::mock_exchange::{Call, ScriptedExchange};

struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

fn config(simulation_only: bool, verify: bool) -> AppConfig {
    AppConfig::from_toml(&format!(
        r#"
        [exchange]
        base_url = "http://localhost"
        api_key_env = "TRIARB_TEST_KEY"
        api_secret_env = "TRIARB_TEST_SECRET"

        [arbitrage]
        base_currency = "USDT"
        path_currencies = ["BTC", "BNB"]

        [trading]
        simulation_only = {simulation_only}
        verify_before_execute = {verify}
        min_profit_pct = 1.0
        min_quote_volume = 5000.0
        capital = 50.0
        cooldown_secs = 15
        "#
    ))
    .unwrap()
}

fn engine_with(cfg: &AppConfig, exchange: Arc<ScriptedExchange>) -> Engine {
    let executor = Executor::with_sleeper(
        exchange,
        ExecutionSettings::from_trading(&cfg.trading).unwrap(),
        Arc::new(NoSleep),
    );
    let controller = Arc::new(ExecutionController::new(executor, &cfg.trading));
    Engine::new(cfg, controller)
}

/// Exchange converting along USDT → BTC → ETH → USDT.
fn exchange(eth_usdt: Decimal) -> ScriptedExchange {
    ScriptedExchange::new()
        .with_rate("USDT", "BTC", dec!(0.02))
        .with_rate("BTC", "ETH", dec!(15))
        .with_rate("ETH", "USDT", eth_usdt)
}

fn rest_ticker(symbol: &str, bid: f64, ask: f64, last: f64, quote_volume: f64) -> Value {
    json!({
        "symbol": symbol,
        "bidPrice": bid.to_string(),
        "bidQty": "10",
        "askPrice": ask.to_string(),
        "askQty": "10",
        "lastPrice": last.to_string(),
        "volume": "1000",
        "quoteVolume": quote_volume.to_string(),
        "count": 1000,
        "closeTime": 1_700_000_000_000i64
    })
}

/// A market where USDT → BTC → ETH → USDT trades at `leg_c_ask`, plus
/// noise: a BNB path with a thin leg and an unrelated pair.
fn market(leg_c_ask: f64) -> Value {
    json!([
        rest_ticker("BTCUSDT", 0.019, 0.02, 0.02, 1_000_000.0),
        rest_ticker("BTCETH", 1.0 / 15.0, 0.07, 0.068, 1_000_000_000.0),
        rest_ticker("USDTETH", 3.1, leg_c_ask, 3.3, 1_000_000.0),
        rest_ticker("BNBUSDT", 300.0, 301.0, 300.5, 2_000_000.0),
        rest_ticker("BNBETH", 0.09, 0.091, 0.0905, 10.0),
        rest_ticker("DOGEEUR", 0.1, 0.11, 0.105, 1_000_000.0)
    ])
}

#[tokio::test]
async fn test_profitable_tick_settles_all_three_legs() {
    let cfg = config(false, true);
    let ex = Arc::new(exchange(dec!(3.4)));
    let engine = engine_with(&cfg, ex.clone());

    let summary = engine.on_snapshot(&market(3.4)).await.unwrap();
    assert_eq!(summary.picked.as_deref(), Some("USDT → BTC → ETH → USDT"));
    let record = summary.execution.unwrap().await.unwrap();

    assert_eq!(record.outcome, OutcomeKind::Settled);
    assert!(record.success);
    // 50 → 1 → 0.999 × 15 = 14.985 → 14.970015 × 3.4 = 50.898051
    assert_eq!(record.realized_profit, Some(dec!(0.898051)));
    assert_eq!(record.realized_profit_pct, Some(dec!(1.796102)));
    assert!(record.simulated_profit_pct.is_some());

    let quotes = ex.quote_calls();
    assert_eq!(quotes.len(), 6);
    let sim = quotes
        .iter()
        .filter(|c| matches!(c, Call::Quote { valid_time: QuoteValidity::ThirtySeconds, .. }))
        .count();
    assert_eq!(sim, 3);
    assert_eq!(
        quotes[4],
        Call::Quote {
            from: "BTC".into(),
            to: "ETH".into(),
            amount: dec!(0.999),
            valid_time: QuoteValidity::TenSeconds,
        }
    );
    assert_eq!(ex.count(|c| matches!(c, Call::Accept(_))), 3);
    assert_eq!(ex.count(|c| matches!(c, Call::Status(_))), 3);
}

#[tokio::test]
async fn test_failed_on_second_poll_stops_after_first_leg() {
    let cfg = config(false, false);
    let ex = Arc::new(
        exchange(dec!(3.4))
            .with_pending_polls(1)
            .with_failing_pair("USDT", "BTC"),
    );
    let engine = engine_with(&cfg, ex.clone());

    let summary = engine.on_snapshot(&market(3.4)).await.unwrap();
    let record = summary.execution.unwrap().await.unwrap();

    assert_eq!(record.outcome, OutcomeKind::Failed);
    assert!(!record.success);
    assert!(record.error.as_deref().unwrap().contains("FAILED on poll 2"));

    assert_eq!(ex.count(|c| matches!(c, Call::Status(_))), 2);
    assert_eq!(ex.quote_calls().len(), 1);
    let history = engine.controller().history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
}

#[tokio::test]
async fn test_simulated_loss_rejected_without_accepting() {
    let cfg = config(false, true);
    // The book says +2%, the convert desk says otherwise.
    let ex = Arc::new(exchange(dec!(3.3266)));
    let engine = engine_with(&cfg, ex.clone());

    let summary = engine.on_snapshot(&market(3.4)).await.unwrap();
    let record = summary.execution.unwrap().await.unwrap();

    assert_eq!(record.outcome, OutcomeKind::ProfitRejected);
    assert!(!record.success);
    assert!(record.simulated_profit_pct.unwrap() < dec!(0.3));
    assert_eq!(ex.calls().len(), 3);
    assert_eq!(ex.count(|c| matches!(c, Call::Accept(_))), 0);
}

#[tokio::test]
async fn test_losing_cycle_displayed_but_not_executed() {
    let cfg = config(false, true);
    let ex = Arc::new(exchange(dec!(3.2)));
    let engine = engine_with(&cfg, ex.clone());

    let summary = engine.on_snapshot(&market(3.2)).await.unwrap();
    assert!(summary.displayed >= 1);
    assert!(summary.picked.is_none());
    assert!(ex.calls().is_empty());

    let latest = engine.latest().await;
    let row = latest
        .rows
        .iter()
        .find(|r| r.route == "USDT → BTC → ETH → USDT")
        .unwrap();
    assert!((row.gross_pct + 4.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_thin_leg_filtered_from_display() {
    let cfg = config(true, true);
    let engine = engine_with(&cfg, Arc::new(exchange(dec!(3.4))));

    engine.on_snapshot(&market(3.4)).await.unwrap();
    let latest = engine.latest().await;
    assert!(latest.cycles_found > latest.candidates.len());
    assert!(latest.rows.iter().all(|r| !r.route.contains("BNB")));
}

#[tokio::test]
async fn test_simulation_only_makes_no_exchange_calls() {
    let cfg = config(true, true);
    let ex = Arc::new(exchange(dec!(3.4)));
    let engine = engine_with(&cfg, ex.clone());

    for _ in 0..5 {
        let summary = engine.on_snapshot(&market(3.4)).await.unwrap();
        assert!(!summary.execution_started());
    }
    assert_eq!(engine.ticks_processed(), 5);
    assert!(ex.calls().is_empty());
    assert!(engine.controller().history().await.is_empty());
}

#[tokio::test]
async fn test_transport_error_recorded_as_failure() {
    let cfg = config(false, true);
    let ex = Arc::new(exchange(dec!(3.4)));
    ex.set_error(ExchangeError::Transport("connection reset by peer".into()));
    let engine = engine_with(&cfg, ex.clone());

    let summary = engine.on_snapshot(&market(3.4)).await.unwrap();
    let record = summary.execution.unwrap().await.unwrap();
    assert_eq!(record.outcome, OutcomeKind::Failed);
    assert!(record.error.unwrap().contains("connection reset"));
    assert_eq!(ex.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_spaces_executions() {
    let cfg = config(false, false);
    let ex = Arc::new(exchange(dec!(3.4)));
    let engine = engine_with(&cfg, ex.clone());

    let mut started = 0;
    // One tick per second for 20 seconds.
    for _ in 0..20 {
        let summary = engine.on_snapshot(&market(3.4)).await.unwrap();
        if let Some(handle) = summary.execution {
            handle.await.unwrap();
            started += 1;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    assert_eq!(started, 2);
    assert_eq!(engine.ticks_processed(), 20);
    assert_eq!(engine.controller().history().await.len(), 2);
    assert_eq!(ex.count(|c| matches!(c, Call::Accept(_))), 6);
}

#[tokio::test]
async fn test_malformed_ticks_keep_previous_snapshot() {
    let cfg = config(true, true);
    let engine = engine_with(&cfg, Arc::new(exchange(dec!(3.4))));

    engine.on_snapshot(&market(3.4)).await.unwrap();
    assert!(engine.on_snapshot(&json!({"code": -1003, "msg": "Too many requests"})).await.is_none());
    assert!(engine.on_snapshot(&json!([])).await.is_none());

    let latest = engine.latest().await;
    assert_eq!(latest.tick, 1);
    assert!(!latest.rows.is_empty());
}

#[tokio::test]
async fn test_history_persisted_and_restored() {
    let mut path = std::env::temp_dir();
    path.push(format!("triarb_it_history_{}.json", uuid::Uuid::new_v4()));
    let store = HistoryStore::new(path);

    let cfg = config(false, false);
    let ex = Arc::new(exchange(dec!(3.4)));
    let executor = Executor::with_sleeper(
        ex,
        ExecutionSettings::from_trading(&cfg.trading).unwrap(),
        Arc::new(NoSleep),
    );
    let controller = Arc::new(ExecutionController::new(executor, &cfg.trading).with_store(store.clone()));
    let engine = Engine::new(&cfg, controller);

    let summary = engine.on_snapshot(&market(3.4)).await.unwrap();
    let record = summary.execution.unwrap().await.unwrap();

    let restored = store.load().unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].id, record.id);
    assert_eq!(restored[0].outcome, OutcomeKind::Settled);

    store.delete().unwrap();
}
