//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::exchange::QuoteValidity;

/// Markets always indexed, in addition to the base and path currencies.
pub const DEFAULT_STEP_CURRENCIES: &[&str] = &["BTC", "ETH", "BNB", "USDT"];

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub arbitrage: ArbitrageConfig,
    pub trading: TradingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_feed_interval")]
    pub feed_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArbitrageConfig {
    /// Settlement currency every cycle starts and ends in.
    pub base_currency: String,
    /// Intermediate currencies scanned as the first hop.
    pub path_currencies: Vec<String>,
    /// If non-empty, the second intermediate must be one of these.
    #[serde(default)]
    pub allowed_middle: Vec<String>,
    #[serde(default = "default_steps")]
    pub step_currencies: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    /// Scan and display only; never touch the exchange's convert API.
    #[serde(default)]
    pub simulation_only: bool,
    #[serde(default = "default_true")]
    pub verify_before_execute: bool,
    /// Gross profit percent a candidate must exceed to be executed.
    pub min_profit_pct: f64,
    /// Simulated profit percent the pre-trade quotes must reach.
    #[serde(default = "default_verify_min")]
    pub verify_min_profit_pct: f64,
    /// Minimum 24h quote volume per leg, in settlement currency.
    pub min_quote_volume: f64,
    /// Settlement-currency amount spent on the first leg.
    pub capital: f64,
    #[serde(default = "default_slippage_buffer")]
    pub slippage_buffer: f64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_max_attempts: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_quote_validity")]
    pub quote_valid_time: QuoteValidity,
    #[serde(default = "default_simulation_validity")]
    pub simulation_valid_time: QuoteValidity,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    pub max_rows: usize,
    pub bnb_fee_pct_per_leg: f64,
    pub normal_fee_pct_per_leg: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_rows: 20,
            bnb_fee_pct_per_leg: 0.075,
            normal_fee_pct_per_leg: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub log_history: bool,
    pub history_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_history: false,
            history_path: "triarb_history.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_recv_window() -> u64 {
    5000
}
fn default_request_timeout() -> u64 {
    15
}
fn default_feed_interval() -> u64 {
    1000
}
fn default_steps() -> Vec<String> {
    DEFAULT_STEP_CURRENCIES.iter().map(|s| s.to_string()).collect()
}
fn default_true() -> bool {
    true
}
fn default_verify_min() -> f64 {
    0.3
}
fn default_slippage_buffer() -> f64 {
    0.999
}
fn default_cooldown() -> u64 {
    15
}
fn default_poll_attempts() -> u32 {
    10
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_quote_validity() -> QuoteValidity {
    QuoteValidity::TenSeconds
}
fn default_simulation_validity() -> QuoteValidity {
    QuoteValidity::ThirtySeconds
}
fn default_history_capacity() -> usize {
    10
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let arb = &self.arbitrage;
        let trading = &self.trading;

        if arb.base_currency.trim().is_empty() {
            bail!("arbitrage.base_currency must not be empty");
        }
        if arb.path_currencies.iter().all(|p| p.trim().is_empty()) {
            bail!("arbitrage.path_currencies must name at least one currency");
        }
        if !(trading.capital.is_finite() && trading.capital > 0.0) {
            bail!("trading.capital must be positive, got {}", trading.capital);
        }
        if !(trading.slippage_buffer > 0.0 && trading.slippage_buffer <= 1.0) {
            bail!(
                "trading.slippage_buffer must be in (0, 1], got {}",
                trading.slippage_buffer
            );
        }
        if trading.poll_max_attempts == 0 {
            bail!("trading.poll_max_attempts must be at least 1");
        }
        if trading.history_capacity == 0 {
            bail!("trading.history_capacity must be at least 1");
        }
        if self.exchange.feed_interval_ms == 0 {
            bail!("exchange.feed_interval_ms must be positive");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl ArbitrageConfig {
    /// Upper-cased base currency.
    pub fn base(&self) -> String {
        self.base_currency.trim().to_uppercase()
    }

    /// Upper-cased, de-duplicated path currencies in configured order.
    pub fn paths(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for p in &self.path_currencies {
            let p = p.trim().to_uppercase();
            if !p.is_empty() && !out.contains(&p) {
                out.push(p);
            }
        }
        out
    }

    pub fn allowed_middle(&self) -> Vec<String> {
        self.allowed_middle
            .iter()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Markets to index: configured steps plus the base and every path.
    pub fn indexed_steps(&self) -> Vec<String> {
        let mut steps: Vec<String> = Vec::new();
        let all = self
            .step_currencies
            .iter()
            .map(|s| s.trim().to_uppercase())
            .chain(std::iter::once(self.base()))
            .chain(self.paths());
        for s in all {
            if !s.is_empty() && !steps.contains(&s) {
                steps.push(s);
            }
        }
        steps
    }
}

/// Convert via the shortest decimal rendering so `0.999` stays `0.999`.
fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string()).ok()
}

impl TradingConfig {
    pub fn capital_decimal(&self) -> Result<Decimal> {
        decimal_from_f64(self.capital)
            .with_context(|| format!("trading.capital is not representable: {}", self.capital))
    }

    pub fn slippage_decimal(&self) -> Result<Decimal> {
        decimal_from_f64(self.slippage_buffer).with_context(|| {
            format!("trading.slippage_buffer is not representable: {}", self.slippage_buffer)
        })
    }

    pub fn verify_min_decimal(&self) -> Result<Decimal> {
        decimal_from_f64(self.verify_min_profit_pct).with_context(|| {
            format!(
                "trading.verify_min_profit_pct is not representable: {}",
                self.verify_min_profit_pct
            )
        })
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
