//! Shared types for the TRIARB engine.
//!
//! These types form the data model used across all modules: tickers
//! come out of the market index, legs and candidates come out of the
//! cycle finder, and execution records come out of the controller.
//! Nothing here is mutated after construction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Latest top-of-book state for one symbol.
///
/// Numeric fields are `NaN` when the feed omitted them or sent something
/// unparseable; downstream filters reject those.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticker {
    pub symbol: String,
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
    /// Last traded price, used to convert volumes between currencies.
    pub last_price: f64,
    /// 24h volume in the base asset.
    pub base_volume: f64,
    /// 24h volume in the quote asset.
    pub quote_volume: f64,
    /// 24h trade count.
    pub trades: u64,
    /// Exchange event time (ms since epoch).
    pub event_time: i64,
}

impl Ticker {
    /// Whether both sides of the book carry a usable price.
    pub fn has_prices(&self) -> bool {
        self.bid_price.is_finite()
            && self.bid_price > 0.0
            && self.ask_price.is_finite()
            && self.ask_price > 0.0
    }

    /// Helper to build a test ticker with sensible volume defaults.
    #[cfg(test)]
    pub fn sample(symbol: &str, bid: f64, ask: f64) -> Self {
        Ticker {
            symbol: symbol.to_string(),
            bid_price: bid,
            bid_qty: 10.0,
            ask_price: ask,
            ask_qty: 10.0,
            last_price: (bid + ask) / 2.0,
            base_volume: 1_000_000.0,
            quote_volume: 1_000_000.0,
            trades: 500,
            event_time: 1_700_000_000_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Leg orientation
// ---------------------------------------------------------------------------

/// Trade direction implied by a leg's orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// How a listed symbol relates to a desired `from → to` conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    /// Symbol is listed as `to + from`: spend `from` to buy `to` at the ask.
    Direct,
    /// Symbol is listed as `from + to`: sell `from` into `to` at the bid.
    Flipped,
}

impl Orientation {
    /// Classify `symbol` against the conversion `from → to`.
    ///
    /// Returns `None` when the symbol is neither `to+from` nor `from+to`.
    pub fn of(symbol: &str, from: &str, to: &str) -> Option<Self> {
        if from.is_empty() || to.is_empty() || symbol.len() != from.len() + to.len() {
            return None;
        }
        if symbol.starts_with(to) && symbol.ends_with(from) {
            Some(Orientation::Direct)
        } else if symbol.starts_with(from) && symbol.ends_with(to) {
            Some(Orientation::Flipped)
        } else {
            None
        }
    }

    pub fn is_flipped(self) -> bool {
        self == Orientation::Flipped
    }

    pub fn side(self) -> Side {
        match self {
            Orientation::Direct => Side::Buy,
            Orientation::Flipped => Side::Sell,
        }
    }
}

// ---------------------------------------------------------------------------
// Leg
// ---------------------------------------------------------------------------

/// One directional conversion edge of a triangular cycle.
///
/// `rate` is always "units of `to` obtainable per unit of `from`".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leg {
    pub from: String,
    pub to: String,
    pub flipped: bool,
    pub rate: f64,
    pub ticker: Ticker,
}

impl Leg {
    /// Build a leg from a ticker already known to match `orientation`.
    pub fn new(from: &str, to: &str, orientation: Orientation, ticker: Ticker) -> Self {
        let rate = match orientation {
            Orientation::Direct => ticker.ask_price,
            Orientation::Flipped => 1.0 / ticker.bid_price,
        };
        Self {
            from: from.to_string(),
            to: to.to_string(),
            flipped: orientation.is_flipped(),
            rate,
            ticker,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.ticker.symbol
    }

    pub fn side(&self) -> Side {
        if self.flipped {
            Side::Sell
        } else {
            Side::Buy
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// One triangular cycle `base → step_b → step_c → base`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub base: String,
    pub step_b: String,
    pub step_c: String,
    pub leg_a: Leg,
    pub leg_b: Leg,
    pub leg_c: Leg,
    /// Product of the three leg rates. Above 1.0 means a pre-fee profit.
    pub rate: f64,
    /// Event time of the first leg's ticker.
    pub event_time: i64,
}

impl Candidate {
    pub fn new(base: &str, leg_a: Leg, leg_b: Leg, leg_c: Leg) -> Self {
        let rate = leg_a.rate * leg_b.rate * leg_c.rate;
        Self {
            base: base.to_string(),
            step_b: leg_a.to.clone(),
            step_c: leg_b.to.clone(),
            event_time: leg_a.ticker.event_time,
            leg_a,
            leg_b,
            leg_c,
            rate,
        }
    }

    /// `(rate - 1) × 100`.
    pub fn gross_profit_pct(&self) -> f64 {
        (self.rate - 1.0) * 100.0
    }

    pub fn legs(&self) -> [&Leg; 3] {
        [&self.leg_a, &self.leg_b, &self.leg_c]
    }

    /// Human-readable route, e.g. `USDT → BTC → ETH → USDT`.
    pub fn route(&self) -> String {
        format!(
            "{} → {} → {} → {}",
            self.leg_a.from, self.leg_a.to, self.leg_b.to, self.leg_c.to
        )
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {} / {} {} / {} {}] rate={:.6} ({:+.3}%)",
            self.route(),
            self.leg_a.side(),
            self.leg_a.symbol(),
            self.leg_b.side(),
            self.leg_b.symbol(),
            self.leg_c.side(),
            self.leg_c.symbol(),
            self.rate,
            self.gross_profit_pct(),
        )
    }
}

// ---------------------------------------------------------------------------
// Execution record
// ---------------------------------------------------------------------------

/// How an execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// All three legs settled.
    Settled,
    /// Pre-trade verification declined the trade; no funds moved.
    ProfitRejected,
    /// A quote, accept, status or output check failed.
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Settled => write!(f, "settled"),
            OutcomeKind::ProfitRejected => write!(f, "profit-rejected"),
            OutcomeKind::Failed => write!(f, "failed"),
        }
    }
}

/// Immutable result of one attempt to realize a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub route: String,
    /// Gross profit percent the cycle finder saw when it was picked.
    pub identified_profit_pct: f64,
    pub simulated_profit_pct: Option<Decimal>,
    pub realized_profit: Option<Decimal>,
    pub realized_profit_pct: Option<Decimal>,
    pub error: Option<String>,
    pub outcome: OutcomeKind,
    pub success: bool,
}

impl fmt::Display for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} identified={:.3}%",
            self.outcome, self.route, self.identified_profit_pct
        )?;
        if let Some(sim) = self.simulated_profit_pct {
            write!(f, " simulated={sim:.3}%")?;
        }
        if let (Some(p), Some(pct)) = (self.realized_profit, self.realized_profit_pct) {
            write!(f, " realized={p:.4} ({pct:.3}%)")?;
        }
        if let Some(ref e) = self.error {
            write!(f, " error={e}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
