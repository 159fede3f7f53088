//! Opportunity filter and ranker.
//!
//! Two passes over the same candidate list:
//! - the *display* pass keeps every structurally sound, liquid cycle on
//!   the settlement route, regardless of profitability;
//! - the *execution* pass adds the gross-profit bar and picks the single
//!   best survivor.
//!
//! The execution pass is built on top of the display pass, so its
//! survivors are always a subset of the display survivors.

pub mod fees;

use std::fmt;
use tracing::debug;

use crate::config::AppConfig;
use crate::engine::scanner::compare_by_rate;
use crate::types::Candidate;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Currency every cycle must start and end in.
    pub settlement: String,
    /// If non-empty, the second intermediate must be listed here.
    pub allowed_middle: Vec<String>,
    /// Minimum 24h quote volume per leg, in settlement currency.
    pub min_quote_volume: f64,
    /// Gross profit percent an executable candidate must exceed.
    pub min_profit_pct: f64,
}

impl FilterConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        Self {
            settlement: cfg.arbitrage.base(),
            allowed_middle: cfg.arbitrage.allowed_middle(),
            min_quote_volume: cfg.trading.min_quote_volume,
            min_profit_pct: cfg.trading.min_profit_pct,
        }
    }
}

// ---------------------------------------------------------------------------
// Volumes
// ---------------------------------------------------------------------------

/// Per-leg 24h quote volume expressed in settlement currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegVolumes {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl LegVolumes {
    pub fn min(&self) -> f64 {
        self.a.min(self.b).min(self.c)
    }
}

/// Leg volumes in settlement terms. The middle leg's quote volume is
/// converted with the first leg's last price.
///
/// `None` when any figure is missing or the conversion price is not positive.
pub fn leg_volumes(candidate: &Candidate) -> Option<LegVolumes> {
    let price = candidate.leg_a.ticker.last_price;
    if price.is_nan() || price <= 0.0 {
        return None;
    }

    let a = candidate.leg_a.ticker.quote_volume;
    let b = candidate.leg_b.ticker.quote_volume * price;
    let c = candidate.leg_c.ticker.quote_volume;
    if a.is_nan() || b.is_nan() || c.is_nan() {
        return None;
    }
    Some(LegVolumes { a, b, c })
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a candidate was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Missing currency, unusable rate or missing price data.
    Malformed,
    /// Does not start and end in the settlement currency.
    Route,
    /// Second intermediate not on the allow-list.
    NotAllowed,
    /// Volume missing or a leg below the minimum.
    Illiquid,
    /// Gross profit at or below the execution bar.
    Unprofitable,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Malformed => write!(f, "malformed"),
            Rejection::Route => write!(f, "route"),
            Rejection::NotAllowed => write!(f, "not-allowed"),
            Rejection::Illiquid => write!(f, "illiquid"),
            Rejection::Unprofitable => write!(f, "unprofitable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

pub struct OpportunityFilter {
    config: FilterConfig,
}

impl OpportunityFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Structural, route, allow-list and liquidity checks.
    pub fn check_display(&self, c: &Candidate) -> Result<LegVolumes, Rejection> {
        let currencies = [&c.leg_a.from, &c.leg_a.to, &c.leg_b.to, &c.leg_c.to];
        if currencies.iter().any(|cur| cur.is_empty()) {
            return Err(Rejection::Malformed);
        }
        let legs_ok = c
            .legs()
            .iter()
            .all(|l| l.ticker.has_prices() && l.rate.is_finite() && l.rate > 0.0);
        if !legs_ok || !c.rate.is_finite() || c.rate <= 0.0 {
            return Err(Rejection::Malformed);
        }

        if c.leg_a.from != self.config.settlement || c.leg_c.to != self.config.settlement {
            return Err(Rejection::Route);
        }

        if !self.config.allowed_middle.is_empty()
            && !self.config.allowed_middle.iter().any(|m| *m == c.leg_b.to)
        {
            return Err(Rejection::NotAllowed);
        }

        let volumes = leg_volumes(c).ok_or(Rejection::Illiquid)?;
        if volumes.min() < self.config.min_quote_volume {
            return Err(Rejection::Illiquid);
        }

        Ok(volumes)
    }

    /// Every display check plus the gross-profit bar.
    pub fn check_execution(&self, c: &Candidate) -> Result<LegVolumes, Rejection> {
        let volumes = self.check_display(c)?;
        if c.gross_profit_pct() <= self.config.min_profit_pct {
            return Err(Rejection::Unprofitable);
        }
        Ok(volumes)
    }

    /// Ranked list for observers; no profitability bar.
    pub fn display_pass(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        self.pass(candidates, |c| self.check_display(c))
    }

    /// Ranked executable candidates.
    pub fn execution_pass(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        self.pass(candidates, |c| self.check_execution(c))
    }

    /// The single best executable candidate, if any.
    pub fn select_executable(&self, candidates: &[Candidate]) -> Option<Candidate> {
        self.execution_pass(candidates).into_iter().next()
    }

    fn pass<F>(&self, candidates: &[Candidate], check: F) -> Vec<Candidate>
    where
        F: Fn(&Candidate) -> Result<LegVolumes, Rejection>,
    {
        let mut rejected = 0usize;
        let mut survivors: Vec<Candidate> = candidates
            .iter()
            .filter(|c| match check(c) {
                Ok(_) => true,
                Err(_) => {
                    rejected += 1;
                    false
                }
            })
            .cloned()
            .collect();
        survivors.sort_by(compare_by_rate);

        debug!(
            kept = survivors.len(),
            rejected,
            "Filter pass complete"
        );
        survivors
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
