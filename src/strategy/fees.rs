//! Fee-adjusted display rows.
//!
//! Gross profit ignores trading fees. For observers we subtract a flat
//! per-leg fee under two schedules: paying fees in BNB (discounted) and
//! paying them normally.

use serde::Serialize;

use super::leg_volumes;
use crate::config::DisplayConfig;
use crate::types::{Candidate, Side};

const LEGS: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub bnb_pct_per_leg: f64,
    pub normal_pct_per_leg: f64,
}

impl FeeSchedule {
    pub fn from_display(cfg: &DisplayConfig) -> Self {
        Self {
            bnb_pct_per_leg: cfg.bnb_fee_pct_per_leg,
            normal_pct_per_leg: cfg.normal_fee_pct_per_leg,
        }
    }

    pub fn net_bnb(&self, gross_pct: f64) -> f64 {
        gross_pct - LEGS * self.bnb_pct_per_leg
    }

    pub fn net_normal(&self, gross_pct: f64) -> f64 {
        gross_pct - LEGS * self.normal_pct_per_leg
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            bnb_pct_per_leg: 0.075,
            normal_pct_per_leg: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LegView {
    pub symbol: String,
    pub side: Side,
    pub from: String,
    pub to: String,
    pub rate: f64,
}

/// One row of the ranked opportunity table.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayRow {
    pub rank: usize,
    pub step_a: String,
    pub step_b: String,
    pub step_c: String,
    pub route: String,
    pub legs: Vec<LegView>,
    pub rate: f64,
    pub gross_pct: f64,
    pub net_bnb_pct: f64,
    pub net_normal_pct: f64,
    /// Smallest per-leg 24h volume, in settlement currency.
    pub min_leg_volume: Option<f64>,
}

impl DisplayRow {
    pub fn from_candidate(rank: usize, c: &Candidate, fees: &FeeSchedule) -> Self {
        let gross = c.gross_profit_pct();
        Self {
            rank,
            step_a: c.leg_a.from.clone(),
            step_b: c.leg_b.from.clone(),
            step_c: c.leg_c.from.clone(),
            route: c.route(),
            legs: c
                .legs()
                .iter()
                .map(|l| LegView {
                    symbol: l.symbol().to_string(),
                    side: l.side(),
                    from: l.from.clone(),
                    to: l.to.clone(),
                    rate: l.rate,
                })
                .collect(),
            rate: c.rate,
            gross_pct: gross,
            net_bnb_pct: fees.net_bnb(gross),
            net_normal_pct: fees.net_normal(gross),
            min_leg_volume: leg_volumes(c).map(|v| v.min()),
        }
    }
}

/// Top `max_rows` of an already-ranked list, ranks starting at 1.
pub fn display_rows(ranked: &[Candidate], fees: &FeeSchedule, max_rows: usize) -> Vec<DisplayRow> {
    ranked
        .iter()
        .take(max_rows)
        .enumerate()
        .map(|(i, c)| DisplayRow::from_candidate(i + 1, c, fees))
        .collect()
}
