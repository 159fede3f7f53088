//! Triangular cycle scanner.
//!
//! Walks the market index for every configured path currency and emits
//! each `base → B → C → base` cycle whose three legs are all listed,
//! with per-leg directional rates and the composite rate. No
//! profitability filtering happens here.

use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

use crate::market::MarketIndex;
use crate::types::{Candidate, Leg, Orientation};

// ---------------------------------------------------------------------------
// Leg resolution
// ---------------------------------------------------------------------------

/// Resolve the `from → to` conversion against the index.
///
/// Prefers the `to+from` listing (buy at the ask); falls back to
/// `from+to` (sell at the bid, reciprocal rate). `None` when neither
/// symbol is listed.
pub fn resolve_leg(index: &MarketIndex, from: &str, to: &str) -> Option<Leg> {
    [format!("{to}{from}"), format!("{from}{to}")]
        .iter()
        .find_map(|symbol| {
            let ticker = index.get(symbol)?;
            let orientation = Orientation::of(&ticker.symbol, from, to)?;
            Some(Leg::new(from, to, orientation, ticker.clone()))
        })
}

/// Build the full `a → b → c → a` candidate, or `None` if any leg is missing.
pub fn build_candidate(index: &MarketIndex, a: &str, b: &str, c: &str) -> Option<Candidate> {
    let leg_a = resolve_leg(index, a, b)?;
    let leg_b = resolve_leg(index, b, c)?;
    let leg_c = resolve_leg(index, c, a)?;
    Some(Candidate::new(a, leg_a, leg_b, leg_c))
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

fn rank_key(rate: f64) -> f64 {
    if rate.is_nan() {
        f64::NEG_INFINITY
    } else {
        rate
    }
}

/// Descending by composite rate; NaN ranks last. Stable, so equal rates
/// keep their discovery order.
pub fn compare_by_rate(a: &Candidate, b: &Candidate) -> Ordering {
    rank_key(b.rate).total_cmp(&rank_key(a.rate))
}

pub fn sort_by_rate(candidates: &mut [Candidate]) {
    candidates.sort_by(compare_by_rate);
}

// ---------------------------------------------------------------------------
// Cycle discovery
// ---------------------------------------------------------------------------

/// Counter-currencies reachable from `base`, excluding `path` itself.
fn reachable_from_base(index: &MarketIndex, base: &str, path: &str) -> HashSet<String> {
    index
        .market(base)
        .iter()
        .map(|t| t.symbol.replacen(base, "", 1))
        .filter(|counter| !counter.is_empty() && counter != path)
        .collect()
}

/// The currency paired with `path` in `symbol`, if `path` is its prefix or suffix.
fn counter_currency<'a>(symbol: &'a str, path: &str) -> Option<&'a str> {
    symbol
        .strip_prefix(path)
        .or_else(|| symbol.strip_suffix(path))
}

/// All cycles `base → path → C → base`, sorted by descending rate.
pub fn find_cycles_via(index: &MarketIndex, base: &str, path: &str) -> Vec<Candidate> {
    if !index.has_market(base) || !index.has_market(path) {
        debug!(base, path, "Step market not indexed, skipping path");
        return Vec::new();
    }

    let reachable = reachable_from_base(index, base, path);
    let mut found: Vec<Candidate> = Vec::new();

    for ticker in index.market(path) {
        let Some(c) = counter_currency(&ticker.symbol, path) else {
            continue;
        };
        if c.is_empty() || c == base || c == path || !reachable.contains(c) {
            continue;
        }
        if let Some(candidate) = build_candidate(index, base, path, c) {
            found.push(candidate);
        }
    }

    sort_by_rate(&mut found);
    debug!(base, path, cycles = found.len(), "Path scanned");
    found
}

/// Cycles for every path currency, concatenated in path order and
/// re-sorted by descending rate.
pub fn find_cycles(index: &MarketIndex, base: &str, paths: &[String]) -> Vec<Candidate> {
    let mut all: Vec<Candidate> = Vec::new();
    for path in paths {
        if path.is_empty() {
            continue;
        }
        all.extend(find_cycles_via(index, base, path));
    }
    sort_by_rate(&mut all);
    all
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
