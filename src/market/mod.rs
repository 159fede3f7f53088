//! Market index.
//!
//! Normalises one raw ticker snapshot into a symbol → ticker map plus,
//! for each step currency, the subset of tickers whose symbol starts or
//! ends with it. Built in one pass and never mutated afterwards: a new
//! snapshot produces a new index.

pub mod ticker;

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::types::Ticker;
pub use ticker::parse_ticker;

/// Immutable per-tick view of the market.
#[derive(Debug, Clone, Default)]
pub struct MarketIndex {
    by_symbol: HashMap<String, Ticker>,
    markets: HashMap<String, Vec<Ticker>>,
}

impl MarketIndex {
    /// Build an index from a raw feed payload.
    ///
    /// Returns `None` (the tick is ignored) when the payload is not an
    /// array, is empty, or holds no usable entry.
    pub fn ingest(raw: &Value, steps: &[String]) -> Option<Self> {
        let entries = raw.as_array()?;
        if entries.is_empty() {
            return None;
        }

        let tickers: Vec<Ticker> = entries.iter().filter_map(parse_ticker).collect();
        let dropped = entries.len() - tickers.len();
        if dropped > 0 {
            debug!(dropped, total = entries.len(), "Discarded malformed ticker entries");
        }

        Self::from_tickers(tickers, steps)
    }

    /// Build an index from already-parsed tickers, in feed order.
    pub fn from_tickers(tickers: Vec<Ticker>, steps: &[String]) -> Option<Self> {
        if tickers.is_empty() {
            return None;
        }

        let mut markets: HashMap<String, Vec<Ticker>> = steps
            .iter()
            .map(|s| (s.clone(), Vec::new()))
            .collect();

        for t in &tickers {
            for step in steps {
                if t.symbol.starts_with(step.as_str()) || t.symbol.ends_with(step.as_str()) {
                    if let Some(subset) = markets.get_mut(step) {
                        subset.push(t.clone());
                    }
                }
            }
        }

        // Last write wins for duplicate symbols.
        let by_symbol: HashMap<String, Ticker> = tickers
            .into_iter()
            .map(|t| (t.symbol.clone(), t))
            .collect();

        Some(Self { by_symbol, markets })
    }

    pub fn get(&self, symbol: &str) -> Option<&Ticker> {
        self.by_symbol.get(symbol)
    }

    /// Tickers involving `step` as prefix or suffix, in feed order.
    /// Empty when `step` was not indexed.
    pub fn market(&self, step: &str) -> &[Ticker] {
        self.markets.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_market(&self, step: &str) -> bool {
        self.markets.contains_key(step)
    }

    pub fn symbol_count(&self) -> usize {
        self.by_symbol.len()
    }
}
