//! Core engine: the per-tick ingest → scan → filter → execute pipeline.
//!
//! Each feed snapshot is turned into a fresh `MarketIndex` and candidate
//! list; the ranked display list is published as an immutable
//! `TickSnapshot` swapped in wholesale, so readers never see a partial
//! tick. The best executable candidate is handed to the controller,
//! which owns all cross-tick state.

pub mod controller;
pub mod executor;
pub mod scanner;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::market::MarketIndex;
use crate::strategy::fees::{display_rows, DisplayRow, FeeSchedule};
use crate::strategy::{FilterConfig, OpportunityFilter};
use crate::types::{Candidate, ExecutionRecord};
use controller::ExecutionController;

/// Minimum spacing between "scanning" activity lines.
const ACTIVITY_LOG_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Published state
// ---------------------------------------------------------------------------

/// Everything observers see about the latest processed tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub processed_at: Option<DateTime<Utc>>,
    pub symbols: usize,
    pub cycles_found: usize,
    /// Display-pass survivors, ranked.
    pub candidates: Vec<Candidate>,
    /// Top rows of `candidates` with fee estimates.
    pub rows: Vec<DisplayRow>,
}

impl TickSnapshot {
    fn empty() -> Self {
        Self {
            tick: 0,
            processed_at: None,
            symbols: 0,
            cycles_found: 0,
            candidates: Vec::new(),
            rows: Vec::new(),
        }
    }
}

/// Result of processing one feed snapshot.
#[derive(Debug)]
pub struct TickSummary {
    pub tick: u64,
    pub symbols: usize,
    pub cycles_found: usize,
    pub displayed: usize,
    /// Route of the candidate handed to the controller, if any.
    pub picked: Option<String>,
    /// Spawned execution, when the gate accepted the pick.
    pub execution: Option<JoinHandle<ExecutionRecord>>,
}

impl TickSummary {
    pub fn execution_started(&self) -> bool {
        self.execution.is_some()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    base: String,
    paths: Vec<String>,
    steps: Vec<String>,
    filter: OpportunityFilter,
    fees: FeeSchedule,
    max_rows: usize,
    controller: Arc<ExecutionController>,
    latest: Arc<RwLock<Arc<TickSnapshot>>>,
    ticks: AtomicU64,
    last_activity_log: Mutex<Option<Instant>>,
}

impl Engine {
    pub fn new(cfg: &AppConfig, controller: Arc<ExecutionController>) -> Self {
        Self {
            base: cfg.arbitrage.base(),
            paths: cfg.arbitrage.paths(),
            steps: cfg.arbitrage.indexed_steps(),
            filter: OpportunityFilter::new(FilterConfig::from_app(cfg)),
            fees: FeeSchedule::from_display(&cfg.display),
            max_rows: cfg.display.max_rows,
            controller,
            latest: Arc::new(RwLock::new(Arc::new(TickSnapshot::empty()))),
            ticks: AtomicU64::new(0),
            last_activity_log: Mutex::new(None),
        }
    }

    pub fn controller(&self) -> &Arc<ExecutionController> {
        &self.controller
    }

    pub fn ticks_processed(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub async fn latest(&self) -> Arc<TickSnapshot> {
        self.latest.read().await.clone()
    }

    /// Process one raw feed delivery.
    ///
    /// Returns `None` when the payload is not a usable ticker array; the
    /// previous snapshot stays published in that case.
    pub async fn on_snapshot(&self, raw: &Value) -> Option<TickSummary> {
        let Some(index) = MarketIndex::ingest(raw, &self.steps) else {
            debug!("Ignoring empty or malformed ticker snapshot");
            return None;
        };
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;

        let cycles = scanner::find_cycles(&index, &self.base, &self.paths);
        let displayed = self.filter.display_pass(&cycles);

        let snapshot = Arc::new(TickSnapshot {
            tick,
            processed_at: Some(Utc::now()),
            symbols: index.symbol_count(),
            cycles_found: cycles.len(),
            rows: display_rows(&displayed, &self.fees, self.max_rows),
            candidates: displayed,
        });
        *self.latest.write().await = snapshot.clone();

        self.log_activity(&snapshot);

        let mut summary = TickSummary {
            tick,
            symbols: snapshot.symbols,
            cycles_found: snapshot.cycles_found,
            displayed: snapshot.candidates.len(),
            picked: None,
            execution: None,
        };

        if !self.controller.gate_open() {
            return Some(summary);
        }

        if let Some(pick) = self.filter.select_executable(&snapshot.candidates) {
            info!(
                tick,
                candidate = %pick,
                "Executable opportunity found"
            );
            summary.picked = Some(pick.route());
            summary.execution = self.controller.maybe_execute(pick);
        }

        Some(summary)
    }

    fn log_activity(&self, snapshot: &TickSnapshot) {
        let Ok(mut last) = self.last_activity_log.lock() else {
            return;
        };
        let now = Instant::now();
        if last.is_some_and(|t| now.duration_since(t) < ACTIVITY_LOG_INTERVAL) {
            return;
        }
        *last = Some(now);

        let cfg = self.filter.config();
        let best = snapshot.candidates.first().map(|c| c.gross_profit_pct());
        info!(
            tick = snapshot.tick,
            symbols = snapshot.symbols,
            cycles = snapshot.cycles_found,
            displayed = snapshot.candidates.len(),
            best_gross_pct = ?best,
            min_profit_pct = cfg.min_profit_pct,
            min_quote_volume = cfg.min_quote_volume,
            allowed_middle = ?cfg.allowed_middle,
            simulation_only = self.controller.simulation_only(),
            "Scanning for opportunities"
        );
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
