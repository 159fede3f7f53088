//! Execution gate, cooldown and history.
//!
//! The controller is the only writer of cross-tick mutable state: the
//! cooldown flag, the in-flight marker and the bounded execution history.
//! Everything else reads snapshots.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TradingConfig;
use crate::engine::executor::{ExecutionOutcome, Executor};
use crate::storage::HistoryStore;
use crate::types::{Candidate, ExecutionRecord, OutcomeKind};

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Bounded list of execution records, newest first.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    records: VecDeque<ExecutionRecord>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Seed from persisted records (newest first), trimming to capacity.
    pub fn from_records(records: Vec<ExecutionRecord>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        history.records.extend(records);
        history.records.truncate(history.capacity);
        history
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&ExecutionRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Record construction
// ---------------------------------------------------------------------------

pub fn record_for(candidate: &Candidate, outcome: &ExecutionOutcome) -> ExecutionRecord {
    let mut record = ExecutionRecord {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        route: candidate.route(),
        identified_profit_pct: candidate.gross_profit_pct(),
        simulated_profit_pct: None,
        realized_profit: None,
        realized_profit_pct: None,
        error: None,
        outcome: OutcomeKind::Failed,
        success: false,
    };

    match outcome {
        ExecutionOutcome::Settled(result) => {
            record.simulated_profit_pct = result.simulated_pct;
            record.realized_profit = Some(result.profit);
            record.realized_profit_pct = Some(result.profit_pct);
            record.outcome = OutcomeKind::Settled;
            record.success = true;
        }
        ExecutionOutcome::ProfitInsufficient { simulated_pct, .. } => {
            record.simulated_profit_pct = Some(*simulated_pct);
            record.error = Some(format!(
                "Simulated profit insufficient: {}%",
                simulated_pct.round_dp(4)
            ));
            record.outcome = OutcomeKind::ProfitRejected;
        }
        ExecutionOutcome::Failed {
            error,
            simulated_pct,
        } => {
            record.simulated_profit_pct = *simulated_pct;
            record.error = Some(error.to_string());
        }
    }
    record
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Clears the in-flight marker when an execution ends, however it ends.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ExecutionController {
    executor: Executor,
    simulation_only: bool,
    cooldown_delay: Duration,
    cooldown: Arc<AtomicBool>,
    in_flight: Arc<AtomicBool>,
    started: AtomicU64,
    history_capacity: usize,
    history: Arc<RwLock<ExecutionHistory>>,
    store: Option<HistoryStore>,
}

impl ExecutionController {
    pub fn new(executor: Executor, cfg: &TradingConfig) -> Self {
        Self {
            executor,
            simulation_only: cfg.simulation_only,
            cooldown_delay: cfg.cooldown(),
            cooldown: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicBool::new(false)),
            started: AtomicU64::new(0),
            history_capacity: cfg.history_capacity,
            history: Arc::new(RwLock::new(ExecutionHistory::new(cfg.history_capacity))),
            store: None,
        }
    }

    /// Persist the history after every record.
    pub fn with_store(mut self, store: HistoryStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from previously persisted records.
    pub fn with_history(mut self, records: Vec<ExecutionRecord>) -> Self {
        let history = ExecutionHistory::from_records(records, self.history_capacity);
        self.history = Arc::new(RwLock::new(history));
        self
    }

    pub fn simulation_only(&self) -> bool {
        self.simulation_only
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooldown.load(Ordering::SeqCst)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn executions_started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether a candidate picked right now would be executed.
    pub fn gate_open(&self) -> bool {
        !self.simulation_only && !self.is_cooling_down() && !self.is_in_flight()
    }

    pub fn history_handle(&self) -> Arc<RwLock<ExecutionHistory>> {
        self.history.clone()
    }

    pub async fn history(&self) -> Vec<ExecutionRecord> {
        self.history.read().await.records()
    }

    /// Claim the execution slot: marks in-flight, sets the cooldown flag
    /// and arms its release timer. Must run inside a tokio runtime.
    fn try_acquire(&self) -> Option<InFlightGuard> {
        if self.simulation_only {
            return None;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let guard = InFlightGuard(self.in_flight.clone());

        if self
            .cooldown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let flag = self.cooldown.clone();
        let delay = self.cooldown_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            flag.store(false, Ordering::SeqCst);
        });

        self.started.fetch_add(1, Ordering::SeqCst);
        Some(guard)
    }

    /// Execute `candidate` on the current task if the gate is open.
    pub async fn execute_now(&self, candidate: &Candidate) -> Option<ExecutionRecord> {
        let guard = self.try_acquire()?;
        let record = self.run(candidate).await;
        drop(guard);
        Some(record)
    }

    /// Spawn the execution so the feed loop keeps ticking meanwhile.
    /// `None` when the gate is closed.
    pub fn maybe_execute(self: &Arc<Self>, candidate: Candidate) -> Option<JoinHandle<ExecutionRecord>> {
        let guard = self.try_acquire()?;
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _guard = guard;
            this.run(&candidate).await
        }))
    }

    async fn run(&self, candidate: &Candidate) -> ExecutionRecord {
        info!(
            route = %candidate.route(),
            gross_pct = format!("{:.4}", candidate.gross_profit_pct()),
            cooldown_secs = self.cooldown_delay.as_secs(),
            "Starting execution"
        );

        let outcome = self.executor.execute(candidate).await;
        let record = record_for(candidate, &outcome);

        if outcome.is_settled() {
            info!(record = %record, "Execution recorded");
        } else {
            warn!(record = %record, "Execution recorded");
        }

        let snapshot = {
            let mut history = self.history.write().await;
            history.push(record.clone());
            history.records()
        };

        if let Some(store) = self.store.clone() {
            match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to persist execution history"),
                Err(e) => warn!(error = %e, "History persistence task did not complete"),
            }
        }

        record
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
