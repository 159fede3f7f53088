//! Dashboard API route handlers.
//!
//! All endpoints return JSON and only read engine state.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::Engine;
use crate::strategy::fees::DisplayRow;
use crate::types::ExecutionRecord;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub engine: Arc<Engine>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub ticks_processed: u64,
    pub symbols_indexed: usize,
    pub cycles_found: usize,
    pub candidates_displayed: usize,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub cooling_down: bool,
    pub execution_in_flight: bool,
    pub simulation_only: bool,
    pub executions_started: u64,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidatesResponse {
    pub tick: u64,
    pub rows: Vec<DisplayRow>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let latest = state.engine.latest().await;
    let controller = state.engine.controller();

    Json(StatusResponse {
        ticks_processed: state.engine.ticks_processed(),
        symbols_indexed: latest.symbols,
        cycles_found: latest.cycles_found,
        candidates_displayed: latest.candidates.len(),
        last_tick_at: latest.processed_at,
        cooling_down: controller.is_cooling_down(),
        execution_in_flight: controller.is_in_flight(),
        simulation_only: controller.simulation_only(),
        executions_started: controller.executions_started(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/candidates
pub async fn get_candidates(State(state): State<AppState>) -> Json<CandidatesResponse> {
    let latest = state.engine.latest().await;
    Json(CandidatesResponse {
        tick: latest.tick,
        rows: latest.rows.clone(),
    })
}

/// GET /api/history
pub async fn get_history(State(state): State<AppState>) -> Json<Vec<ExecutionRecord>> {
    Json(state.engine.controller().history().await)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
