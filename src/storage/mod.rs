//! Persistence layer.
//!
//! Saves and loads the bounded execution history to/from a JSON file so
//! operators keep the recent record across restarts.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::ExecutionRecord;

/// JSON file holding execution records, newest first.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `records`.
    pub fn save(&self, records: &[ExecutionRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)
            .context("Failed to serialise execution history")?;

        std::fs::write(&self.path, &json)
            .with_context(|| format!("Failed to write history to {}", self.path.display()))?;

        debug!(path = %self.path.display(), records = records.len(), "History saved");
        Ok(())
    }

    /// Load records. A missing file is a fresh start, not an error.
    pub fn load(&self) -> Result<Vec<ExecutionRecord>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No saved history found, starting fresh");
            return Ok(Vec::new());
        }

        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read history from {}", self.path.display()))?;

        let records: Vec<ExecutionRecord> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse history from {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            records = records.len(),
            "History loaded from disk"
        );
        Ok(records)
    }

    /// Remove the file if present.
    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to delete history file {}", self.path.display()))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
