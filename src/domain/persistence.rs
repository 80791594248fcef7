//! Ledger Persistence
//!
//! Snapshots the whole ledger to JSON so a restarted agent resumes with the
//! same bankroll, peak, streak and open positions.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::ledger::PortfolioLedger;

/// Default snapshot file name
pub const DEFAULT_STATE_FILE: &str = "ledger_state.json";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug, Clone)]
pub enum PersistError {
    #[error("Failed to serialize ledger: {0}")]
    SerializationError(String),

    #[error("Failed to deserialize ledger: {0}")]
    DeserializationError(String),

    #[error("Failed to write state file: {0}")]
    WriteError(String),

    #[error("Failed to read state file: {0}")]
    ReadError(String),

    #[error("State file is corrupted: {0}")]
    CorruptedFile(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),

    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: chrono::DateTime<chrono::Utc>,
    ledger: PortfolioLedger,
}

/// Result of looking for a snapshot at startup
#[derive(Debug)]
pub enum RecoveryStatus {
    /// Nothing saved yet
    Fresh,
    Recovered(PortfolioLedger),
    /// Unreadable or inconsistent, needs a human
    Corrupted(String),
}

/// Reads and writes ledger snapshots at one path
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `data_dir/ledger_state.json`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DEFAULT_STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write through a sibling temp file and rename over the target, so a
    /// crash mid-write never leaves a truncated snapshot.
    pub fn save(&self, ledger: &PortfolioLedger) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| PersistError::DirectoryError(e.to_string()))?;
            }
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now(),
            ledger: ledger.clone(),
        };
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| PersistError::SerializationError(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| PersistError::WriteError(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| PersistError::WriteError(e.to_string()))?;

        let state = ledger.state();
        tracing::info!(
            "Ledger saved to {}: bankroll ${:.2}, {} open",
            self.path.display(),
            state.bankroll_usd,
            state.open_positions.len()
        );
        Ok(())
    }

    /// Load the snapshot; `None` when no file or an empty file exists
    pub fn load(&self) -> Result<Option<PortfolioLedger>, PersistError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| PersistError::ReadError(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|e| PersistError::DeserializationError(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistError::UnsupportedVersion(snapshot.version));
        }
        snapshot
            .ledger
            .check_consistency()
            .map_err(PersistError::CorruptedFile)?;

        let state = snapshot.ledger.state();
        tracing::info!(
            "Ledger loaded from {} (saved {}): bankroll ${:.2}, {} open",
            self.path.display(),
            snapshot.saved_at.format("%Y-%m-%d %H:%M:%S"),
            state.bankroll_usd,
            state.open_positions.len()
        );
        Ok(Some(snapshot.ledger))
    }

    pub fn try_recover(&self) -> RecoveryStatus {
        match self.load() {
            Ok(Some(ledger)) => RecoveryStatus::Recovered(ledger),
            Ok(None) => RecoveryStatus::Fresh,
            Err(e) => RecoveryStatus::Corrupted(e.to_string()),
        }
    }
}
