//! Pipeline run-report history.
//!
//! Each completed run persists its report keyed by start timestamp
//! (big-endian for natural chronological ordering).
//!
//! Note: writes flush once per run, not per insert — a run report is
//! written exactly once at the end of the pipeline.

use std::path::Path;
use std::sync::Arc;

use super::StorageError;
use crate::pipeline::RunReport;

/// Sled-backed run history.
#[derive(Clone)]
pub struct RunStorage {
    tree: sled::Tree,
    _db: Arc<sled::Db>,
}

impl RunStorage {
    /// Open or create run storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("pipeline_runs")?;
        Ok(Self {
            tree,
            _db: Arc::new(db),
        })
    }

    /// Open against an existing database handle.
    pub fn open_tree(db: &Arc<sled::Db>) -> Result<Self, StorageError> {
        let tree = db.open_tree("pipeline_runs")?;
        Ok(Self {
            tree,
            _db: Arc::clone(db),
        })
    }

    /// Persist a run report.
    pub fn store_report(&self, report: &RunReport) -> Result<(), StorageError> {
        let key = report.started_at.timestamp().to_be_bytes();
        let value = serde_json::to_vec(report)?;
        self.tree.insert(key, value)?;
        self.tree.flush()?;
        Ok(())
    }

    /// Most recent N reports, newest first.
    pub fn recent(&self, limit: usize) -> Vec<RunReport> {
        self.tree
            .iter()
            .rev()
            .filter_map(Result::ok)
            .filter_map(|(_, value)| serde_json::from_slice(&value).ok())
            .take(limit)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.tree.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunReport;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn reports_round_trip() {
        let dir = tempdir().expect("tempdir");
        let storage = RunStorage::open(dir.path()).expect("storage opens");
        let mut report = RunReport::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date"),
        );
        report.config_hash = "deadbeef".to_string();
        storage.store_report(&report).expect("stored");

        let loaded = storage.recent(10);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].config_hash, "deadbeef");
    }
}
