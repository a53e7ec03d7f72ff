//! Operational persistence — run lock, audit log, run history.
//!
//! The analytical store is in-memory (`store`); this module covers the
//! operational durability concerns: the single-run lock file, the
//! append-only audit trail, and historical pipeline run reports, all
//! sled-backed under the configured data directory.

mod audit;
mod lockfile;
mod runs;

pub use audit::AuditStorage;
pub use lockfile::{RunLock, RunLockInfo};
pub use runs::RunStorage;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Open the shared sled database and both operational stores under the
/// configured data directory. Composition boundary: callers get one
/// contextual error instead of juggling per-store failures, and both
/// stores share a single database handle.
pub fn open_storage(data_dir: &Path) -> anyhow::Result<(AuditStorage, RunStorage)> {
    let db_path = data_dir.join("db");
    let db = Arc::new(
        sled::open(&db_path)
            .with_context(|| format!("open operational database at {}", db_path.display()))?,
    );
    let audit = AuditStorage::open_tree(&db).context("open audit log tree")?;
    let runs = RunStorage::open_tree(&db).context("open run history tree")?;
    Ok((audit, runs))
}

/// Storage-layer errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(
        "pipeline run already in progress (pid {pid}, held for {held_minutes} min, \
         scoring config {config_hash})"
    )]
    RunInProgress {
        pid: u32,
        held_minutes: i64,
        config_hash: String,
    },
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunReport;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn open_storage_shares_one_database() {
        let dir = tempdir().expect("tempdir");
        let (audit, runs) = open_storage(dir.path()).expect("stack opens");

        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date");
        audit
            .append(&crate::types::AuditRecord {
                audit_id: 1,
                action: "vessel_merge".to_string(),
                entity_type: "vessel".to_string(),
                entity_id: 1,
                details: json!({}),
                user_agent: None,
                ip_address: None,
                created_at: now,
            })
            .expect("audit append");
        runs.store_report(&RunReport::new(now)).expect("run report stored");

        assert_eq!(audit.count(), 1);
        assert_eq!(runs.count(), 1);
    }
}
