//! Append-only audit log persistence.
//!
//! Mirrors the in-store audit trail to a sled tree keyed by
//! (timestamp, audit_id) in big-endian so iteration is chronological.
//! There is no delete path — the log only grows.

use std::path::Path;
use std::sync::Arc;

use super::StorageError;
use crate::types::AuditRecord;

/// Sled-backed audit storage.
#[derive(Clone)]
pub struct AuditStorage {
    tree: sled::Tree,
    _db: Arc<sled::Db>,
}

impl AuditStorage {
    /// Open or create audit storage inside the shared database path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("audit_log")?;
        Ok(Self {
            tree,
            _db: Arc::new(db),
        })
    }

    /// Open against an existing database handle (shared with runs).
    pub fn open_tree(db: &Arc<sled::Db>) -> Result<Self, StorageError> {
        let tree = db.open_tree("audit_log")?;
        Ok(Self {
            tree,
            _db: Arc::clone(db),
        })
    }

    fn key(record: &AuditRecord) -> [u8; 16] {
        let mut key = [0_u8; 16];
        key[..8].copy_from_slice(&record.created_at.timestamp().to_be_bytes());
        key[8..].copy_from_slice(&record.audit_id.to_be_bytes());
        key
    }

    /// Append one record.
    pub fn append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)?;
        self.tree.insert(Self::key(record), value)?;
        Ok(())
    }

    /// Append a batch (merge aftermath, pipeline end).
    pub fn append_all(&self, records: &[AuditRecord]) -> Result<usize, StorageError> {
        for record in records {
            self.append(record)?;
        }
        self.tree.flush()?;
        Ok(records.len())
    }

    /// Most recent N records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
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
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    fn record(id: i64, hours: i64) -> AuditRecord {
        AuditRecord {
            audit_id: id,
            action: "vessel_merge".to_string(),
            entity_type: "vessel".to_string(),
            entity_id: 1,
            details: json!({"merge_op_id": id}),
            user_agent: None,
            ip_address: None,
            created_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
                + Duration::hours(hours),
        }
    }

    #[test]
    fn records_round_trip_newest_first() {
        let dir = tempdir().expect("tempdir");
        let storage = AuditStorage::open(dir.path()).expect("storage opens");
        storage
            .append_all(&[record(1, 0), record(2, 1), record(3, 2)])
            .expect("append");
        let recent = storage.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].audit_id, 3);
        assert_eq!(recent[1].audit_id, 2);
        assert_eq!(storage.count(), 3);
    }
}
