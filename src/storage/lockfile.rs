//! Pipeline run lock.
//!
//! Concurrent pipeline runs are forbidden: detection steps assume they
//! own the store for the whole run. The lock file records *which* run
//! holds it — PID, start time and the scoring-config hash — so an
//! operator inspecting a busy deployment can see what is running and
//! against which catalogue before deciding to wait or intervene.
//! Locks left behind by dead processes are reclaimed automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::StorageError;

/// Metadata written by the run that holds the lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLockInfo {
    pub pid: u32,
    /// The run's fixed reference time (`PipelineContext::now`).
    pub started_at: DateTime<Utc>,
    /// Scoring-config hash the running pipeline was launched with.
    pub config_hash: String,
}

/// What an existing lock file turns out to be on inspection.
enum LockState {
    /// Held by a live process.
    Active(RunLockInfo),
    /// Left behind by a dead process, or unreadable — safe to reclaim.
    Stale,
}

/// Exclusive pipeline run lock. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    lock_path: PathBuf,
    info: RunLockInfo,
    owned: bool,
}

impl RunLock {
    /// Lock file name
    const LOCK_FILE_NAME: &'static str = ".darkfleet.lock";

    /// Acquire the run lock for the given data directory, stamping it
    /// with this run's config hash and reference time.
    ///
    /// Fails with `StorageError::RunInProgress` while another run holds
    /// the lock.
    pub fn acquire<P: AsRef<Path>>(
        data_dir: P,
        config_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .map_err(|e| StorageError::Database(format!("create {}: {e}", data_dir.display())))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);
        if lock_path.exists() {
            match Self::inspect(&lock_path) {
                LockState::Active(holder) => {
                    return Err(StorageError::RunInProgress {
                        pid: holder.pid,
                        held_minutes: (now - holder.started_at).num_minutes(),
                        config_hash: holder.config_hash,
                    });
                }
                LockState::Stale => {
                    info!(lock_path = %lock_path.display(), "Reclaiming run lock from a dead process");
                    fs::remove_file(&lock_path).map_err(|e| {
                        StorageError::Database(format!("remove stale lock: {e}"))
                    })?;
                }
            }
        }

        let info = RunLockInfo {
            pid: std::process::id(),
            started_at: now,
            config_hash: config_hash.to_string(),
        };
        let payload = serde_json::to_vec(&info)?;
        fs::write(&lock_path, payload)
            .map_err(|e| StorageError::Database(format!("write lock file: {e}")))?;

        debug!(pid = info.pid, config_hash = %info.config_hash, "Acquired run lock");
        Ok(Self {
            lock_path,
            info,
            owned: true,
        })
    }

    /// Classify an existing lock file.
    fn inspect(lock_path: &Path) -> LockState {
        let Ok(contents) = fs::read_to_string(lock_path) else {
            return LockState::Stale;
        };
        let Ok(info) = serde_json::from_str::<RunLockInfo>(&contents) else {
            warn!(lock_path = %lock_path.display(), "Run lock file is unreadable — treating as stale");
            return LockState::Stale;
        };
        if Self::process_alive(info.pid) {
            LockState::Active(info)
        } else {
            LockState::Stale
        }
    }

    /// Liveness check on the holding PID. The PID-reuse window this
    /// leaves open is acceptable for analyst-triggered pipeline runs.
    #[cfg(unix)]
    fn process_alive(pid: u32) -> bool {
        Path::new(&format!("/proc/{pid}")).exists()
    }

    #[cfg(not(unix))]
    fn process_alive(_pid: u32) -> bool {
        // No /proc to consult — assume the holder is alive and make the
        // operator remove the lock explicitly
        true
    }

    /// Metadata stamped into the lock by this holder.
    pub fn info(&self) -> &RunLockInfo {
        &self.info
    }

    /// Release the lock (called automatically on drop).
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                warn!("Failed to remove lock file: {e}");
            } else {
                debug!(lock_path = %self.lock_path.display(), "Released run lock");
            }
            self.owned = false;
        }
    }

    /// Path to the lock file.
    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
    }

    #[test]
    fn acquire_records_run_metadata() {
        let temp_dir = tempdir().expect("tempdir");
        let lock = RunLock::acquire(temp_dir.path(), "deadbeef", ts()).expect("lock acquired");

        let contents = fs::read_to_string(lock.path()).expect("readable");
        let info: RunLockInfo = serde_json::from_str(&contents).expect("valid JSON payload");
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.config_hash, "deadbeef");
        assert_eq!(info.started_at, ts());
        assert_eq!(lock.info().config_hash, "deadbeef");
    }

    #[test]
    fn second_acquire_reports_the_holder() {
        let temp_dir = tempdir().expect("tempdir");
        let _held = RunLock::acquire(temp_dir.path(), "deadbeef", ts()).expect("first lock");

        let result = RunLock::acquire(
            temp_dir.path(),
            "cafebabe",
            ts() + chrono::Duration::minutes(30),
        );
        match result {
            Err(StorageError::RunInProgress { pid, held_minutes, config_hash }) => {
                assert_eq!(pid, std::process::id());
                assert_eq!(held_minutes, 30);
                assert_eq!(config_hash, "deadbeef"); // the holder's hash, not ours
            }
            other => panic!("expected RunInProgress, got {other:?}"),
        }
    }

    #[test]
    fn lock_released_on_drop() {
        let temp_dir = tempdir().expect("tempdir");
        let lock_path;
        {
            let lock = RunLock::acquire(temp_dir.path(), "deadbeef", ts()).expect("lock acquired");
            lock_path = lock.path().to_path_buf();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
        // Reacquirable after release
        RunLock::acquire(temp_dir.path(), "deadbeef", ts()).expect("reacquired");
    }

    #[test]
    fn dead_holder_is_reclaimed() {
        let temp_dir = tempdir().expect("tempdir");
        let lock_path = temp_dir.path().join(RunLock::LOCK_FILE_NAME);
        let dead = RunLockInfo {
            pid: u32::MAX - 1, // beyond any real PID
            started_at: ts(),
            config_hash: "deadbeef".to_string(),
        };
        fs::write(&lock_path, serde_json::to_vec(&dead).expect("serializes")).expect("written");

        let lock = RunLock::acquire(temp_dir.path(), "cafebabe", ts()).expect("stale lock reclaimed");
        assert_eq!(lock.info().config_hash, "cafebabe");
    }

    #[test]
    fn unreadable_lock_is_reclaimed() {
        let temp_dir = tempdir().expect("tempdir");
        let lock_path = temp_dir.path().join(RunLock::LOCK_FILE_NAME);
        fs::write(&lock_path, "not json at all").expect("written");
        RunLock::acquire(temp_dir.path(), "deadbeef", ts()).expect("unreadable lock reclaimed");
    }
}
