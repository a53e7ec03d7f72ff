//! Identity-merge record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::VesselId;

/// Resolution status of a merge candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeCandidateStatus {
    Pending,
    AutoMerged,
    AnalystMerged,
    Rejected,
}

/// One scored signal inside a merge-candidate breakdown.
///
/// `points` carries the signed contribution; `detail` holds the
/// signal-specific evidence (ratios, flags, port lists).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReason {
    pub points: i32,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl MatchReason {
    pub fn points(points: i32) -> Self {
        Self {
            points,
            detail: Value::Null,
        }
    }

    pub fn with_detail(points: i32, detail: Value) -> Self {
        Self { points, detail }
    }
}

/// Signal-name → reason map. BTreeMap keeps serialization deterministic.
pub type MatchReasons = BTreeMap<String, MatchReason>;

/// A scored (dark vessel, newly-appeared vessel) identity pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub candidate_id: i64,
    pub vessel_a_id: VesselId,
    pub vessel_b_id: VesselId,
    pub vessel_a_last_lat: f64,
    pub vessel_a_last_lon: f64,
    pub vessel_a_last_time: DateTime<Utc>,
    pub vessel_b_first_lat: f64,
    pub vessel_b_first_lon: f64,
    pub vessel_b_first_time: DateTime<Utc>,
    pub distance_nm: f64,
    pub time_delta_hours: f64,
    /// Confidence in [0, 100].
    pub confidence_score: i32,
    pub match_reasons: MatchReasons,
    pub status: MergeCandidateStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl MergeCandidate {
    /// True when the candidate references the given vessel on either side.
    pub fn involves(&self, vessel_id: VesselId) -> bool {
        self.vessel_a_id == vessel_id || self.vessel_b_id == vessel_id
    }

    /// Unordered pair key for dedup.
    pub fn pair_key(&self) -> (VesselId, VesselId) {
        (
            self.vessel_a_id.min(self.vessel_b_id),
            self.vessel_a_id.max(self.vessel_b_id),
        )
    }
}

/// Lifecycle status of an executed merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOperationStatus {
    Completed,
    Reversed,
}

/// Snapshot of everything a merge touched, for reporting and partial undo.
///
/// Reversal limitation: AIS points and simple-FK rows store counts and ID
/// ranges, not per-row PKs — reversal re-creates only the deleted
/// watchlist/STS snapshots. Safe within hours of the merge, before new
/// AIS arrives for the canonical vessel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AffectedRecords {
    /// Absorbed-vessel metadata snapshot.
    pub vessel_snapshot: BTreeMap<String, Value>,
    /// Evidence cards annotated with provenance.
    pub evidence_cards: Vec<i64>,
    pub watchlist_reassigned: i64,
    pub watchlist_conflicts_resolved: i64,
    pub watchlist_deleted_snapshots: Vec<Value>,
    pub sts_reassigned: i64,
    pub sts_self_deleted: i64,
    pub sts_duplicates_resolved: i64,
    pub sts_deleted_snapshots: Vec<Value>,
    pub history_reassigned: i64,
    pub history_duplicates_skipped: i64,
    /// Per-table reassignment counts for simple FK tables.
    pub simple_fk_counts: BTreeMap<String, i64>,
    pub ais_points_reassigned: i64,
    pub ais_point_id_range: Option<(i64, i64)>,
}

/// An executed merge of one vessel identity into another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOperation {
    pub merge_op_id: i64,
    pub candidate_id: Option<i64>,
    pub canonical_vessel_id: VesselId,
    pub absorbed_vessel_id: VesselId,
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    pub status: MergeOperationStatus,
    pub affected_records: AffectedRecords,
}
