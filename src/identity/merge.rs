//! Merge execution and reversal.
//!
//! `execute_merge` reassigns every foreign-key reference from the
//! absorbed vessel to the canonical one, resolves unique-constraint
//! conflicts by policy, snapshots deleted rows for undo, and leaves a
//! complete audit trail.

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use super::{resolve_canonical, MergeError};
use crate::config::defaults::MERGE_AIS_BATCH_SIZE;
use crate::detectors::StepCounts;
use crate::scoring::ScoringConfig;
use crate::store::Store;
use crate::types::{
    AffectedRecords, AuditRecord, MergeCandidateStatus, MergeOperation, MergeOperationStatus,
    StsTransferEvent, VesselHistory, WatchlistEntry,
};

/// Successful merge summary.
#[derive(Debug)]
pub struct MergeOutcome {
    pub merge_op_id: i64,
    pub canonical_vessel_id: i64,
    pub absorbed_vessel_id: i64,
    pub affected: AffectedRecords,
}

/// Merge the absorbed vessel into the canonical vessel.
///
/// Both IDs are resolved to canonical first; the lower ID wins the
/// canonical role for determinism. With `commit = false` the caller
/// owns the commit boundary (batch-merge flows).
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
pub fn execute_merge(
    store: &mut Store,
    scoring: &ScoringConfig,
    canonical_id: i64,
    absorbed_id: i64,
    reason: &str,
    merged_by: &str,
    candidate_id: Option<i64>,
    now: DateTime<Utc>,
    commit: bool,
) -> Result<MergeOutcome, MergeError> {
    let canonical_id = resolve_canonical(store, canonical_id)?;
    let absorbed_id = resolve_canonical(store, absorbed_id)?;
    if canonical_id == absorbed_id {
        return Err(MergeError::SameVessel);
    }

    // Deterministic: lower ID is canonical
    let (canonical_id, absorbed_id) = if canonical_id > absorbed_id {
        (absorbed_id, canonical_id)
    } else {
        (canonical_id, absorbed_id)
    };

    let canonical = store
        .vessel(canonical_id)
        .ok_or(MergeError::VesselNotFound(canonical_id))?;
    if canonical.merged_into.is_some() {
        return Err(MergeError::AlreadyAbsorbed(canonical_id));
    }
    let absorbed = store
        .vessel(absorbed_id)
        .ok_or(MergeError::VesselNotFound(absorbed_id))?
        .clone();
    if absorbed.merged_into.is_some() {
        return Err(MergeError::AlreadyAbsorbed(absorbed_id));
    }
    let canonical_mmsi = canonical.mmsi.clone();

    let mut affected = AffectedRecords::default();
    affected.vessel_snapshot.insert("mmsi".to_string(), json!(absorbed.mmsi));
    affected.vessel_snapshot.insert("name".to_string(), json!(absorbed.name));
    affected.vessel_snapshot.insert("imo".to_string(), json!(absorbed.imo));
    affected.vessel_snapshot.insert("flag".to_string(), json!(absorbed.flag));
    affected
        .vessel_snapshot
        .insert("vessel_type".to_string(), json!(absorbed.vessel_type));
    affected
        .vessel_snapshot
        .insert("deadweight".to_string(), json!(absorbed.deadweight));
    affected
        .vessel_snapshot
        .insert("year_built".to_string(), json!(absorbed.year_built));

    // 1. Annotate evidence cards with provenance (before FK reassignment)
    affected.evidence_cards = annotate_evidence_cards(store, absorbed_id, &absorbed.mmsi);

    // 2. Watchlist with (vessel, source) uniqueness conflicts
    merge_watchlist(store, canonical_id, absorbed_id, &mut affected);

    // 3. STS events: self-STS and duplicate pair+time handling
    merge_sts_events(store, canonical_id, absorbed_id, &mut affected);

    // 4. Vessel history, skipping exact duplicates
    merge_vessel_history(store, canonical_id, absorbed_id, &mut affected);

    // 5. Forward provenance on gap events before FK reassignment (I7):
    // original_vessel_id records which identity produced the gap so
    // frequency scoring is not inflated by the merge.
    for vessel in [absorbed_id, canonical_id] {
        for gap_id in store.gap_ids_for_vessel(vessel) {
            if let Some(gap) = store.gap_mut(gap_id) {
                if gap.original_vessel_id.is_none() {
                    gap.original_vessel_id = Some(vessel);
                }
            }
        }
    }

    // 6. Simple FK tables (no unique constraints): bulk reassign
    reassign_simple_fks(store, canonical_id, absorbed_id, &mut affected);

    // 7. AIS points in ascending-ID batches (I6)
    let mut total_points = 0_i64;
    let mut id_range: Option<(i64, i64)> = None;
    loop {
        let batch = store.reassign_ais_points_batch(absorbed_id, canonical_id, MERGE_AIS_BATCH_SIZE);
        if batch.is_empty() {
            break;
        }
        total_points += batch.len() as i64;
        let (first, last) = (batch[0], batch[batch.len() - 1]);
        id_range = Some(match id_range {
            None => (first, last),
            Some((min_id, _)) => (min_id, last),
        });
    }
    affected.ais_points_reassigned = total_points;
    affected.ais_point_id_range = id_range;

    // 8. Backfill canonical metadata from the absorbed identity
    update_canonical_metadata(store, canonical_id, &absorbed);

    // 9. Record the absorption in vessel history
    let source = if merged_by == "auto" { "auto_merge" } else { "analyst_merge" };
    store.add_history(VesselHistory {
        history_id: 0,
        vessel_id: canonical_id,
        field_changed: "mmsi_absorbed".to_string(),
        old_value: Some(absorbed.mmsi.clone()),
        new_value: Some(canonical_mmsi.clone()),
        observed_at: now,
        source: source.to_string(),
    });

    // 10. Freeze the absorbed identity (I2)
    if let Some(vessel) = store.vessel_mut(absorbed_id) {
        vessel.merged_into = Some(canonical_id);
    }

    // 11. Auto-reject other pending candidates referencing the absorbed
    let mut rejected = 0;
    for other_id in store.merge_candidate_ids() {
        if Some(other_id) == candidate_id {
            continue; // this candidate is being confirmed, not rejected
        }
        let Some(other) = store.merge_candidate(other_id) else { continue };
        if other.status == MergeCandidateStatus::Pending && other.involves(absorbed_id) {
            if let Some(other) = store.merge_candidate_mut(other_id) {
                other.status = MergeCandidateStatus::Rejected;
                other.resolved_at = Some(now);
                other.resolved_by = Some(format!("auto_absorption:{absorbed_id}"));
                rejected += 1;
            }
        }
    }
    if rejected > 0 {
        info!(rejected, absorbed_id, "Auto-rejected stale merge candidates");
    }

    // 12. Persist the operation with its undo snapshot
    let merge_op_id = store.add_merge_operation(MergeOperation {
        merge_op_id: 0,
        candidate_id,
        canonical_vessel_id: canonical_id,
        absorbed_vessel_id: absorbed_id,
        executed_by: merged_by.to_string(),
        executed_at: now,
        status: MergeOperationStatus::Completed,
        affected_records: affected.clone(),
    });

    // 13. Audit trail
    store.append_audit(AuditRecord {
        audit_id: 0,
        action: "vessel_merge".to_string(),
        entity_type: "vessel".to_string(),
        entity_id: canonical_id,
        details: json!({
            "canonical_vessel_id": canonical_id,
            "absorbed_vessel_id": absorbed_id,
            "absorbed_mmsi": absorbed.mmsi,
            "reason": reason,
            "merge_op_id": merge_op_id,
        }),
        user_agent: None,
        ip_address: None,
        created_at: now,
    });

    if commit {
        store.commit("merge_execution");
    }

    // 14. Rescore the canonical vessel's gap events
    crate::scoring::rescore_vessel(store, scoring, canonical_id, now);
    if commit {
        store.commit("merge_rescore");
    }

    info!(
        absorbed_id,
        absorbed_mmsi = %absorbed.mmsi,
        canonical_id,
        canonical_mmsi = %canonical_mmsi,
        merge_op_id,
        "Merged vessel identities"
    );

    Ok(MergeOutcome {
        merge_op_id,
        canonical_vessel_id: canonical_id,
        absorbed_vessel_id: absorbed_id,
        affected,
    })
}

fn annotate_evidence_cards(store: &mut Store, absorbed_id: i64, absorbed_mmsi: &str) -> Vec<i64> {
    let gap_ids = store.gap_ids_for_vessel(absorbed_id);
    if gap_ids.is_empty() {
        return Vec::new();
    }
    let card_ids = store.evidence_cards_for_gaps(&gap_ids);
    for card_id in &card_ids {
        if let Some(card) = store.evidence_card_mut(*card_id) {
            card.original_vessel_id = Some(absorbed_id);
            card.original_mmsi = Some(absorbed_mmsi.to_string());
        }
    }
    card_ids
}

fn merge_watchlist(
    store: &mut Store,
    canonical_id: i64,
    absorbed_id: i64,
    affected: &mut AffectedRecords,
) {
    for entry_id in store.watchlist_entry_ids_for_vessel(absorbed_id) {
        let Some(entry) = store.watchlist_entry(entry_id).cloned() else { continue };
        match store.watchlist_entry_for(canonical_id, &entry.source) {
            Some(conflict_id) => {
                // Keep the higher match confidence
                if let Some(conflict) = store.watchlist_entry_mut(conflict_id) {
                    if entry.match_confidence > conflict.match_confidence {
                        conflict.match_confidence = entry.match_confidence;
                        conflict.reason = entry.reason.clone();
                    }
                }
                affected.watchlist_deleted_snapshots.push(json!({
                    "entry_id": entry.entry_id,
                    "source": entry.source,
                    "reason": entry.reason,
                    "match_confidence": entry.match_confidence,
                    "match_type": entry.match_type,
                }));
                store.remove_watchlist_entry(entry_id);
                affected.watchlist_conflicts_resolved += 1;
            }
            None => {
                if let Some(entry) = store.watchlist_entry_mut(entry_id) {
                    entry.vessel_id = canonical_id;
                }
                affected.watchlist_reassigned += 1;
            }
        }
    }
}

fn merge_sts_events(
    store: &mut Store,
    canonical_id: i64,
    absorbed_id: i64,
    affected: &mut AffectedRecords,
) {
    for sts_id in store.sts_ids_involving(absorbed_id) {
        let Some(sts) = store.sts(sts_id).cloned() else { continue };
        let new_v1 = if sts.vessel_1_id == absorbed_id { canonical_id } else { sts.vessel_1_id };
        let new_v2 = if sts.vessel_2_id == absorbed_id { canonical_id } else { sts.vessel_2_id };

        // Self-STS after reassignment: absorbed had an event with canonical
        if new_v1 == new_v2 {
            affected.sts_deleted_snapshots.push(sts_snapshot(&sts, "self_sts"));
            store.remove_sts(sts_id);
            affected.sts_self_deleted += 1;
            continue;
        }

        match store.sts_duplicate_of(sts_id, new_v1, new_v2, sts.start_time) {
            Some(existing_id) => {
                // Keep the higher component on the survivor
                if let Some(existing) = store.sts_mut(existing_id) {
                    if sts.risk_score_component > existing.risk_score_component {
                        existing.risk_score_component = sts.risk_score_component;
                    }
                }
                affected.sts_deleted_snapshots.push(sts_snapshot(&sts, "duplicate"));
                store.remove_sts(sts_id);
                affected.sts_duplicates_resolved += 1;
            }
            None => {
                if let Some(event) = store.sts_mut(sts_id) {
                    event.vessel_1_id = new_v1.min(new_v2);
                    event.vessel_2_id = new_v1.max(new_v2);
                }
                affected.sts_reassigned += 1;
            }
        }
    }
}

fn sts_snapshot(sts: &StsTransferEvent, kind: &str) -> serde_json::Value {
    json!({
        "sts_id": sts.sts_id,
        "vessel_1_id": sts.vessel_1_id,
        "vessel_2_id": sts.vessel_2_id,
        "detection_type": sts.detection_type,
        "start_time": sts.start_time,
        "end_time": sts.end_time,
        "duration_minutes": sts.duration_minutes,
        "mean_proximity_meters": sts.mean_proximity_meters,
        "risk_score_component": sts.risk_score_component,
        "type": kind,
    })
}

fn merge_vessel_history(
    store: &mut Store,
    canonical_id: i64,
    absorbed_id: i64,
    affected: &mut AffectedRecords,
) {
    for history_id in store.history_ids_for_vessel(absorbed_id) {
        let Some(entry) = store.history_entry(history_id).cloned() else { continue };
        if store.history_duplicate_exists(canonical_id, &entry) {
            affected.history_duplicates_skipped += 1;
            continue;
        }
        if let Some(entry) = store.history_mut(history_id) {
            entry.vessel_id = canonical_id;
        }
        affected.history_reassigned += 1;
    }
}

fn reassign_simple_fks(
    store: &mut Store,
    canonical_id: i64,
    absorbed_id: i64,
    affected: &mut AffectedRecords,
) {
    let mut count = 0_i64;
    for gap_id in store.gap_ids_for_vessel(absorbed_id) {
        if let Some(gap) = store.gap_mut(gap_id) {
            gap.vessel_id = canonical_id;
            count += 1;
        }
    }
    affected.simple_fk_counts.insert("gap_events".to_string(), count);

    let mut count = 0_i64;
    for anomaly_id in store.anomaly_ids() {
        let matches = store.anomaly(anomaly_id).is_some_and(|a| a.vessel_id == absorbed_id);
        if matches {
            if let Some(anomaly) = store.anomaly_mut(anomaly_id) {
                anomaly.vessel_id = canonical_id;
                count += 1;
            }
        }
    }
    affected.simple_fk_counts.insert("spoofing_anomalies".to_string(), count);

    let mut count = 0_i64;
    for loiter_id in store.loiter_ids() {
        let matches = store.loiter(loiter_id).is_some_and(|l| l.vessel_id == absorbed_id);
        if matches {
            if let Some(loiter) = store.loiter_mut(loiter_id) {
                loiter.vessel_id = canonical_id;
                count += 1;
            }
        }
    }
    affected.simple_fk_counts.insert("loitering_events".to_string(), count);

    let mut count = 0_i64;
    for call_id in store.port_call_ids_for_vessel(absorbed_id) {
        if let Some(call) = store.port_call_mut(call_id) {
            call.vessel_id = canonical_id;
            count += 1;
        }
    }
    affected.simple_fk_counts.insert("port_calls".to_string(), count);

    let mut count = 0_i64;
    for owner_id in store.owner_ids_for_vessel(absorbed_id) {
        if let Some(owner) = store.vessel_owner_mut(owner_id) {
            owner.vessel_id = canonical_id;
            count += 1;
        }
    }
    affected.simple_fk_counts.insert("vessel_owners".to_string(), count);

    let mut count = 0_i64;
    for detection_id in store.dark_detection_ids_matched_to(absorbed_id) {
        if let Some(detection) = store.dark_detection_mut(detection_id) {
            detection.matched_vessel_id = Some(canonical_id);
            count += 1;
        }
    }
    affected
        .simple_fk_counts
        .insert("dark_vessel_detections".to_string(), count);
}

fn update_canonical_metadata(store: &mut Store, canonical_id: i64, absorbed: &crate::types::Vessel) {
    let Some(canonical) = store.vessel_mut(canonical_id) else {
        return;
    };
    // Keep the earliest first-seen timestamp
    if let Some(absorbed_fs) = absorbed.mmsi_first_seen {
        canonical.mmsi_first_seen = Some(match canonical.mmsi_first_seen {
            Some(existing) => existing.min(absorbed_fs),
            None => absorbed_fs,
        });
    }
    if canonical.imo.is_none() {
        canonical.imo = absorbed.imo.clone();
    }
    if canonical.deadweight.is_none() {
        canonical.deadweight = absorbed.deadweight;
    }
    if canonical.year_built.is_none() {
        canonical.year_built = absorbed.year_built;
    }
    if canonical.owner_name.is_none() {
        canonical.owner_name = absorbed.owner_name.clone();
    }
}

/// Reverse a completed merge using the affected-records snapshot.
///
/// Best-effort: re-creates the deleted watchlist and STS snapshots,
/// removes the absorption history record, clears evidence provenance
/// and reactivates the absorbed vessel. AIS points and simple-FK rows
/// are NOT reassigned back — the snapshot stores counts, not per-row
/// IDs. Safe only within hours of the merge, before new AIS arrives
/// for the canonical vessel.
pub fn reverse_merge(
    store: &mut Store,
    scoring: &ScoringConfig,
    merge_op_id: i64,
    now: DateTime<Utc>,
) -> Result<StepCounts, MergeError> {
    let op = store
        .merge_operation(merge_op_id)
        .ok_or(MergeError::OperationNotFound(merge_op_id))?
        .clone();
    if op.status == MergeOperationStatus::Reversed {
        return Err(MergeError::AlreadyReversed(merge_op_id));
    }

    let canonical_id = op.canonical_vessel_id;
    let absorbed_id = op.absorbed_vessel_id;
    let affected = &op.affected_records;

    // 1. Reactivate the absorbed vessel
    store
        .vessel_mut(absorbed_id)
        .ok_or(MergeError::VesselNotFound(absorbed_id))?
        .merged_into = None;

    if affected.ais_points_reassigned > 0 {
        tracing::warn!(
            merge_op_id,
            count = affected.ais_points_reassigned,
            "Reverse merge: AIS points NOT reassigned back (PK list not stored)"
        );
    }

    // 2. Re-create deleted watchlist entries
    let mut watchlist_restored = 0_i64;
    for snapshot in &affected.watchlist_deleted_snapshots {
        store.add_watchlist_entry(WatchlistEntry {
            entry_id: 0,
            vessel_id: absorbed_id,
            source: snapshot
                .get("source")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            reason: snapshot.get("reason").and_then(|v| v.as_str()).map(String::from),
            date_listed: None,
            source_url: None,
            is_active: true,
            match_confidence: snapshot
                .get("match_confidence")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0) as i32,
            match_type: snapshot
                .get("match_type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        });
        watchlist_restored += 1;
    }

    // 3. Re-create deleted STS events
    let mut sts_restored = 0_i64;
    for snapshot in &affected.sts_deleted_snapshots {
        let (Some(v1), Some(v2)) = (
            snapshot.get("vessel_1_id").and_then(serde_json::Value::as_i64),
            snapshot.get("vessel_2_id").and_then(serde_json::Value::as_i64),
        ) else {
            continue;
        };
        let start = snapshot
            .get("start_time")
            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok());
        let end = snapshot
            .get("end_time")
            .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v.clone()).ok());
        let (Some(start), Some(end)) = (start, end) else { continue };
        store.add_sts(StsTransferEvent {
            sts_id: 0,
            vessel_1_id: v1.min(v2),
            vessel_2_id: v1.max(v2),
            detection_type: snapshot
                .get("detection_type")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or(crate::types::StsDetectionType::VisibleVisible),
            start_time: start,
            end_time: end,
            duration_minutes: snapshot
                .get("duration_minutes")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0),
            mean_proximity_meters: snapshot
                .get("mean_proximity_meters")
                .and_then(serde_json::Value::as_f64),
            mean_lat: None,
            mean_lon: None,
            corridor_id: None,
            eta_minutes: None,
            risk_score_component: snapshot
                .get("risk_score_component")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0) as i32,
            source: "restored".to_string(),
        });
        sts_restored += 1;
    }

    // 4. Remove the absorption history record
    let absorbed_mmsi = affected
        .vessel_snapshot
        .get("mmsi")
        .and_then(|v| v.as_str())
        .map(String::from);
    let to_remove: Vec<i64> = store
        .history_for_vessel(canonical_id)
        .iter()
        .filter(|h| {
            h.field_changed == "mmsi_absorbed" && h.old_value == absorbed_mmsi
        })
        .map(|h| h.history_id)
        .collect();
    for history_id in to_remove {
        store.remove_history(history_id);
    }

    // 5. Clear evidence-card provenance
    for card_id in &affected.evidence_cards {
        if let Some(card) = store.evidence_card_mut(*card_id) {
            card.original_vessel_id = None;
            card.original_mmsi = None;
        }
    }

    // 6. Mark the operation reversed
    if let Some(op) = store.merge_operation_mut(merge_op_id) {
        op.status = MergeOperationStatus::Reversed;
    }

    // 7. Reset the candidate to pending
    if let Some(candidate_id) = op.candidate_id {
        if let Some(candidate) = store.merge_candidate_mut(candidate_id) {
            candidate.status = MergeCandidateStatus::Pending;
            candidate.resolved_at = None;
            candidate.resolved_by = None;
        }
    }

    // 8. Audit trail
    store.append_audit(AuditRecord {
        audit_id: 0,
        action: "vessel_merge_reversed".to_string(),
        entity_type: "vessel".to_string(),
        entity_id: canonical_id,
        details: json!({
            "merge_op_id": merge_op_id,
            "canonical_vessel_id": canonical_id,
            "absorbed_vessel_id": absorbed_id,
        }),
        user_agent: None,
        ip_address: None,
        created_at: now,
    });
    store.commit("merge_reversal");

    // 9. Rescore both sides
    crate::scoring::rescore_vessel(store, scoring, canonical_id, now);
    crate::scoring::rescore_vessel(store, scoring, absorbed_id, now);

    info!(merge_op_id, "Reversed merge operation");
    let mut counts = StepCounts::new();
    counts.insert("watchlist_restored".to_string(), watchlist_restored);
    counts.insert("sts_restored".to_string(), sts_restored);
    Ok(counts)
}
