//! Merge-candidate detection and confidence scoring.
//!
//! A "went dark" vessel (has gap events, silent for > 2 h) paired with a
//! "newly appeared" MMSI is scored on speed feasibility plus identity
//! signals. Candidates at or above the auto threshold merge
//! immediately; the rest persist for analyst review.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;

use super::{execute_merge, validate_imo_checksum};
use super::imo::{is_suspicious_mid, mmsi_to_flag, RUSSIAN_ORIGIN_FLAGS};
use crate::config::defaults::{ANCHORAGE_DENSITY_THRESHOLD, OVERLAP_BUCKET_SECONDS};
use crate::config::Settings;
use crate::detectors::StepCounts;
use crate::geo::{haversine_nm, parse_wkt_point};
use crate::store::Store;
use crate::types::{
    MatchReason, MatchReasons, MergeCandidate, MergeCandidateStatus, SpoofingType,
};

/// Endpoint snapshot of a vessel's track for candidate scoring.
#[derive(Debug, Clone, Copy)]
pub struct TrackEndpoint {
    pub lat: f64,
    pub lon: f64,
    pub ts: DateTime<Utc>,
}

/// Find potential same-vessel pairs across MMSI changes.
///
/// Returns `{candidates_created, auto_merged, skipped}`.
pub fn detect_merge_candidates(
    store: &mut Store,
    settings: &Settings,
    scoring: &crate::scoring::ScoringConfig,
    now: DateTime<Utc>,
) -> StepCounts {
    let max_gap_days = settings.merge.max_gap_days;
    let max_speed = settings.merge.max_speed_kn;
    let auto_threshold = settings.merge.auto_confidence_threshold;
    let min_threshold = settings.merge.candidate_min_confidence;
    let cutoff = now - Duration::days(max_gap_days);

    let mut counts = StepCounts::new();
    let mut candidates_created = 0_i64;
    let mut auto_merged = 0_i64;
    let mut skipped = 0_i64;

    let dark_vessels = find_dark_vessels(store, now - Duration::hours(2));
    let new_vessels = find_new_vessels(store, cutoff);

    if dark_vessels.is_empty() || new_vessels.is_empty() {
        counts.insert("candidates_created".to_string(), 0);
        counts.insert("auto_merged".to_string(), 0);
        counts.insert("skipped".to_string(), 0);
        return counts;
    }

    // Deterministic lexicographic order: lower vessel IDs first on both
    // sides, so the auto-merge decision is reproducible.
    for (dark_id, dark_last) in &dark_vessels {
        for (new_id, new_first) in &new_vessels {
            if dark_id == new_id {
                continue;
            }
            if store.merge_candidate_for_pair(*dark_id, *new_id).is_some() {
                continue;
            }

            // Speed feasibility
            let time_delta_h = (new_first.ts - dark_last.ts).num_seconds() as f64 / 3600.0;
            if time_delta_h <= 0.0 || time_delta_h > (max_gap_days * 24) as f64 {
                continue;
            }
            let distance = haversine_nm(dark_last.lat, dark_last.lon, new_first.lat, new_first.lon);
            let max_travel = time_delta_h * max_speed;
            if distance > max_travel {
                continue;
            }

            let (confidence, reasons) = score_candidate(
                store,
                settings,
                *dark_id,
                *new_id,
                dark_last,
                new_first,
                distance,
                time_delta_h,
                max_travel,
            );

            if confidence < min_threshold {
                skipped += 1;
                continue;
            }

            let auto = confidence >= auto_threshold;
            let candidate_id = store.add_merge_candidate(MergeCandidate {
                candidate_id: 0,
                vessel_a_id: *dark_id,
                vessel_b_id: *new_id,
                vessel_a_last_lat: dark_last.lat,
                vessel_a_last_lon: dark_last.lon,
                vessel_a_last_time: dark_last.ts,
                vessel_b_first_lat: new_first.lat,
                vessel_b_first_lon: new_first.lon,
                vessel_b_first_time: new_first.ts,
                distance_nm: (distance * 100.0).round() / 100.0,
                time_delta_hours: (time_delta_h * 100.0).round() / 100.0,
                confidence_score: confidence,
                match_reasons: reasons,
                status: if auto {
                    MergeCandidateStatus::AutoMerged
                } else {
                    MergeCandidateStatus::Pending
                },
                resolved_at: auto.then_some(now),
                resolved_by: auto.then(|| "auto".to_string()),
            });
            candidates_created += 1;

            if auto {
                // Lower vessel ID is canonical
                let canonical_id = (*dark_id).min(*new_id);
                let absorbed_id = (*dark_id).max(*new_id);
                let result = execute_merge(
                    store,
                    scoring,
                    canonical_id,
                    absorbed_id,
                    &format!("Auto-merge: confidence {confidence}"),
                    "auto",
                    Some(candidate_id),
                    now,
                    true,
                );
                if result.is_ok() {
                    auto_merged += 1;
                }
            }
        }
    }
    store.commit("merge_candidate_detection");

    info!(candidates_created, auto_merged, skipped, "Merge candidate detection complete");
    counts.insert("candidates_created".to_string(), candidates_created);
    counts.insert("auto_merged".to_string(), auto_merged);
    counts.insert("skipped".to_string(), skipped);
    counts
}

/// Canonical vessels with gap events whose last transmission predates
/// the cutoff, with their final track position. Ascending vessel ID.
fn find_dark_vessels(store: &Store, cutoff: DateTime<Utc>) -> Vec<(i64, TrackEndpoint)> {
    store
        .canonical_vessel_ids()
        .into_iter()
        .filter(|id| !store.gaps_for_vessel(*id).is_empty())
        .filter_map(|id| {
            let last = store.last_point_for_vessel(id)?;
            (last.timestamp < cutoff).then(|| {
                (
                    id,
                    TrackEndpoint {
                        lat: last.lat,
                        lon: last.lon,
                        ts: last.timestamp,
                    },
                )
            })
        })
        .collect()
}

/// Canonical vessels first seen after the cutoff, with their first
/// track position. Ascending vessel ID.
fn find_new_vessels(store: &Store, cutoff: DateTime<Utc>) -> Vec<(i64, TrackEndpoint)> {
    store
        .canonical_vessel_ids()
        .into_iter()
        .filter(|id| {
            store
                .vessel(*id)
                .and_then(|v| v.mmsi_first_seen)
                .is_some_and(|fs| fs >= cutoff)
        })
        .filter_map(|id| {
            let first = store.first_point_for_vessel(id)?;
            Some((
                id,
                TrackEndpoint {
                    lat: first.lat,
                    lon: first.lon,
                    ts: first.timestamp,
                },
            ))
        })
        .collect()
}

/// True when the vessel transmitted near a Russian oil terminal within
/// the trailing window before `before`.
pub fn had_russian_port_call(
    store: &Store,
    vessel_id: i64,
    before: DateTime<Utc>,
    days: i64,
) -> bool {
    let terminals: Vec<(f64, f64)> = store
        .russian_oil_terminals()
        .iter()
        .filter_map(|p| parse_wkt_point(&p.geometry))
        .collect();
    if terminals.is_empty() {
        return false;
    }
    let window_start = before - Duration::days(days);
    store
        .points_for_vessel_between(vessel_id, window_start, before)
        .iter()
        .any(|pt| {
            terminals
                .iter()
                .any(|(lat, lon)| haversine_nm(pt.lat, pt.lon, *lat, *lon) <= 5.0)
        })
}

/// Check whether two vessels ever transmitted within the same one-hour
/// bucket. Shared buckets mean two physical hulls (I8).
pub fn has_overlapping_ais(store: &Store, vessel_a: i64, vessel_b: i64) -> bool {
    let a = store.transmission_buckets(vessel_a, OVERLAP_BUCKET_SECONDS);
    if a.is_empty() {
        return false;
    }
    let b = store.transmission_buckets(vessel_b, OVERLAP_BUCKET_SECONDS);
    a.intersection(&b).next().is_some()
}

/// Score a merge candidate. Returns (confidence 0-100, reasons map).
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
pub fn score_candidate(
    store: &Store,
    settings: &Settings,
    dark_id: i64,
    new_id: i64,
    dark_last: &TrackEndpoint,
    new_first: &TrackEndpoint,
    distance: f64,
    time_delta_h: f64,
    max_travel: f64,
) -> (i32, MatchReasons) {
    let mut reasons = MatchReasons::new();
    let mut score = 0_i32;

    let Some(dark) = store.vessel(dark_id) else {
        return (0, reasons);
    };
    let Some(new) = store.vessel(new_id) else {
        return (0, reasons);
    };

    // Proximity ratio: 0-20
    let prox_ratio = if max_travel > 0.0 {
        1.0 - distance / max_travel
    } else {
        0.0
    };
    let prox_pts = (prox_ratio * 20.0) as i32;
    score += prox_pts;
    reasons.insert(
        "proximity_ratio".to_string(),
        MatchReason::with_detail(prox_pts, json!({"ratio": (prox_ratio * 1000.0).round() / 1000.0})),
    );

    // Time tightness: 0-10 (shorter gap = higher)
    let time_pts = ((10.0 - time_delta_h / 24.0) as i32).max(0);
    score += time_pts;
    reasons.insert(
        "time_tightness".to_string(),
        MatchReason::with_detail(time_pts, json!({"hours": (time_delta_h * 10.0).round() / 10.0})),
    );

    // Same IMO (validated)
    if let (Some(dark_imo), Some(new_imo)) = (&dark.imo, &new.imo) {
        if dark_imo == new_imo && validate_imo_checksum(dark_imo) {
            score += 25;
            reasons.insert(
                "same_imo".to_string(),
                MatchReason::with_detail(25, json!({"imo": dark_imo})),
            );
        }
    }

    // Same vessel type
    let same_type = matches!(
        (&dark.vessel_type, &new.vessel_type),
        (Some(a), Some(b)) if a == b
    );
    if same_type {
        score += 10;
        reasons.insert("same_vessel_type".to_string(), MatchReason::points(10));
    }

    // Similar DWT (within ±20%)
    let dwt_ratio = match (dark.deadweight, new.deadweight) {
        (Some(a), Some(b)) if a > 0.0 && b > 0.0 => Some(a.min(b) / a.max(b)),
        _ => None,
    };
    let similar_dwt = dwt_ratio.is_some_and(|r| r >= 0.8);
    if let Some(ratio) = dwt_ratio.filter(|r| *r >= 0.8) {
        score += 10;
        reasons.insert(
            "similar_dwt".to_string(),
            MatchReason::with_detail(10, json!({"ratio": (ratio * 1000.0).round() / 1000.0})),
        );
    }

    // Similar year built (within ±3)
    let similar_year = matches!(
        (dark.year_built, new.year_built),
        (Some(a), Some(b)) if (a - b).abs() <= 3
    );
    if similar_year {
        score += 5;
        reasons.insert("similar_year_built".to_string(), MatchReason::points(5));
    }

    // Dark vessel silent after the new identity appeared
    if store.count_points_after(dark_id, new_first.ts) == 0 {
        score += 10;
        reasons.insert("dark_vessel_silent".to_string(), MatchReason::points(10));
    }

    // New MMSI with an unallocated MID
    if is_suspicious_mid(&new.mmsi) {
        score += 5;
        reasons.insert("suspicious_mid".to_string(), MatchReason::points(5));
    }

    // Russian-origin flag on the new identity
    let new_flag = mmsi_to_flag(&new.mmsi);
    if let Some(flag) = new_flag.filter(|f| RUSSIAN_ORIGIN_FLAGS.contains(f)) {
        score += 5;
        reasons.insert(
            "ru_origin_flag".to_string(),
            MatchReason::with_detail(5, json!({"flag": flag})),
        );
    }

    // Flag change between the MIDs
    let dark_flag = mmsi_to_flag(&dark.mmsi);
    if let (Some(from), Some(to)) = (dark_flag, new_flag) {
        if from != to {
            score += 5;
            reasons.insert(
                "flag_change".to_string(),
                MatchReason::with_detail(5, json!({"from": from, "to": to})),
            );
        }
    }

    // Dark vessel visited a Russian terminal before going dark
    if had_russian_port_call(store, dark_id, dark_last.ts, 30) {
        score += 10;
        reasons.insert("russian_port_call".to_string(), MatchReason::points(10));
    }

    // ISM / P&I continuity (opt-in)
    if settings.features.ism_continuity_scoring_enabled {
        score += score_ism_continuity(store, dark_id, new_id, &mut reasons);
    }

    // --- Negative signals (anti-merge evidence) ---

    // DWT mismatch (> 30% difference)
    if let Some(ratio) = dwt_ratio.filter(|r| *r < 0.7) {
        score = (score - 15).max(0);
        reasons.insert(
            "dwt_mismatch".to_string(),
            MatchReason::with_detail(-15, json!({"ratio": (ratio * 1000.0).round() / 1000.0})),
        );
    }

    // Different non-null vessel types: active penalty
    if let (Some(a), Some(b)) = (&dark.vessel_type, &new.vessel_type) {
        if a != b {
            score = (score - 10).max(0);
            reasons.insert(
                "vessel_type_mismatch".to_string(),
                MatchReason::with_detail(-10, json!({"dark": a, "new": b})),
            );
        }
    }

    // Conflicting port calls during the silence window
    score += score_conflicting_port_calls(store, dark_id, new_id, dark_last.ts, new_first.ts, &mut reasons, score);

    // Hard guard: overlapping transmissions block the merge entirely.
    if has_overlapping_ais(store, dark_id, new_id) {
        reasons.insert(
            "overlapping_ais_tracks".to_string(),
            MatchReason::with_detail(0, json!({"blocked": true})),
        );
        return (0, reasons);
    }

    // Anchorage density: busy STS areas demand stronger evidence
    let density = store.count_vessels_near(new_first.lat, new_first.lon, new_first.ts, 5.0, 6);
    if density > ANCHORAGE_DENSITY_THRESHOLD {
        let has_strong_match = reasons.contains_key("same_imo");
        let has_triple_match = similar_dwt && same_type && similar_year;
        if !has_strong_match {
            let penalty = if has_triple_match { -10 } else { -20 };
            score = (score + penalty).max(0);
            reasons.insert(
                "anchorage_density_penalty".to_string(),
                MatchReason::with_detail(
                    penalty,
                    json!({
                        "nearby_vessels": density,
                        "triple_match_reduced": has_triple_match,
                    }),
                ),
            );
        }
    }

    // IMO fraud cross-check: a dominant IMO signal tainted by prior
    // fraud anomalies caps below the auto threshold for manual review.
    if score > 0 {
        if let Some(imo_reason) = reasons.get("same_imo") {
            let imo_pts = imo_reason.points;
            if f64::from(imo_pts) / f64::from(score) > 0.25 {
                let imo_val = dark.imo.clone().unwrap_or_default();
                let fraud_count = count_imo_fraud_anomalies(store, &imo_val, dark_id, new_id);
                if fraud_count > 0 {
                    let auto_threshold = settings.merge.auto_confidence_threshold;
                    if score >= auto_threshold {
                        score = auto_threshold - 1;
                    }
                    reasons.insert(
                        "imo_fraud_flag".to_string(),
                        MatchReason::with_detail(
                            0,
                            json!({
                                "capped": true,
                                "prior_fraud_anomalies": fraud_count,
                                "imo": imo_val,
                            }),
                        ),
                    );
                }
            }
        }
    }

    (score.clamp(0, 100), reasons)
}

fn score_ism_continuity(
    store: &Store,
    dark_id: i64,
    new_id: i64,
    reasons: &mut MatchReasons,
) -> i32 {
    let (Some(dark_owner), Some(new_owner)) =
        (store.owner_for_vessel(dark_id), store.owner_for_vessel(new_id))
    else {
        return 0;
    };
    let mut bonus = 0;

    let norm = |s: &Option<String>| s.as_deref().unwrap_or("").trim().to_uppercase();
    let dark_ism = norm(&dark_owner.ism_manager);
    let new_ism = norm(&new_owner.ism_manager);
    if !dark_ism.is_empty() && dark_ism == new_ism {
        bonus += 10;
        reasons.insert(
            "shared_ism_manager".to_string(),
            MatchReason::with_detail(10, json!({"ism_manager": dark_ism})),
        );
    }
    let dark_pi = norm(&dark_owner.pi_club_name);
    let new_pi = norm(&new_owner.pi_club_name);
    if !dark_pi.is_empty() && dark_pi == new_pi {
        bonus += 10;
        reasons.insert(
            "shared_pi_club".to_string(),
            MatchReason::with_detail(10, json!({"pi_club": dark_pi})),
        );
    }
    bonus
}

/// Port visits at disjoint ports during the silence window are strong
/// anti-evidence: a hull cannot be in two harbours.
#[allow(clippy::too_many_arguments)]
fn score_conflicting_port_calls(
    store: &Store,
    dark_id: i64,
    new_id: i64,
    gap_start: DateTime<Utc>,
    gap_end: DateTime<Utc>,
    reasons: &mut MatchReasons,
    current_score: i32,
) -> i32 {
    let port_ids = |vessel_id: i64| -> std::collections::BTreeSet<i64> {
        store
            .port_calls_for_vessel(vessel_id)
            .iter()
            .filter(|c| c.arrival >= gap_start && c.arrival <= gap_end)
            .filter_map(|c| c.port_id)
            .collect()
    };
    let dark_ports = port_ids(dark_id);
    let new_ports = port_ids(new_id);
    let conflicting: Vec<i64> = dark_ports.difference(&new_ports).copied().collect();

    if dark_ports.is_empty() || new_ports.is_empty() || conflicting.is_empty() {
        return 0;
    }
    let penalty = (conflicting.len() as i32 * -15).min(-45);
    reasons.insert(
        "conflicting_port_calls".to_string(),
        MatchReason::with_detail(
            penalty,
            json!({
                "dark_ports": dark_ports.iter().collect::<Vec<_>>(),
                "new_ports": new_ports.iter().collect::<Vec<_>>(),
            }),
        ),
    );
    // Clamp so the running total never goes negative
    penalty.max(-current_score)
}

/// Count prior IMO-fraud anomalies referencing the IMO or either vessel.
fn count_imo_fraud_anomalies(store: &Store, imo: &str, dark_id: i64, new_id: i64) -> usize {
    let by_imo = store
        .anomalies_of_type(SpoofingType::ImoFraud)
        .iter()
        .filter(|a| a.evidence.get("imo").and_then(|v| v.as_str()) == Some(imo))
        .count();
    if by_imo > 0 {
        return by_imo;
    }
    store
        .anomalies_of_type(SpoofingType::ImoFraud)
        .iter()
        .filter(|a| a.vessel_id == dark_id || a.vessel_id == new_id)
        .count()
}

/// Post-merge recheck (pipeline step after the IMO fraud sweep): flag
/// auto-merges whose dominant signal was an IMO now tainted by fraud
/// anomalies created this run.
///
/// Never auto-reverses (destructive); creates a warning anomaly for
/// analyst review instead.
pub fn recheck_merges_for_imo_fraud(
    store: &mut Store,
    pipeline_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    let mut checked = 0_i64;
    let mut flagged = 0_i64;

    let recent_frauds: Vec<(i64, Option<String>)> = store
        .anomalies_of_type(SpoofingType::ImoFraud)
        .iter()
        .filter(|a| a.created_at >= pipeline_start)
        .map(|a| {
            (
                a.vessel_id,
                a.evidence.get("imo").and_then(|v| v.as_str()).map(String::from),
            )
        })
        .collect();
    if recent_frauds.is_empty() {
        counts.insert("checked".to_string(), 0);
        counts.insert("flagged".to_string(), 0);
        return counts;
    }
    let fraud_vessels: std::collections::BTreeSet<i64> =
        recent_frauds.iter().map(|(v, _)| *v).collect();
    let fraud_imos: std::collections::BTreeSet<String> =
        recent_frauds.iter().filter_map(|(_, imo)| imo.clone()).collect();

    struct Flagged {
        canonical_id: i64,
        candidate_id: i64,
        imo: String,
        vessels: (i64, i64),
    }
    let mut to_flag: Vec<Flagged> = Vec::new();

    for candidate_id in store.merge_candidate_ids() {
        let Some(candidate) = store.merge_candidate(candidate_id) else { continue };
        if candidate.status != MergeCandidateStatus::AutoMerged {
            continue;
        }
        checked += 1;

        let Some(imo_reason) = candidate.match_reasons.get("same_imo") else {
            continue;
        };
        let total = candidate.confidence_score.max(1);
        if f64::from(imo_reason.points) / f64::from(total) <= 0.25 {
            continue;
        }

        let cand_imo = imo_reason
            .detail
            .get("imo")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let involved = fraud_vessels.contains(&candidate.vessel_a_id)
            || fraud_vessels.contains(&candidate.vessel_b_id);
        if !fraud_imos.contains(&cand_imo) && !involved {
            continue;
        }

        to_flag.push(Flagged {
            canonical_id: candidate.vessel_a_id.min(candidate.vessel_b_id),
            candidate_id,
            imo: cand_imo,
            vessels: (candidate.vessel_a_id, candidate.vessel_b_id),
        });
    }

    for f in to_flag {
        let already = store
            .anomalies_for_vessel(f.canonical_id)
            .iter()
            .any(|a| {
                a.anomaly_type == SpoofingType::ImoFraud
                    && a.evidence.get("subtype").and_then(|v| v.as_str())
                        == Some("post_merge_imo_fraud")
            });
        if already {
            continue;
        }
        store.add_anomaly(crate::types::SpoofingAnomaly {
            anomaly_id: 0,
            vessel_id: f.canonical_id,
            anomaly_type: SpoofingType::ImoFraud,
            start_time: now,
            end_time: now,
            implied_speed_kn: None,
            risk_score_component: 0,
            evidence: json!({
                "subtype": "post_merge_imo_fraud",
                "candidate_id": f.candidate_id,
                "imo": f.imo,
                "merged_vessels": [f.vessels.0, f.vessels.1],
            }),
            gap_event_id: None,
            created_at: now,
        });
        flagged += 1;
        tracing::warn!(
            candidate_id = f.candidate_id,
            imo = %f.imo,
            "Auto-merge may involve a fraudulent IMO — manual review recommended"
        );
    }
    store.commit("imo_fraud_merge_recheck");

    info!(checked, flagged, "IMO fraud merge recheck complete");
    counts.insert("checked".to_string(), checked);
    counts.insert("flagged".to_string(), flagged);
    counts
}

/// Extended merge pass: revisit pending candidates with
/// fingerprint-similarity bonuses and auto-merge any that now clear the
/// threshold. Gated by `features.fingerprinting_enabled`.
pub fn run_extended_merge_pass(
    store: &mut Store,
    settings: &Settings,
    scoring: &crate::scoring::ScoringConfig,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.fingerprinting_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let auto_threshold = settings.merge.auto_confidence_threshold;
    let mut upgraded = 0_i64;
    let mut merged = 0_i64;

    for candidate_id in store.merge_candidate_ids() {
        let Some(candidate) = store.merge_candidate(candidate_id) else { continue };
        if candidate.status != MergeCandidateStatus::Pending {
            continue;
        }
        // The overlap guard is final — a blocked pair never upgrades
        if candidate.match_reasons.contains_key("overlapping_ais_tracks") {
            continue;
        }
        // An IMO-fraud cap is a deliberate hold for analyst review
        if candidate.match_reasons.contains_key("imo_fraud_flag") {
            continue;
        }

        let (a, b) = (candidate.vessel_a_id, candidate.vessel_b_id);
        let bonus = crate::fusion::fingerprint::fingerprint_merge_bonus(store, settings, a, b);
        if bonus == 0 {
            continue;
        }

        let (key, new_score) = {
            let base = candidate.confidence_score;
            let key = if bonus > 0 {
                "fingerprint_similarity"
            } else {
                "fingerprint_divergence"
            };
            (key, (base + bonus).clamp(0, 100))
        };

        if let Some(candidate) = store.merge_candidate_mut(candidate_id) {
            candidate
                .match_reasons
                .insert(key.to_string(), MatchReason::points(bonus));
            candidate.confidence_score = new_score;
        }
        upgraded += 1;

        if new_score >= auto_threshold {
            let canonical_id = a.min(b);
            let absorbed_id = a.max(b);
            if let Some(candidate) = store.merge_candidate_mut(candidate_id) {
                candidate.status = MergeCandidateStatus::AutoMerged;
                candidate.resolved_at = Some(now);
                candidate.resolved_by = Some("auto_fingerprint".to_string());
            }
            let result = execute_merge(
                store,
                scoring,
                canonical_id,
                absorbed_id,
                &format!("Fingerprint-extended auto-merge: confidence {new_score}"),
                "auto",
                Some(candidate_id),
                now,
                true,
            );
            if result.is_ok() {
                merged += 1;
            }
        }
    }
    store.commit("extended_merge_pass");

    counts.insert("candidates_rescored".to_string(), upgraded);
    counts.insert("auto_merged".to_string(), merged);
    counts
}

/// Fabricated-IMO survey used by analyst tooling: canonical vessels
/// whose IMO fails validation.
pub fn detect_zombie_imos(store: &Store) -> Vec<(i64, String, String)> {
    store
        .canonical_vessel_ids()
        .into_iter()
        .filter_map(|id| {
            let vessel = store.vessel(id)?;
            let imo = vessel.imo.clone()?;
            (!validate_imo_checksum(&imo)).then(|| (id, vessel.mmsi.clone(), imo))
        })
        .collect()
}

/// All MMSIs a vessel has used, current plus absorbed.
pub fn vessel_aliases(store: &Store, vessel_id: i64) -> Vec<(String, String)> {
    let mut aliases = Vec::new();
    if let Some(vessel) = store.vessel(vessel_id) {
        aliases.push((vessel.mmsi.clone(), "current".to_string()));
    }
    let mut absorbed: Vec<&crate::types::VesselHistory> = store
        .history_for_vessel(vessel_id)
        .into_iter()
        .filter(|h| h.field_changed == "mmsi_absorbed")
        .collect();
    absorbed.sort_by_key(|h| h.observed_at);
    for record in absorbed {
        if let Some(mmsi) = &record.old_value {
            aliases.push((mmsi.clone(), "absorbed".to_string()));
        }
    }
    aliases
}
