//! Track integrity detectors — cross-receiver, handshake and cloning.
//!
//! These passes look for structural corruption of the position track
//! itself rather than behavioral anomalies:
//!
//! - `synthetic_track`: the track ping-pongs between two distant
//!   regions at impossible implied speeds — a ghost track injected at a
//!   second receiver.
//! - `identity_swap`: one vessel's silence ends right as another's
//!   begins, with adjacent hand-off positions — the classic transponder
//!   handshake between two hulls trading an identity.
//! - MMSI cloning: repeated `dual_transmission` hits in a short span
//!   escalate to a `stateless_mmsi` anomaly — the MMSI is effectively
//!   shared equipment, not an identity.
//!
//! Gated by `features.track_integrity_enabled`.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;

use super::StepCounts;
use crate::config::Settings;
use crate::geo::haversine_nm;
use crate::store::Store;
use crate::types::{SpoofingAnomaly, SpoofingType};

/// Implied speed for a teleport leg (knots).
const TELEPORT_SPEED_KN: f64 = 100.0;

/// Ping-pong legs required inside 24 h for a synthetic track.
const SYNTHETIC_MIN_LEGS: usize = 3;

/// Hand-off alignment window for identity swaps (hours).
const HANDSHAKE_WINDOW_HOURS: i64 = 1;

/// Hand-off proximity ceiling for identity swaps (NM).
const HANDSHAKE_MAX_DISTANCE_NM: f64 = 10.0;

/// Dual-transmission hits inside 24 h that escalate to cloning.
const CLONING_MIN_HITS: usize = 3;

/// Run all three integrity passes.
///
/// Returns `{synthetic_tracks, identity_swaps, cloned_mmsis}`.
pub fn run_track_integrity_detection(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.track_integrity_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let synthetic = detect_synthetic_tracks(store, now);
    let swaps = detect_identity_swaps(store, now);
    let cloned = detect_mmsi_cloning(store, now);
    store.commit("track_integrity");

    info!(synthetic, swaps, cloned, "Track integrity detection complete");
    counts.insert("synthetic_tracks".to_string(), synthetic);
    counts.insert("identity_swaps".to_string(), swaps);
    counts.insert("cloned_mmsis".to_string(), cloned);
    counts
}

/// Cross-receiver ghost tracks: ≥ 3 teleport legs within 24 h.
fn detect_synthetic_tracks(store: &mut Store, now: DateTime<Utc>) -> i64 {
    struct Leg {
        ts: DateTime<Utc>,
        end: DateTime<Utc>,
    }

    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        let legs: Vec<Leg> = {
            let points = store.points_for_vessel(vessel_id);
            points
                .windows(2)
                .filter_map(|pair| {
                    let (p1, p2) = (pair[0], pair[1]);
                    let dt_h = (p2.timestamp - p1.timestamp).num_seconds() as f64 / 3600.0;
                    if dt_h <= 0.0 {
                        return None;
                    }
                    let speed = haversine_nm(p1.lat, p1.lon, p2.lat, p2.lon) / dt_h;
                    (speed > TELEPORT_SPEED_KN).then(|| Leg {
                        ts: p1.timestamp,
                        end: p2.timestamp,
                    })
                })
                .collect()
        };
        if legs.len() < SYNTHETIC_MIN_LEGS {
            continue;
        }

        // Slide over legs: any 24 h span holding the minimum leg count
        for window_start in 0..=(legs.len() - SYNTHETIC_MIN_LEGS) {
            let window_end_idx = window_start + SYNTHETIC_MIN_LEGS - 1;
            let span = legs[window_end_idx].end - legs[window_start].ts;
            if span > Duration::hours(24) {
                continue;
            }
            let start = legs[window_start].ts;
            if store.anomaly_exists(vessel_id, SpoofingType::SyntheticTrack, start) {
                break;
            }
            store.add_anomaly(SpoofingAnomaly {
                anomaly_id: 0,
                vessel_id,
                anomaly_type: SpoofingType::SyntheticTrack,
                start_time: start,
                end_time: legs[window_end_idx].end,
                implied_speed_kn: None,
                risk_score_component: 30,
                evidence: json!({
                    "teleport_legs": SYNTHETIC_MIN_LEGS,
                    "span_hours": (legs[window_end_idx].end - start).num_minutes() as f64 / 60.0,
                }),
                gap_event_id: None,
                created_at: now,
            });
            created += 1;
            break; // one anomaly per vessel per pass
        }
    }
    created
}

/// Transponder handshakes: gap on A ends within ±1 h of a gap starting
/// on B, with the hand-off positions within 10 NM.
fn detect_identity_swaps(store: &mut Store, now: DateTime<Utc>) -> i64 {
    struct GapEdge {
        vessel_id: i64,
        gap_start: DateTime<Utc>,
        gap_end: DateTime<Utc>,
        start_pos: Option<(f64, f64)>,
        end_pos: Option<(f64, f64)>,
    }

    let edges: Vec<GapEdge> = store
        .gap_ids()
        .iter()
        .filter_map(|id| store.gap(*id))
        .map(|g| GapEdge {
            vessel_id: g.vessel_id,
            gap_start: g.gap_start,
            gap_end: g.gap_end,
            start_pos: g
                .start_point_id
                .and_then(|id| store.ais_point(id))
                .map(|p| (p.lat, p.lon)),
            end_pos: g
                .end_point_id
                .and_then(|id| store.ais_point(id))
                .map(|p| (p.lat, p.lon)),
        })
        .collect();

    let window = Duration::hours(HANDSHAKE_WINDOW_HOURS);
    let mut created = 0_i64;

    for a in &edges {
        for b in &edges {
            if a.vessel_id == b.vessel_id {
                continue;
            }
            // A resurfaces as B goes dark
            if (a.gap_end - b.gap_start).abs() > window {
                continue;
            }
            let (Some(a_on), Some(b_off)) = (a.end_pos, b.start_pos) else {
                continue;
            };
            if haversine_nm(a_on.0, a_on.1, b_off.0, b_off.1) > HANDSHAKE_MAX_DISTANCE_NM {
                continue;
            }
            // Lower vessel ID carries the anomaly; evidence names both
            let carrier = a.vessel_id.min(b.vessel_id);
            let start = a.gap_end.min(b.gap_start);
            if store.anomaly_exists(carrier, SpoofingType::IdentitySwap, start) {
                continue;
            }
            store.add_anomaly(SpoofingAnomaly {
                anomaly_id: 0,
                vessel_id: carrier,
                anomaly_type: SpoofingType::IdentitySwap,
                start_time: start,
                end_time: a.gap_end.max(b.gap_start),
                implied_speed_kn: None,
                risk_score_component: 25,
                evidence: json!({
                    "resurfacing_vessel_id": a.vessel_id,
                    "darkening_vessel_id": b.vessel_id,
                    "handoff_distance_nm": haversine_nm(a_on.0, a_on.1, b_off.0, b_off.1),
                }),
                gap_event_id: None,
                created_at: now,
            });
            created += 1;
        }
    }
    created
}

/// Sustained dual transmission escalates to a stateless / cloned MMSI.
fn detect_mmsi_cloning(store: &mut Store, now: DateTime<Utc>) -> i64 {
    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        let mut hits: Vec<(DateTime<Utc>, DateTime<Utc>)> = store
            .anomalies_for_vessel(vessel_id)
            .iter()
            .filter(|a| a.anomaly_type == SpoofingType::DualTransmission)
            .map(|a| (a.start_time, a.end_time))
            .collect();
        if hits.len() < CLONING_MIN_HITS {
            continue;
        }
        hits.sort();

        for w in hits.windows(CLONING_MIN_HITS) {
            if w[CLONING_MIN_HITS - 1].1 - w[0].0 > Duration::hours(24) {
                continue;
            }
            let start = w[0].0;
            if store.anomaly_exists(vessel_id, SpoofingType::StatelessMmsi, start) {
                break;
            }
            store.add_anomaly(SpoofingAnomaly {
                anomaly_id: 0,
                vessel_id,
                anomaly_type: SpoofingType::StatelessMmsi,
                start_time: start,
                end_time: w[CLONING_MIN_HITS - 1].1,
                implied_speed_kn: None,
                risk_score_component: 30,
                evidence: json!({
                    "dual_transmission_hits": CLONING_MIN_HITS,
                    "subtype": "mmsi_cloning",
                }),
                gap_event_id: None,
                created_at: now,
            });
            created += 1;
            break;
        }
    }
    created
}
