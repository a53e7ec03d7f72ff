//! Registry-compliance detectors.
//!
//! Passes over vessel metadata, history and port-call records rather
//! than the raw position track:
//!
//! - `route_laundering`: Russian-origin cargo masked through an
//!   intermediate port hop (2-hop +20, 3-hop +35)
//! - `pi_cycling`: rapid P&I club rotation (≥ 2 changes in 90 d;
//!   non-IG destination club scores higher)
//! - `sparse_transmission`: an underway vessel transmitting far below
//!   Class A cadence (severe 25 / moderate 15)
//! - `type_dwt_mismatch`: declared type inconsistent with tonnage, or a
//!   recent type change away from tanker
//! - `flag_hopping`: ≥ 3 flag changes inside 90 d
//! - `fake_port_call`: a claimed port visit with no AIS presence near
//!   the port during the visit window
//! - `imo_fraud`: checksum-invalid IMO on a canonical vessel (runs as
//!   its own pipeline step, after merge detection)
//!
//! Each detector is feature-gated and dedups on (vessel, type, start).

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use statrs::statistics::{Data, OrderStatistics};
use tracing::info;

use super::StepCounts;
use crate::config::Settings;
use crate::geo::{haversine_nm, parse_wkt_point};
use crate::identity::validate_imo_checksum;
use crate::store::Store;
use crate::types::{SpoofingAnomaly, SpoofingType};

/// Lookback for route-laundering port sequences (days).
const ROUTE_LAUNDERING_LOOKBACK_DAYS: i64 = 45;

/// International Group P&I clubs — rotation inside the IG is less
/// suspicious than rotation out of it.
const IG_CLUBS: &[&str] = &[
    "GARD", "SKULD", "BRITANNIA", "UK P&I", "NORTH", "STANDARD", "WEST", "LONDON", "STEAMSHIP",
    "SWEDISH", "JAPAN", "AMERICAN",
];

fn insert_anomaly(
    store: &mut Store,
    vessel_id: i64,
    anomaly_type: SpoofingType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    score: i32,
    evidence: serde_json::Value,
    now: DateTime<Utc>,
) -> bool {
    if store.anomaly_exists(vessel_id, anomaly_type, start) {
        return false;
    }
    store.add_anomaly(SpoofingAnomaly {
        anomaly_id: 0,
        vessel_id,
        anomaly_type,
        start_time: start,
        end_time: end,
        implied_speed_kn: None,
        risk_score_component: score,
        evidence,
        gap_event_id: None,
        created_at: now,
    });
    true
}

/// Route laundering: port-call sequence starting at a Russian port (or
/// oil terminal) followed by intermediate hops inside the lookback.
pub fn run_route_laundering_detection(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.route_laundering_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let cutoff = now - Duration::days(ROUTE_LAUNDERING_LOOKBACK_DAYS);
    let mut created = 0_i64;

    for vessel_id in store.vessel_ids() {
        struct Hop {
            arrival: DateTime<Utc>,
            russian: bool,
        }
        let hops: Vec<Hop> = store
            .port_calls_for_vessel(vessel_id)
            .iter()
            .filter(|c| c.arrival >= cutoff)
            .filter_map(|c| {
                let port = store.port(c.port_id?)?;
                Some(Hop {
                    arrival: c.arrival,
                    russian: port.is_russian_oil_terminal
                        || port.country.as_deref().is_some_and(|cc| cc.eq_ignore_ascii_case("RU")),
                })
            })
            .collect();
        if hops.len() < 2 {
            continue;
        }

        // First Russian hop anchors the sequence
        let Some(first_ru) = hops.iter().position(|h| h.russian) else {
            continue;
        };
        let chain_len = hops.len() - first_ru;
        if chain_len < 2 {
            continue;
        }
        let (score, hops_label) = if chain_len >= 3 { (35, 3) } else { (20, 2) };
        let start = hops[first_ru].arrival;
        let end = hops[hops.len() - 1].arrival;
        if insert_anomaly(
            store,
            vessel_id,
            SpoofingType::RouteLaundering,
            start,
            end,
            score,
            json!({"hops": hops_label, "chain_length": chain_len}),
            now,
        ) {
            created += 1;
        }
    }
    store.commit("route_laundering");

    info!(anomalies = created, "Route laundering detection complete");
    counts.insert("anomalies_created".to_string(), created);
    counts
}

/// P&I cycling: ≥ 2 pi_club changes within 90 d. Rotating onto an
/// unknown (non-IG) club scores 30; inside the IG, 20.
pub fn run_pi_cycling_detection(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.pi_cycling_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let cutoff = now - Duration::days(90);
    let mut created = 0_i64;

    for vessel_id in store.vessel_ids() {
        let mut changes: Vec<(DateTime<Utc>, String)> = store
            .history_for_vessel(vessel_id)
            .iter()
            .filter(|h| h.field_changed == "pi_club" && h.observed_at >= cutoff)
            .map(|h| (h.observed_at, h.new_value.clone().unwrap_or_default()))
            .collect();
        if changes.len() < 2 {
            continue;
        }
        changes.sort();

        let latest_club = changes[changes.len() - 1].1.to_uppercase();
        let is_ig = IG_CLUBS.iter().any(|c| latest_club.contains(c));
        let score = if is_ig { 20 } else { 30 };
        let start = changes[0].0;
        let end = changes[changes.len() - 1].0;
        if insert_anomaly(
            store,
            vessel_id,
            SpoofingType::PiCycling,
            start,
            end,
            score,
            json!({
                "changes_90d": changes.len(),
                "latest_club": latest_club,
                "ig_club": is_ig,
            }),
            now,
        ) {
            created += 1;
        }
    }
    store.commit("pi_cycling");

    info!(anomalies = created, "P&I cycling detection complete");
    counts.insert("anomalies_created".to_string(), created);
    counts
}

/// Sparse transmission: an underway vessel reporting far below normal
/// cadence. Severe: < 1 point/hour over ≥ 8 h (25). Moderate:
/// < 2 points/hour (15). Stationary vessels never fire.
pub fn run_sparse_transmission_detection(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.sparse_transmission_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        struct Track {
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            n: usize,
            median_sog: f64,
        }
        let track = {
            let points = store.points_for_vessel(vessel_id);
            if points.len() < 4 {
                continue;
            }
            let sogs: Vec<f64> = points.iter().filter_map(|p| p.sog).collect();
            if sogs.is_empty() {
                continue;
            }
            Track {
                start: points[0].timestamp,
                end: points[points.len() - 1].timestamp,
                n: points.len(),
                median_sog: Data::new(sogs).median(),
            }
        };

        // At-anchor vessels legitimately report slowly
        if track.median_sog <= 1.0 {
            continue;
        }
        let span_h = (track.end - track.start).num_seconds() as f64 / 3600.0;
        if span_h < 4.0 {
            continue;
        }
        let rate = track.n as f64 / span_h;

        let (severity, score) = if rate < 1.0 && span_h >= 8.0 {
            ("severe", 25)
        } else if rate < 2.0 {
            ("moderate", 15)
        } else {
            continue;
        };

        if insert_anomaly(
            store,
            vessel_id,
            SpoofingType::SparseTransmission,
            track.start,
            track.end,
            score,
            json!({
                "severity": severity,
                "points_per_hour": (rate * 100.0).round() / 100.0,
                "span_hours": (span_h * 10.0).round() / 10.0,
            }),
            now,
        ) {
            created += 1;
        }
    }
    store.commit("sparse_transmission");

    info!(anomalies = created, "Sparse transmission detection complete");
    counts.insert("anomalies_created".to_string(), created);
    counts
}

/// Type markers consistent with a commercial hull above 5 000 DWT.
const COMMERCIAL_TYPE_MARKERS: &[&str] = &["tanker", "crude", "oil", "cargo", "bulk", "container", "lng", "lpg", "products"];

/// Type / tonnage consistency: a large hull declaring a small-vessel
/// type (25), or a recent type change away from tanker (15).
pub fn run_type_consistency_detection(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.type_consistency_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let cutoff = now - Duration::days(90);
    let mut created = 0_i64;

    for vessel_id in store.vessel_ids() {
        let Some(vessel) = store.vessel(vessel_id) else { continue };
        let dwt = vessel.deadweight;
        let vessel_type = vessel.vessel_type.clone();

        // Large hull with a non-commercial declared type
        if let (Some(dwt), Some(vt)) = (dwt, vessel_type.as_deref()) {
            let lower = vt.to_lowercase();
            let commercial = COMMERCIAL_TYPE_MARKERS.iter().any(|m| lower.contains(m));
            if dwt >= 5_000.0 && !commercial {
                if insert_anomaly(
                    store,
                    vessel_id,
                    SpoofingType::TypeDwtMismatch,
                    now,
                    now,
                    25,
                    json!({"reason": "type_dwt_mismatch", "deadweight": dwt, "declared_type": vt}),
                    now,
                ) {
                    created += 1;
                }
                continue;
            }
        }

        // Recent reclassification away from a tanker type
        let recent_change = store
            .history_for_vessel(vessel_id)
            .iter()
            .filter(|h| h.field_changed == "vessel_type" && h.observed_at >= cutoff)
            .find(|h| {
                h.old_value
                    .as_deref()
                    .is_some_and(|old| old.to_lowercase().contains("tanker"))
            })
            .map(|h| h.observed_at);
        if let Some(observed_at) = recent_change {
            if insert_anomaly(
                store,
                vessel_id,
                SpoofingType::TypeDwtMismatch,
                observed_at,
                observed_at,
                15,
                json!({"reason": "type_dwt_mismatch", "recent_type_change": true}),
                now,
            ) {
                created += 1;
            }
        }
    }
    store.commit("type_consistency");

    info!(anomalies = created, "Type consistency detection complete");
    counts.insert("anomalies_created".to_string(), created);
    counts
}

/// Flag hopping: three or more flag changes inside 90 d.
pub fn run_flag_hopping_detection(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.track_integrity_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let cutoff = now - Duration::days(90);
    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        let mut changes: Vec<DateTime<Utc>> = store
            .history_for_vessel(vessel_id)
            .iter()
            .filter(|h| h.field_changed == "flag" && h.observed_at >= cutoff)
            .map(|h| h.observed_at)
            .collect();
        if changes.len() < 3 {
            continue;
        }
        changes.sort();
        if insert_anomaly(
            store,
            vessel_id,
            SpoofingType::FlagHopping,
            changes[0],
            changes[changes.len() - 1],
            20,
            json!({"flag_changes_90d": changes.len()}),
            now,
        ) {
            created += 1;
        }
    }
    store.commit("flag_hopping");
    counts.insert("anomalies_created".to_string(), created);
    counts
}

/// Fake port call: a recorded visit with no AIS presence within 5 NM of
/// the port during the visit window.
pub fn run_fake_port_call_detection(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.track_integrity_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        struct Claim {
            arrival: DateTime<Utc>,
            departure: DateTime<Utc>,
            port_lat: f64,
            port_lon: f64,
            port_id: i64,
        }
        let claims: Vec<Claim> = store
            .port_calls_for_vessel(vessel_id)
            .iter()
            .filter_map(|c| {
                let port_id = c.port_id?;
                let port = store.port(port_id)?;
                let (lat, lon) = parse_wkt_point(&port.geometry)?;
                Some(Claim {
                    arrival: c.arrival,
                    departure: c.departure.unwrap_or(c.arrival + Duration::hours(12)),
                    port_lat: lat,
                    port_lon: lon,
                    port_id,
                })
            })
            .collect();

        for claim in claims {
            let nearby = store
                .points_for_vessel_between(vessel_id, claim.arrival, claim.departure)
                .iter()
                .any(|p| haversine_nm(p.lat, p.lon, claim.port_lat, claim.port_lon) <= 5.0);
            // No track at all during the window proves nothing
            let has_track = !store
                .points_for_vessel_between(vessel_id, claim.arrival, claim.departure)
                .is_empty();
            if has_track && !nearby {
                if insert_anomaly(
                    store,
                    vessel_id,
                    SpoofingType::FakePortCall,
                    claim.arrival,
                    claim.departure,
                    20,
                    json!({"port_id": claim.port_id}),
                    now,
                ) {
                    created += 1;
                }
            }
        }
    }
    store.commit("fake_port_call");
    counts.insert("anomalies_created".to_string(), created);
    counts
}

/// IMO fraud sweep (pipeline step after merge detection): canonical
/// vessels transmitting a checksum-invalid IMO.
pub fn run_imo_fraud_detection(store: &mut Store, now: DateTime<Utc>) -> StepCounts {
    let mut created = 0_i64;
    for vessel_id in store.canonical_vessel_ids() {
        let Some(vessel) = store.vessel(vessel_id) else { continue };
        let Some(imo) = vessel.imo.clone() else { continue };
        if validate_imo_checksum(&imo) {
            continue;
        }
        if insert_anomaly(
            store,
            vessel_id,
            SpoofingType::ImoFraud,
            now,
            now,
            40,
            json!({"imo": imo, "issue": "imo_fabricated"}),
            now,
        ) {
            created += 1;
        }
    }
    store.commit("imo_fraud");

    info!(anomalies = created, "IMO fraud detection complete");
    let mut counts = StepCounts::new();
    counts.insert("imo_fraud_anomalies".to_string(), created);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AisClass, Port, PortCall, VesselHistory};
    use chrono::TimeZone;

    fn ts(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::hours(h)
    }

    fn all_on() -> Settings {
        let mut s = Settings::default();
        s.features = crate::config::FeatureFlags::all_enabled();
        s
    }

    fn add_port(store: &mut Store, name: &str, country: &str, lat: f64, lon: f64, ru_terminal: bool) -> i64 {
        store.add_port(Port {
            port_id: 0,
            name: name.to_string(),
            country: Some(country.to_string()),
            geometry: format!("POINT({lon} {lat})"),
            major_port: true,
            is_russian_oil_terminal: ru_terminal,
            is_eu: false,
        })
    }

    fn add_call(store: &mut Store, vessel: i64, port: i64, arrival: DateTime<Utc>) {
        store.add_port_call(PortCall {
            port_call_id: 0,
            vessel_id: vessel,
            port_id: Some(port),
            arrival,
            departure: Some(arrival + Duration::hours(12)),
            source: "test".to_string(),
        });
    }

    fn add_history(store: &mut Store, vessel: i64, field: &str, old: &str, new: &str, at: DateTime<Utc>) {
        store.add_history(VesselHistory {
            history_id: 0,
            vessel_id: vessel,
            field_changed: field.to_string(),
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
            observed_at: at,
            source: "test".to_string(),
        });
    }

    #[test]
    fn three_hop_route_laundering_scores_35() {
        let mut store = Store::new();
        let v = store.create_vessel("273000001");
        let ru = add_port(&mut store, "Novorossiysk", "RU", 44.7, 37.8, true);
        let mid = add_port(&mut store, "Ceuta", "ES", 35.9, -5.3, false);
        let dst = add_port(&mut store, "Karachi", "PK", 24.8, 67.0, false);
        let now = ts(24 * 40);
        add_call(&mut store, v, ru, now - Duration::days(30));
        add_call(&mut store, v, mid, now - Duration::days(20));
        add_call(&mut store, v, dst, now - Duration::days(10));

        let counts = run_route_laundering_detection(&mut store, &all_on(), now);
        assert_eq!(counts["anomalies_created"], 1);
        let anomaly = &store.anomalies_of_type(SpoofingType::RouteLaundering)[0];
        assert_eq!(anomaly.risk_score_component, 35);
    }

    #[test]
    fn two_hop_route_laundering_scores_20() {
        let mut store = Store::new();
        let v = store.create_vessel("273000001");
        let ru = add_port(&mut store, "Primorsk", "RU", 60.3, 28.7, true);
        let mid = add_port(&mut store, "Ceuta", "ES", 35.9, -5.3, false);
        let now = ts(24 * 40);
        add_call(&mut store, v, ru, now - Duration::days(30));
        add_call(&mut store, v, mid, now - Duration::days(20));

        run_route_laundering_detection(&mut store, &all_on(), now);
        let anomaly = &store.anomalies_of_type(SpoofingType::RouteLaundering)[0];
        assert_eq!(anomaly.risk_score_component, 20);
    }

    #[test]
    fn benign_sequence_is_ignored() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        let a = add_port(&mut store, "Houston", "US", 29.7, -95.0, false);
        let b = add_port(&mut store, "Hamburg", "DE", 53.5, 9.9, false);
        let now = ts(24 * 40);
        add_call(&mut store, v, a, now - Duration::days(30));
        add_call(&mut store, v, b, now - Duration::days(20));
        let counts = run_route_laundering_detection(&mut store, &all_on(), now);
        assert_eq!(counts["anomalies_created"], 0);
    }

    #[test]
    fn pi_cycling_scores_by_destination_club() {
        let now = ts(24 * 90);
        // Two changes ending on an IG club → 20
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        add_history(&mut store, v, "pi_club", "Gard P&I", "Skuld", now - Duration::days(30));
        add_history(&mut store, v, "pi_club", "Skuld", "Britannia", now - Duration::days(10));
        run_pi_cycling_detection(&mut store, &all_on(), now);
        assert_eq!(
            store.anomalies_of_type(SpoofingType::PiCycling)[0].risk_score_component,
            20
        );

        // Ending on an unknown club → 30
        let mut store = Store::new();
        let v = store.create_vessel("211000002");
        add_history(&mut store, v, "pi_club", "Gard P&I", "Skuld", now - Duration::days(30));
        add_history(&mut store, v, "pi_club", "Skuld", "Unknown P&I Ltd", now - Duration::days(10));
        run_pi_cycling_detection(&mut store, &all_on(), now);
        assert_eq!(
            store.anomalies_of_type(SpoofingType::PiCycling)[0].risk_score_component,
            30
        );
    }

    #[test]
    fn single_pi_change_is_not_cycling() {
        let now = ts(24 * 90);
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        add_history(&mut store, v, "pi_club", "Gard P&I", "Skuld", now - Duration::days(30));
        let counts = run_pi_cycling_detection(&mut store, &all_on(), now);
        assert_eq!(counts["anomalies_created"], 0);
    }

    #[test]
    fn sparse_transmission_severity_tiers() {
        // 6 points over 12 h underway → severe
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        for i in 0..6 {
            store.add_ais_point(v, ts(0) + Duration::minutes(i * 144), 55.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
        }
        run_sparse_transmission_detection(&mut store, &all_on(), ts(24));
        let anomaly = &store.anomalies_of_type(SpoofingType::SparseTransmission)[0];
        assert_eq!(anomaly.risk_score_component, 25);
        assert_eq!(anomaly.evidence["severity"], "severe");

        // 8 points over 5 h → moderate
        let mut store = Store::new();
        let v = store.create_vessel("211000002");
        for i in 0..8 {
            store.add_ais_point(v, ts(0) + Duration::minutes(i * 43), 55.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
        }
        run_sparse_transmission_detection(&mut store, &all_on(), ts(24));
        let anomaly = &store.anomalies_of_type(SpoofingType::SparseTransmission)[0];
        assert_eq!(anomaly.risk_score_component, 15);
        assert_eq!(anomaly.evidence["severity"], "moderate");
    }

    #[test]
    fn dense_or_stationary_tracks_do_not_fire() {
        // Dense track
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        for i in 0..100 {
            store.add_ais_point(v, ts(0) + Duration::minutes(i * 3), 55.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
        }
        let counts = run_sparse_transmission_detection(&mut store, &all_on(), ts(24));
        assert_eq!(counts["anomalies_created"], 0);

        // Sparse but anchored
        let mut store = Store::new();
        let v = store.create_vessel("211000002");
        for i in 0..6 {
            store.add_ais_point(v, ts(0) + Duration::minutes(i * 144), 55.0, 20.0, Some(0.2), None, None, None, None, AisClass::A);
        }
        let counts = run_sparse_transmission_detection(&mut store, &all_on(), ts(24));
        assert_eq!(counts["anomalies_created"], 0);
    }

    #[test]
    fn large_hull_with_fishing_type_is_flagged() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.deadweight = Some(100_000.0);
            vessel.vessel_type = Some("fishing vessel".to_string());
        }
        run_type_consistency_detection(&mut store, &all_on(), ts(0));
        let anomaly = &store.anomalies_of_type(SpoofingType::TypeDwtMismatch)[0];
        assert_eq!(anomaly.risk_score_component, 25);
    }

    #[test]
    fn recent_retype_from_tanker_is_flagged() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.deadweight = Some(3_000.0);
            vessel.vessel_type = Some("cargo".to_string());
        }
        add_history(&mut store, v, "vessel_type", "crude oil tanker", "cargo", ts(0) - Duration::days(30));
        run_type_consistency_detection(&mut store, &all_on(), ts(0));
        let anomaly = &store.anomalies_of_type(SpoofingType::TypeDwtMismatch)[0];
        assert_eq!(anomaly.risk_score_component, 15);
        assert_eq!(anomaly.evidence["recent_type_change"], true);
    }

    #[test]
    fn small_hull_with_fishing_type_is_fine() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.deadweight = Some(500.0);
            vessel.vessel_type = Some("fishing vessel".to_string());
        }
        let counts = run_type_consistency_detection(&mut store, &all_on(), ts(0));
        assert_eq!(counts["anomalies_created"], 0);
    }

    #[test]
    fn invalid_imo_creates_fraud_anomaly() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.imo = Some("9074720".to_string()); // broken check digit
        }
        let counts = run_imo_fraud_detection(&mut store, ts(0));
        assert_eq!(counts["imo_fraud_anomalies"], 1);

        let mut store = Store::new();
        let v = store.create_vessel("211000002");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.imo = Some("9074729".to_string()); // valid
        }
        let counts = run_imo_fraud_detection(&mut store, ts(0));
        assert_eq!(counts["imo_fraud_anomalies"], 0);
    }
}
