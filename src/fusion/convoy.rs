//! Convoy, floating-storage and Arctic-routing detection.
//!
//! A convoy is two vessels co-moving in formation: per 15-minute
//! bucket, within 5 NM, both above 3 kn, headings within 15°. Sixteen
//! consecutive windows (4 h) create an event; scoring tiers by total
//! duration.
//!
//! Floating storage: loitering beyond 720 h combined with at least two
//! STS events — idle storage capacity feeding transfers.
//!
//! Arctic routing: tanker traffic inside an Arctic-tagged corridor by a
//! vessel without an ice-class notation.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::info;

use crate::classify::is_tanker_type;
use crate::config::defaults::{
    CONVOY_BUCKET_MINUTES, CONVOY_HEADING_TOLERANCE_DEG, CONVOY_MAX_DISTANCE_NM,
    CONVOY_MIN_WINDOWS, FLOATING_STORAGE_MIN_HOURS,
};
use crate::config::Settings;
use crate::detectors::StepCounts;
use crate::geo::{grid_cell, haversine_nm, heading_diff};
use crate::store::Store;
use crate::types::{ConvoyEvent, FleetAlert};

/// Minimum speed for "underway together" (knots).
const CONVOY_MIN_SOG: f64 = 3.0;

fn duration_tier_score(duration_hours: f64) -> i32 {
    if duration_hours >= 24.0 {
        35
    } else if duration_hours >= 8.0 {
        25
    } else {
        15
    }
}

/// Run convoy detection over all tanker tracks.
///
/// Returns `{convoy_events}`.
pub fn detect_convoys(store: &mut Store, settings: &Settings) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.convoy_detection_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    #[derive(Clone, Copy)]
    struct Snap {
        vessel_id: i64,
        lat: f64,
        lon: f64,
        sog: f64,
        heading: f64,
    }

    // (vessel, bucket) → latest qualifying point
    let mut bucket_index: BTreeMap<(i64, i64), Snap> = BTreeMap::new();
    for vessel_id in store.vessel_ids() {
        if !store.vessel(vessel_id).is_some_and(is_tanker_type) {
            continue;
        }
        for p in store.points_for_vessel(vessel_id) {
            let (Some(sog), Some(heading)) = (p.sog, p.course_or_heading()) else {
                continue;
            };
            if sog <= CONVOY_MIN_SOG {
                continue;
            }
            let bucket = (p.timestamp.timestamp() / 60 / CONVOY_BUCKET_MINUTES)
                * CONVOY_BUCKET_MINUTES;
            bucket_index.insert(
                (vessel_id, bucket),
                Snap {
                    vessel_id,
                    lat: p.lat,
                    lon: p.lon,
                    sog,
                    heading,
                },
            );
        }
    }

    // bucket → cell → snaps (1° grid keeps the pair scan near-linear)
    let mut bucket_grid: BTreeMap<i64, BTreeMap<(i32, i32), Vec<Snap>>> = BTreeMap::new();
    for ((_, bucket), snap) in &bucket_index {
        bucket_grid
            .entry(*bucket)
            .or_default()
            .entry(grid_cell(snap.lat, snap.lon))
            .or_default()
            .push(*snap);
    }

    // pair → qualifying buckets with separation
    let mut pair_windows: BTreeMap<(i64, i64), Vec<(i64, f64)>> = BTreeMap::new();
    for (bucket, grid) in &bucket_grid {
        for snaps in grid.values() {
            for i in 0..snaps.len() {
                for j in (i + 1)..snaps.len() {
                    let (a, b) = (&snaps[i], &snaps[j]);
                    if a.vessel_id == b.vessel_id {
                        continue;
                    }
                    let dist_nm = haversine_nm(a.lat, a.lon, b.lat, b.lon);
                    if dist_nm > CONVOY_MAX_DISTANCE_NM {
                        continue;
                    }
                    if heading_diff(a.heading, b.heading) > CONVOY_HEADING_TOLERANCE_DEG {
                        continue;
                    }
                    let pair = (a.vessel_id.min(b.vessel_id), a.vessel_id.max(b.vessel_id));
                    pair_windows.entry(pair).or_default().push((*bucket, dist_nm));
                }
            }
        }
    }

    let mut created = 0_i64;
    for ((v1, v2), mut windows) in pair_windows {
        if windows.len() < CONVOY_MIN_WINDOWS {
            continue;
        }
        windows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut run_start = 0;
        for idx in 1..=windows.len() {
            let consecutive = idx < windows.len()
                && windows[idx].0 - windows[idx - 1].0 == CONVOY_BUCKET_MINUTES;
            if consecutive {
                continue;
            }
            let run = &windows[run_start..idx];
            run_start = idx;
            if run.len() < CONVOY_MIN_WINDOWS {
                continue;
            }

            let start = bucket_time(run[0].0);
            let end = bucket_time(run[run.len() - 1].0 + CONVOY_BUCKET_MINUTES);
            if store.convoy_exists(v1, v2, start) {
                continue;
            }
            let duration_hours = (end - start).num_minutes() as f64 / 60.0;
            let mean_sep = run.iter().map(|w| w.1).sum::<f64>() / run.len() as f64;
            store.add_convoy(ConvoyEvent {
                convoy_id: 0,
                vessel_1_id: v1,
                vessel_2_id: v2,
                start_time: start,
                end_time: end,
                duration_hours,
                mean_separation_nm: mean_sep,
                risk_score_component: duration_tier_score(duration_hours),
            });
            created += 1;
        }
    }
    store.commit("convoy_detection");

    info!(convoys = created, "Convoy detection complete");
    counts.insert("convoy_events".to_string(), created);
    counts
}

fn bucket_time(bucket: i64) -> DateTime<Utc> {
    #[allow(clippy::expect_used)]
    Utc.timestamp_opt(bucket * 60, 0)
        .single()
        .expect("bucket index is a valid unix minute")
}

/// Floating storage: loiter episodes beyond 720 h on vessels with two
/// or more STS events.
///
/// Returns `{floating_storage_alerts}`.
pub fn detect_floating_storage(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.convoy_detection_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        let long_loiter = store
            .loiters_for_vessel(vessel_id)
            .iter()
            .any(|l| l.duration_hours > FLOATING_STORAGE_MIN_HOURS);
        if !long_loiter {
            continue;
        }
        if store.sts_for_vessel(vessel_id).len() < 2 {
            continue;
        }
        let key = vec![vessel_id];
        if store.fleet_alert_exists("floating_storage", &key) {
            continue;
        }
        store.add_fleet_alert(FleetAlert {
            alert_id: 0,
            alert_type: "floating_storage".to_string(),
            vessel_ids: key,
            evidence: json!({"sts_events": store.sts_for_vessel(vessel_id).len()}),
            score: 25,
            created_at: now,
        });
        created += 1;
    }
    store.commit("floating_storage");
    counts.insert("floating_storage_alerts".to_string(), created);
    counts
}

/// Arctic corridor traffic without an ice-class notation.
///
/// Returns `{arctic_alerts}`.
pub fn detect_arctic_no_ice_class(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.convoy_detection_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    // Arctic-tagged corridor bboxes
    let arctic_boxes: Vec<crate::geo::Bbox> = store
        .corridors()
        .iter()
        .filter(|c| c.has_tag("arctic"))
        .filter_map(|c| crate::geo::parse_wkt_bbox(&c.geometry))
        .collect();
    if arctic_boxes.is_empty() {
        counts.insert("arctic_alerts".to_string(), 0);
        return counts;
    }

    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        let Some(vessel) = store.vessel(vessel_id) else { continue };
        if !is_tanker_type(vessel) {
            continue;
        }
        // Ice-class notation recorded in the type string
        let has_ice_class = vessel
            .vessel_type
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains("ice"));
        if has_ice_class {
            continue;
        }
        let in_arctic = store
            .points_for_vessel(vessel_id)
            .iter()
            .any(|p| arctic_boxes.iter().any(|b| b.contains(p.lat, p.lon, 0.05)));
        if !in_arctic {
            continue;
        }
        let key = vec![vessel_id];
        if store.fleet_alert_exists("arctic_no_ice_class", &key) {
            continue;
        }
        store.add_fleet_alert(FleetAlert {
            alert_id: 0,
            alert_type: "arctic_no_ice_class".to_string(),
            vessel_ids: key,
            evidence: json!({}),
            score: 25,
            created_at: now,
        });
        created += 1;
    }
    store.commit("arctic_no_ice_class");
    counts.insert("arctic_alerts".to_string(), created);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AisClass;
    use chrono::Duration;

    fn ts(mins: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::minutes(mins)
    }

    fn settings_on() -> Settings {
        let mut s = Settings::default();
        s.features.convoy_detection_enabled = true;
        s
    }

    fn tanker(store: &mut Store, mmsi: &str) -> i64 {
        let v = store.create_vessel(mmsi);
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.vessel_type = Some("crude oil tanker".to_string());
            vessel.deadweight = Some(100_000.0);
        }
        v
    }

    #[test]
    fn synchronized_pair_creates_convoy() {
        let mut store = Store::new();
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");
        // 5 h of parallel sailing, 15-min cadence, ~2 NM apart
        for i in 0..21 {
            let t = ts(i * 15);
            let lat = 40.0 + i as f64 * 0.02;
            store.add_ais_point(v1, t, lat, 20.0, Some(8.0), Some(0.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, lat, 20.04, Some(8.0), Some(5.0), None, None, None, AisClass::A);
        }
        let counts = detect_convoys(&mut store, &settings_on());
        assert_eq!(counts["convoy_events"], 1);
        let convoy = &store.convoys_for_vessel(v1)[0];
        assert!(convoy.duration_hours >= 5.0);
        assert_eq!(convoy.risk_score_component, 15); // 4-8 h tier
    }

    #[test]
    fn anchored_pair_is_not_a_convoy() {
        let mut store = Store::new();
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");
        for i in 0..21 {
            let t = ts(i * 15);
            store.add_ais_point(v1, t, 40.0, 20.0, Some(0.3), Some(0.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, 40.0, 20.04, Some(0.3), Some(0.0), None, None, None, AisClass::A);
        }
        let counts = detect_convoys(&mut store, &settings_on());
        assert_eq!(counts["convoy_events"], 0);
    }

    #[test]
    fn diverging_headings_break_the_convoy() {
        let mut store = Store::new();
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");
        for i in 0..21 {
            let t = ts(i * 15);
            let lat = 40.0 + i as f64 * 0.02;
            store.add_ais_point(v1, t, lat, 20.0, Some(8.0), Some(0.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, lat, 20.04, Some(8.0), Some(90.0), None, None, None, AisClass::A);
        }
        let counts = detect_convoys(&mut store, &settings_on());
        assert_eq!(counts["convoy_events"], 0);
    }

    #[test]
    fn floating_storage_needs_loiter_and_sts() {
        use crate::types::{LoiteringEvent, StsDetectionType, StsTransferEvent};
        let mut store = Store::new();
        let v = tanker(&mut store, "211000001");
        let partner = tanker(&mut store, "572000002");
        store.add_loiter(LoiteringEvent {
            loiter_id: 0,
            vessel_id: v,
            start_time: ts(0),
            end_time: ts(60 * 800),
            duration_hours: 800.0,
            mean_lat: 36.5,
            mean_lon: 22.5,
            median_sog_kn: 0.2,
            corridor_id: None,
            preceding_gap_id: None,
            following_gap_id: None,
        });
        for start in [0, 2000] {
            store.add_sts(StsTransferEvent {
                sts_id: 0,
                vessel_1_id: v.min(partner),
                vessel_2_id: v.max(partner),
                detection_type: StsDetectionType::VisibleVisible,
                start_time: ts(start),
                end_time: ts(start + 120),
                duration_minutes: 120,
                mean_proximity_meters: Some(150.0),
                mean_lat: None,
                mean_lon: None,
                corridor_id: None,
                eta_minutes: None,
                risk_score_component: 25,
                source: "proximity".to_string(),
            });
        }
        let counts = detect_floating_storage(&mut store, &settings_on(), ts(0));
        assert_eq!(counts["floating_storage_alerts"], 1);
    }

    #[test]
    fn arctic_tanker_without_ice_class_is_flagged() {
        use crate::types::{Corridor, CorridorType};
        let mut store = Store::new();
        store.add_corridor(Corridor {
            corridor_id: 0,
            name: "Northern Sea Route".to_string(),
            corridor_type: CorridorType::ExportRoute,
            risk_weight: 1.5,
            is_jamming_zone: false,
            description: None,
            geometry: "POLYGON((60.0 72.0, 170.0 72.0, 170.0 78.0, 60.0 78.0, 60.0 72.0))"
                .to_string(),
            tags: ["arctic".to_string()].into_iter().collect(),
        });
        let v = tanker(&mut store, "273000001");
        store.add_ais_point(v, ts(0), 74.0, 80.0, Some(10.0), Some(90.0), None, None, None, AisClass::A);

        let counts = detect_arctic_no_ice_class(&mut store, &settings_on(), ts(0));
        assert_eq!(counts["arctic_alerts"], 1);

        // Ice-classed hull sails clean
        let mut store2 = Store::new();
        store2.add_corridor(Corridor {
            corridor_id: 0,
            name: "Northern Sea Route".to_string(),
            corridor_type: CorridorType::ExportRoute,
            risk_weight: 1.5,
            is_jamming_zone: false,
            description: None,
            geometry: "POLYGON((60.0 72.0, 170.0 72.0, 170.0 78.0, 60.0 78.0, 60.0 72.0))"
                .to_string(),
            tags: ["arctic".to_string()].into_iter().collect(),
        });
        let v2 = store2.create_vessel("273000002");
        if let Some(vessel) = store2.vessel_mut(v2) {
            vessel.vessel_type = Some("crude oil tanker ice-1a".to_string());
            vessel.deadweight = Some(100_000.0);
        }
        store2.add_ais_point(v2, ts(0), 74.0, 80.0, Some(10.0), Some(90.0), None, None, None, AisClass::A);
        let counts = detect_arctic_no_ice_class(&mut store2, &settings_on(), ts(0));
        assert_eq!(counts["arctic_alerts"], 0);
    }
}
