//! STS (ship-to-ship) transfer detection.
//!
//! Two-phase proximity analysis over tanker AIS points:
//!
//!   Phase A — confirmed transfers (`visible_visible`): haversine
//!   proximity, speed and heading filters over 15-minute buckets. Pairs
//!   holding within the proximity ceiling for ≥ 8 consecutive windows
//!   (2 h) become events.
//!
//!   Phase B — approaching vectors (`approaching`): stationary tankers
//!   inside STS-zone corridors matched with tankers on an intercept
//!   course; an event is created when ETA is under 4 hours.
//!
//! Points are first indexed into a 1-degree lat/lon grid so only vessels
//! sharing a grid cell are compared, avoiding an O(n²) cross-product.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{is_near_major_port, StepCounts};
use crate::classify::is_tanker_type;
use crate::config::defaults::{
    NM_TO_METERS, STS_BUCKET_MINUTES, STS_COG_PARALLEL_DEG, STS_ETA_MAX_MINUTES,
    STS_PORT_EXCLUSION_NM, STS_SOG_APPROACHING_MAX, STS_SOG_APPROACHING_MIN, STS_SOG_STATIONARY,
    STS_SOG_STATIONARY_B,
};
use crate::config::Settings;
use crate::corridor::CorridorIndex;
use crate::geo::{grid_cell, haversine_meters, heading_diff, initial_bearing};
use crate::scoring::ScoringConfig;
use crate::store::Store;
use crate::types::{StsDetectionType, StsTransferEvent};

/// risk_score_component values.
const RISK_STS_ZONE: i32 = 35;
const RISK_NO_ZONE: i32 = 25;
const RISK_APPROACHING: i32 = 20;

/// Point snapshot for the pass.
#[derive(Clone, Copy)]
struct Snap {
    vessel_id: i64,
    ts: DateTime<Utc>,
    lat: f64,
    lon: f64,
    sog: Option<f64>,
    cog: Option<f64>,
    heading: Option<f64>,
}

/// Run both proximity phases and persist new events.
///
/// Returns `{sts_events_created, phase_a, phase_b}`.
pub fn detect_sts_events(
    store: &mut Store,
    settings: &Settings,
    corridors: &CorridorIndex,
    scoring: &ScoringConfig,
) -> StepCounts {
    let mut counts = StepCounts::new();

    let tanker_ids: Vec<i64> = store
        .vessel_ids()
        .into_iter()
        .filter(|id| store.vessel(*id).is_some_and(is_tanker_type))
        .collect();
    if tanker_ids.is_empty() {
        info!("STS detector: no tanker vessels found — skipping");
        counts.insert("sts_events_created".to_string(), 0);
        return counts;
    }

    let mut points: Vec<Snap> = Vec::new();
    for vessel_id in &tanker_ids {
        for p in store.points_for_vessel(*vessel_id) {
            points.push(Snap {
                vessel_id: *vessel_id,
                ts: p.timestamp,
                lat: p.lat,
                lon: p.lon,
                sog: p.sog,
                cog: p.cog,
                heading: p.heading,
            });
        }
    }
    info!(
        points = points.len(),
        tankers = tanker_ids.len(),
        "STS detector: loaded tanker AIS points"
    );

    let created_a = phase_a(store, settings, corridors, scoring, &points);
    store.commit("sts.phase_a");
    let created_b = phase_b(store, corridors, scoring, &points);
    store.commit("sts.phase_b");

    let total = created_a + created_b;
    info!(total, phase_a = created_a, phase_b = created_b, "STS detector complete");
    counts.insert("sts_events_created".to_string(), total);
    counts.insert("phase_a".to_string(), created_a);
    counts.insert("phase_b".to_string(), created_b);
    counts
}

/// Map a timestamp to its 15-minute bucket index (minutes since epoch).
fn bucket_key(ts: DateTime<Utc>) -> i64 {
    let epoch_minutes = ts.timestamp() / 60;
    (epoch_minutes / STS_BUCKET_MINUTES) * STS_BUCKET_MINUTES
}

fn bucket_start(bk: i64) -> DateTime<Utc> {
    #[allow(clippy::expect_used)]
    Utc.timestamp_opt(bk * 60, 0)
        .single()
        .expect("bucket index is a valid unix minute")
}

// ── Phase A — confirmed visible-visible transfers ──────────────────────

fn phase_a(
    store: &mut Store,
    settings: &Settings,
    corridors: &CorridorIndex,
    scoring: &ScoringConfig,
    points: &[Snap],
) -> i64 {
    let proximity_m = settings.sts.proximity_meters;
    let min_windows = settings.sts.min_windows;

    // (vessel, bucket) → representative point (latest in bucket)
    let mut bucket_index: BTreeMap<(i64, i64), Snap> = BTreeMap::new();
    for p in points {
        let key = (p.vessel_id, bucket_key(p.ts));
        match bucket_index.get(&key) {
            Some(existing) if existing.ts >= p.ts => {}
            _ => {
                bucket_index.insert(key, *p);
            }
        }
    }

    // bucket → grid cell → [(vessel, point)]
    let mut bucket_grid: BTreeMap<i64, BTreeMap<(i32, i32), Vec<Snap>>> = BTreeMap::new();
    for ((_, bk), p) in &bucket_index {
        bucket_grid
            .entry(*bk)
            .or_default()
            .entry(grid_cell(p.lat, p.lon))
            .or_default()
            .push(*p);
    }

    // Canonical pair → passing windows (bucket, dist_m, mean_lat, mean_lon)
    let mut pair_windows: BTreeMap<(i64, i64), Vec<(i64, f64, f64, f64)>> = BTreeMap::new();

    for (bk, grid) in &bucket_grid {
        for vessel_list in grid.values() {
            if vessel_list.len() < 2 {
                continue;
            }
            for i in 0..vessel_list.len() {
                for j in (i + 1)..vessel_list.len() {
                    let (a, b) = (&vessel_list[i], &vessel_list[j]);
                    if a.vessel_id == b.vessel_id {
                        continue;
                    }

                    let dist_m = haversine_meters(a.lat, a.lon, b.lat, b.lon);
                    if dist_m >= proximity_m {
                        continue;
                    }

                    let sog_a = a.sog.unwrap_or(999.0);
                    let sog_b = b.sog.unwrap_or(999.0);
                    if sog_a >= STS_SOG_STATIONARY || sog_b >= STS_SOG_STATIONARY {
                        continue;
                    }

                    // Parallel (|diff| < 30°) or anti-parallel (|diff-180°| < 30°)
                    if let (Some(cog_a), Some(cog_b)) = (a.cog, b.cog) {
                        let diff = heading_diff(cog_a, cog_b);
                        let parallel = diff < STS_COG_PARALLEL_DEG;
                        let anti_parallel = (diff - 180.0).abs() < STS_COG_PARALLEL_DEG;
                        if !(parallel || anti_parallel) {
                            continue;
                        }
                    }

                    let pair = (a.vessel_id.min(b.vessel_id), a.vessel_id.max(b.vessel_id));
                    pair_windows.entry(pair).or_default().push((
                        *bk,
                        dist_m,
                        (a.lat + b.lat) / 2.0,
                        (a.lon + b.lon) / 2.0,
                    ));
                }
            }
        }
    }

    // Evaluate each pair's windows for consecutive runs
    let mut created = 0_i64;
    for ((vid1, vid2), mut windows) in pair_windows {
        if windows.len() < min_windows {
            continue;
        }
        windows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut run_start = 0;
        for idx in 1..=windows.len() {
            let consecutive =
                idx < windows.len() && windows[idx].0 - windows[idx - 1].0 == STS_BUCKET_MINUTES;
            if consecutive {
                continue;
            }

            let run = &windows[run_start..idx];
            run_start = idx;
            if run.len() < min_windows {
                continue;
            }

            let start_dt = bucket_start(run[0].0);
            let end_dt = bucket_start(run[run.len() - 1].0 + STS_BUCKET_MINUTES);

            if store.sts_overlap_exists(vid1, vid2, start_dt, end_dt) {
                continue;
            }

            let n = run.len() as f64;
            let mean_dist = run.iter().map(|w| w.1).sum::<f64>() / n;
            let mean_lat = run.iter().map(|w| w.2).sum::<f64>() / n;
            let mean_lon = run.iter().map(|w| w.3).sum::<f64>() / n;
            let duration = (end_dt - start_dt).num_minutes();

            // Berthed pairs at a terminal are not STS
            if is_near_major_port(store, mean_lat, mean_lon, STS_PORT_EXCLUSION_NM) {
                continue;
            }

            let corridor_id = corridors.find_sts_zone_for_point(mean_lat, mean_lon);
            let risk = if corridor_id.is_some() {
                RISK_STS_ZONE
            } else {
                RISK_NO_ZONE
            };

            let sts_id = store.add_sts(StsTransferEvent {
                sts_id: 0,
                vessel_1_id: vid1,
                vessel_2_id: vid2,
                detection_type: StsDetectionType::VisibleVisible,
                start_time: start_dt,
                end_time: end_dt,
                duration_minutes: duration,
                mean_proximity_meters: Some((mean_dist * 10.0).round() / 10.0),
                mean_lat: Some((mean_lat * 1e6).round() / 1e6),
                mean_lon: Some((mean_lon * 1e6).round() / 1e6),
                corridor_id,
                eta_minutes: None,
                risk_score_component: risk,
                source: "proximity".to_string(),
            });
            apply_dark_partner_bonus(store, scoring, sts_id);
            created += 1;
        }
    }

    info!(created, "Phase A: visible-visible STS events created");
    created
}

// ── Phase B — approaching vectors ──────────────────────────────────────

fn phase_b(
    store: &mut Store,
    corridors: &CorridorIndex,
    scoring: &ScoringConfig,
    points: &[Snap],
) -> i64 {
    if corridors.sts_zone_count() == 0 {
        debug!("Phase B: no STS-zone corridors with geometry — skipping");
        return 0;
    }

    // vessel → latest point
    let mut latest: BTreeMap<i64, Snap> = BTreeMap::new();
    for p in points {
        match latest.get(&p.vessel_id) {
            Some(existing) if existing.ts >= p.ts => {}
            _ => {
                latest.insert(p.vessel_id, *p);
            }
        }
    }

    let mut stationary_in_zone: Vec<(Snap, i64)> = Vec::new();
    let mut moving: Vec<Snap> = Vec::new();
    for p in latest.values() {
        let sog = p.sog.unwrap_or(999.0);
        let corridor = corridors.find_sts_zone_for_point(p.lat, p.lon);
        if sog < STS_SOG_STATIONARY_B {
            if let Some(corridor_id) = corridor {
                stationary_in_zone.push((*p, corridor_id));
                continue;
            }
        }
        if (STS_SOG_APPROACHING_MIN..=STS_SOG_APPROACHING_MAX).contains(&sog) {
            moving.push(*p);
        }
    }

    if stationary_in_zone.is_empty() {
        debug!("Phase B: no stationary tankers found in STS zones");
        return 0;
    }

    let mut created = 0_i64;
    for (stat, corridor_id) in &stationary_in_zone {
        for mov in &moving {
            if mov.vessel_id == stat.vessel_id {
                continue;
            }

            let dist_m = haversine_meters(stat.lat, stat.lon, mov.lat, mov.lon);
            let bearing_to_stat = initial_bearing(mov.lat, mov.lon, stat.lat, stat.lon);
            let Some(mov_cog) = mov.cog.or(mov.heading) else {
                continue;
            };
            if heading_diff(mov_cog, bearing_to_stat) > STS_COG_PARALLEL_DEG {
                continue;
            }

            let dist_nm = dist_m / NM_TO_METERS;
            let sog = mov.sog.unwrap_or(STS_SOG_APPROACHING_MIN); // band-checked above
            let eta_minutes = ((dist_nm / sog) * 60.0) as i64;
            if eta_minutes >= STS_ETA_MAX_MINUTES {
                continue;
            }

            let event_time = mov.ts;
            let vid1 = stat.vessel_id.min(mov.vessel_id);
            let vid2 = stat.vessel_id.max(mov.vessel_id);
            let eta_end = event_time + Duration::minutes(eta_minutes);

            if store.sts_overlap_exists(vid1, vid2, event_time, eta_end) {
                continue;
            }

            let sts_id = store.add_sts(StsTransferEvent {
                sts_id: 0,
                vessel_1_id: vid1,
                vessel_2_id: vid2,
                detection_type: StsDetectionType::Approaching,
                start_time: event_time,
                end_time: eta_end,
                duration_minutes: eta_minutes,
                mean_proximity_meters: Some((dist_m * 10.0).round() / 10.0),
                mean_lat: Some(((stat.lat + mov.lat) / 2.0 * 1e6).round() / 1e6),
                mean_lon: Some(((stat.lon + mov.lon) / 2.0 * 1e6).round() / 1e6),
                corridor_id: Some(*corridor_id),
                eta_minutes: Some(eta_minutes),
                risk_score_component: RISK_APPROACHING,
                source: "proximity".to_string(),
            });
            apply_dark_partner_bonus(store, scoring, sts_id);
            created += 1;
        }
    }

    info!(created, "Phase B: approaching-vector STS events created");
    created
}

/// Add the dark-partner bonus when either vessel has a gap overlapping
/// the event window (±2 h).
///
/// Requires gap detection to have run first: with no gap records the
/// check silently passes (no false fire, signal simply absent).
pub fn apply_dark_partner_bonus(store: &mut Store, scoring: &ScoringConfig, sts_id: i64) {
    let Some(event) = store.sts(sts_id) else {
        return;
    };
    let (v1, v2) = (event.vessel_1_id, event.vessel_2_id);
    let from = event.start_time - Duration::hours(2);
    let to = event.end_time + Duration::hours(2);

    let has_dark_partner = !store.gaps_overlapping(v1, from, to).is_empty()
        || !store.gaps_overlapping(v2, from, to).is_empty();
    if has_dark_partner {
        let bonus = scoring.get("sts", "one_vessel_dark_during_proximity", 15.0) as i32;
        if let Some(event) = store.sts_mut(sts_id) {
            event.risk_score_component += bonus;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AisClass, Corridor, CorridorType, GapEvent, GapStatus};
    use chrono::TimeZone;

    fn ts(mins: i64) -> DateTime<Utc> {
        // Aligned to a 15-minute boundary so bucket math is exact
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::minutes(mins)
    }

    fn tanker(store: &mut Store, mmsi: &str) -> i64 {
        let v = store.create_vessel(mmsi);
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.vessel_type = Some("crude oil tanker".to_string());
            vessel.deadweight = Some(100_000.0);
        }
        v
    }

    fn laconian_sts_zone(store: &mut Store) -> i64 {
        store.add_corridor(Corridor {
            corridor_id: 0,
            name: "Laconian Gulf STS anchorage".to_string(),
            corridor_type: CorridorType::StsZone,
            risk_weight: 2.0,
            is_jamming_zone: false,
            description: None,
            geometry: "POLYGON((22.0 36.0, 23.0 36.0, 23.0 37.0, 22.0 37.0, 22.0 36.0))"
                .to_string(),
            tags: Default::default(),
        })
    }

    fn index(store: &Store) -> CorridorIndex {
        let list: Vec<Corridor> = store.corridors().into_iter().cloned().collect();
        CorridorIndex::build(&list)
    }

    /// Two tankers side by side, sog < 1, parallel headings, every 5 min
    /// for three hours.
    #[test]
    fn parallel_stationary_pair_creates_visible_visible_event() {
        let mut store = Store::new();
        laconian_sts_zone(&mut store);
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");

        for i in 0..36 {
            let t = ts(i * 5);
            store.add_ais_point(v1, t, 36.5, 22.5, Some(0.3), Some(90.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, 36.50005, 22.50005, Some(0.3), Some(90.0), None, None, None, AisClass::A);
        }

        let corridors = index(&store);
        let settings = Settings::default();
        let scoring = ScoringConfig::default();
        let counts = detect_sts_events(&mut store, &settings, &corridors, &scoring);

        assert_eq!(counts["phase_a"], 1);
        let events = store.sts_for_vessel(v1);
        assert_eq!(events.len(), 1);
        let event = events[0];
        assert_eq!(event.detection_type, StsDetectionType::VisibleVisible);
        assert!(event.vessel_1_id < event.vessel_2_id);
        assert_eq!(event.risk_score_component, RISK_STS_ZONE);
        assert!(event.duration_minutes >= 120);
        assert!(event.corridor_id.is_some());
    }

    #[test]
    fn moving_pair_is_rejected() {
        let mut store = Store::new();
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");
        for i in 0..36 {
            let t = ts(i * 5);
            store.add_ais_point(v1, t, 36.5, 22.5, Some(5.0), Some(90.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, 36.50005, 22.50005, Some(5.0), Some(90.0), None, None, None, AisClass::A);
        }
        let corridors = index(&store);
        let counts = detect_sts_events(&mut store, &Settings::default(), &corridors, &ScoringConfig::default());
        assert_eq!(counts["sts_events_created"], 0);
    }

    #[test]
    fn perpendicular_headings_are_rejected() {
        let mut store = Store::new();
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");
        for i in 0..36 {
            let t = ts(i * 5);
            store.add_ais_point(v1, t, 36.5, 22.5, Some(0.3), Some(0.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, 36.50005, 22.50005, Some(0.3), Some(90.0), None, None, None, AisClass::A);
        }
        let corridors = index(&store);
        let counts = detect_sts_events(&mut store, &Settings::default(), &corridors, &ScoringConfig::default());
        assert_eq!(counts["sts_events_created"], 0);
    }

    #[test]
    fn anti_parallel_headings_pass() {
        let mut store = Store::new();
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");
        for i in 0..36 {
            let t = ts(i * 5);
            store.add_ais_point(v1, t, 36.5, 22.5, Some(0.3), Some(85.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, 36.50005, 22.50005, Some(0.3), Some(265.0), None, None, None, AisClass::A);
        }
        let corridors = index(&store);
        let counts = detect_sts_events(&mut store, &Settings::default(), &corridors, &ScoringConfig::default());
        assert_eq!(counts["phase_a"], 1);
        // Outside any STS zone → lower component
        let events = store.sts_for_vessel(v1);
        assert_eq!(events[0].risk_score_component, RISK_NO_ZONE);
    }

    #[test]
    fn rerun_dedups_on_overlap() {
        let mut store = Store::new();
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");
        for i in 0..36 {
            let t = ts(i * 5);
            store.add_ais_point(v1, t, 36.5, 22.5, Some(0.3), Some(90.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, 36.50005, 22.50005, Some(0.3), Some(90.0), None, None, None, AisClass::A);
        }
        let corridors = index(&store);
        let settings = Settings::default();
        let scoring = ScoringConfig::default();
        detect_sts_events(&mut store, &settings, &corridors, &scoring);
        let counts = detect_sts_events(&mut store, &settings, &corridors, &scoring);
        assert_eq!(counts["sts_events_created"], 0);
        assert_eq!(store.sts_count(), 1);
    }

    #[test]
    fn phase_b_detects_intercept_course() {
        let mut store = Store::new();
        laconian_sts_zone(&mut store);
        let stationary = tanker(&mut store, "211000001");
        let approaching = tanker(&mut store, "572000002");

        // Stationary inside the zone
        store.add_ais_point(stationary, ts(0), 36.5, 22.5, Some(0.2), Some(0.0), None, None, None, AisClass::A);
        // ~3 NM due south, heading north at 2 kn → ETA ≈ 90 min
        store.add_ais_point(approaching, ts(0), 36.45, 22.5, Some(2.0), Some(0.0), None, None, None, AisClass::A);

        let corridors = index(&store);
        let counts = detect_sts_events(&mut store, &Settings::default(), &corridors, &ScoringConfig::default());
        assert_eq!(counts["phase_b"], 1);
        let events = store.sts_for_vessel(stationary);
        let event = events[0];
        assert_eq!(event.detection_type, StsDetectionType::Approaching);
        assert_eq!(event.risk_score_component, RISK_APPROACHING);
        let eta = event.eta_minutes.expect("approaching events carry an ETA");
        assert!(eta < STS_ETA_MAX_MINUTES);
    }

    #[test]
    fn dark_partner_bonus_applies_on_overlapping_gap() {
        let mut store = Store::new();
        let v1 = tanker(&mut store, "211000001");
        let v2 = tanker(&mut store, "572000002");

        // Pre-existing gap on v2 overlapping the proximity window
        let gap_id = store.alloc_gap_id();
        store.add_gap(GapEvent {
            gap_event_id: gap_id,
            vessel_id: v2,
            original_vessel_id: Some(v2),
            gap_start: ts(-60),
            gap_end: ts(30),
            duration_minutes: 90,
            start_point_id: None,
            end_point_id: None,
            corridor_id: None,
            dark_zone_id: None,
            in_dark_zone: false,
            impossible_speed_flag: false,
            velocity_plausibility_ratio: 0.2,
            max_plausible_distance_nm: 40.0,
            actual_gap_distance_nm: 8.0,
            pre_gap_sog: None,
            risk_score: 0,
            risk_breakdown: None,
            status: GapStatus::New,
        });

        for i in 0..36 {
            let t = ts(i * 5);
            store.add_ais_point(v1, t, 36.5, 22.5, Some(0.3), Some(90.0), None, None, None, AisClass::A);
            store.add_ais_point(v2, t, 36.50005, 22.50005, Some(0.3), Some(90.0), None, None, None, AisClass::A);
        }
        let corridors = index(&store);
        detect_sts_events(&mut store, &Settings::default(), &corridors, &ScoringConfig::default());
        let events = store.sts_for_vessel(v1);
        assert_eq!(events[0].risk_score_component, RISK_NO_ZONE + 15);
    }
}
