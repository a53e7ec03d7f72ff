//! AIS spoofing detection.
//!
//! Typologies covered by this pass:
//! - `mmsi_reuse`: implied speed > 30 kn between consecutive points
//! - `dual_transmission`: two points < 30 min apart with impossible
//!   implied speed — two physical transmitters on one MMSI
//! - `nav_status_mismatch`: "at anchor" while making way
//! - `anchor_spoof`: anchored ≥ 72 h away from any port or anchorage
//! - `circle_spoof`: reported speed without displacement (tight cluster)
//! - `erratic_nav_status`: status oscillation, extended restricted
//!   maneuverability, and the undefined status 15 (tanker sub-types)
//! - `slow_roll`: tanker creeping at 0.5-2 kn for ≥ 12 h offshore
//! - `stale_ais_data`: frozen heading/SOG/COG while underway (gated)
//!
//! Every typology dedups on (vessel, type, start time).

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use statrs::statistics::{Data, OrderStatistics, Statistics};
use tracing::info;

use super::{is_near_major_port, StepCounts};
use crate::classify::is_tanker_type;
use crate::config::defaults::{
    CIRCLE_SPOOF_MIN_POINTS, CIRCLE_SPOOF_WINDOW_HOURS, STALE_AIS_MIN_CONSECUTIVE,
    STALE_AIS_MIN_SPAN_HOURS,
};
use crate::config::{DetectionConfig, Settings};
use crate::corridor::CorridorIndex;
use crate::geo::haversine_nm;
use crate::store::Store;
use crate::types::{SpoofingAnomaly, SpoofingType};

/// Lightweight point snapshot used by the pass (avoids holding store
/// borrows across mutation).
#[derive(Clone, Copy)]
struct Snap {
    ts: DateTime<Utc>,
    lat: f64,
    lon: f64,
    sog: Option<f64>,
    cog: Option<f64>,
    heading: Option<f64>,
    nav_status: Option<u8>,
}

/// A detection pending insert.
struct Pending {
    anomaly_type: SpoofingType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    implied_speed_kn: Option<f64>,
    score: i32,
    evidence: serde_json::Value,
}

/// Run the spoofing pass over every vessel.
///
/// Returns `{anomalies_detected}`.
pub fn run_spoofing_detection(
    store: &mut Store,
    settings: &Settings,
    corridors: &CorridorIndex,
    now: DateTime<Utc>,
) -> StepCounts {
    let vessel_ids = store.vessel_ids();
    let mut created = 0_i64;

    for vessel_id in vessel_ids {
        let snaps: Vec<Snap> = store
            .points_for_vessel(vessel_id)
            .iter()
            .map(|p| Snap {
                ts: p.timestamp,
                lat: p.lat,
                lon: p.lon,
                sog: p.sog,
                cog: p.cog,
                heading: p.heading,
                nav_status: p.nav_status,
            })
            .collect();
        if snaps.len() < 2 {
            continue;
        }

        let tanker = store.vessel(vessel_id).is_some_and(is_tanker_type);

        let det = &settings.detection;
        let mut pending: Vec<Pending> = Vec::new();
        detect_mmsi_reuse(&snaps, det.mmsi_reuse_speed_kn, &mut pending);
        detect_dual_transmission(&snaps, det.mmsi_reuse_speed_kn, &mut pending);
        detect_nav_status_mismatch(&snaps, &mut pending);
        detect_anchor_spoof(store, corridors, det, &snaps, &mut pending);
        detect_circle_spoof(store, det.port_proximity_nm, &snaps, &mut pending);
        detect_erratic_nav_status(&snaps, tanker, &mut pending);
        if tanker {
            detect_slow_roll(store, det, &snaps, &mut pending);
        }

        for p in pending {
            if store.anomaly_exists(vessel_id, p.anomaly_type, p.start) {
                continue;
            }
            store.add_anomaly(SpoofingAnomaly {
                anomaly_id: 0,
                vessel_id,
                anomaly_type: p.anomaly_type,
                start_time: p.start,
                end_time: p.end,
                implied_speed_kn: p.implied_speed_kn,
                risk_score_component: p.score,
                evidence: p.evidence,
                gap_event_id: None,
                created_at: now,
            });
            created += 1;
        }
        store.commit("spoofing.vessel");
    }

    // Post-processing: link anomalies to their closest overlapping gap
    let linked = super::gap::link_anomalies_to_gaps(store);

    info!(anomalies = created, linked, "Spoofing detection complete");
    let mut counts = StepCounts::new();
    counts.insert("anomalies_detected".to_string(), created);
    counts.insert("anomalies_linked".to_string(), linked);
    counts
}

/// Implied speed between two snapshots (knots); None when Δt ≤ 0.
fn implied_speed(a: &Snap, b: &Snap) -> Option<f64> {
    let dt_h = (b.ts - a.ts).num_seconds() as f64 / 3600.0;
    if dt_h <= 0.0 {
        return None;
    }
    Some(haversine_nm(a.lat, a.lon, b.lat, b.lon) / dt_h)
}

fn detect_mmsi_reuse(snaps: &[Snap], reuse_speed_kn: f64, out: &mut Vec<Pending>) {
    for pair in snaps.windows(2) {
        let (p1, p2) = (&pair[0], &pair[1]);
        let Some(speed) = implied_speed(p1, p2) else {
            continue;
        };
        if speed > reuse_speed_kn {
            let dist_nm = haversine_nm(p1.lat, p1.lon, p2.lat, p2.lon);
            let score = if speed > 100.0 { 55 } else { 40 };
            out.push(Pending {
                anomaly_type: SpoofingType::MmsiReuse,
                start: p1.ts,
                end: p2.ts,
                implied_speed_kn: Some(speed),
                score,
                evidence: json!({"implied_speed_kn": speed, "dist_nm": dist_nm}),
            });
        }
    }
}

fn detect_dual_transmission(snaps: &[Snap], reuse_speed_kn: f64, out: &mut Vec<Pending>) {
    const MAX_DELTA_MIN: i64 = 30;
    for i in 0..snaps.len() {
        let anchor = &snaps[i];
        let window_end = anchor.ts + Duration::hours(1);
        for candidate in snaps.iter().skip(i + 1) {
            if candidate.ts > window_end {
                break;
            }
            let dt_s = (candidate.ts - anchor.ts).num_seconds();
            if dt_s <= 0 || dt_s > MAX_DELTA_MIN * 60 {
                continue;
            }
            let Some(speed) = implied_speed(anchor, candidate) else {
                continue;
            };
            if speed > reuse_speed_kn {
                let dist_nm = haversine_nm(anchor.lat, anchor.lon, candidate.lat, candidate.lon);
                out.push(Pending {
                    anomaly_type: SpoofingType::DualTransmission,
                    start: anchor.ts,
                    end: candidate.ts,
                    implied_speed_kn: Some(speed),
                    score: 30,
                    evidence: json!({
                        "implied_speed_kn": (speed * 10.0).round() / 10.0,
                        "delta_minutes": (dt_s as f64 / 60.0 * 10.0).round() / 10.0,
                        "dist_nm": (dist_nm * 10.0).round() / 10.0,
                    }),
                });
                break; // one detection per anchor point
            }
        }
    }
}

fn detect_nav_status_mismatch(snaps: &[Snap], out: &mut Vec<Pending>) {
    for p in snaps {
        if p.nav_status == Some(1) && p.sog.is_some_and(|s| s > 2.0) {
            out.push(Pending {
                anomaly_type: SpoofingType::NavStatusMismatch,
                start: p.ts,
                end: p.ts,
                implied_speed_kn: None,
                score: 15,
                evidence: json!({"nav_status": 1, "sog": p.sog}),
            });
        }
    }
}

fn detect_anchor_spoof(
    store: &Store,
    corridors: &CorridorIndex,
    det: &DetectionConfig,
    snaps: &[Snap],
    out: &mut Vec<Pending>,
) {
    let mut run: Vec<&Snap> = Vec::new();
    // Trailing sentinel flushes the final run
    for p in snaps.iter().map(Some).chain(std::iter::once(None)) {
        let in_run = p.is_some_and(|p| {
            p.nav_status == Some(1) && p.sog.map_or(true, |s| s < 0.1)
        });
        if in_run {
            if let Some(p) = p {
                run.push(p);
            }
            continue;
        }
        if run.len() >= 2 {
            let run_hours = (run[run.len() - 1].ts - run[0].ts).num_seconds() as f64 / 3600.0;
            if run_hours >= det.anchor_spoof_min_hours {
                let mean_lat = run.iter().map(|p| p.lat).sum::<f64>() / run.len() as f64;
                let mean_lon = run.iter().map(|p| p.lon).sum::<f64>() / run.len() as f64;
                // Designated waiting anchorages are corridors, not ports;
                // a legitimate 72h anchorage stay must not fire.
                let near_port = is_near_major_port(store, mean_lat, mean_lon, det.port_proximity_nm);
                let in_anchorage = corridors.in_anchorage(mean_lat, mean_lon);
                if !near_port && !in_anchorage {
                    out.push(Pending {
                        anomaly_type: SpoofingType::AnchorSpoof,
                        start: run[0].ts,
                        end: run[run.len() - 1].ts,
                        implied_speed_kn: None,
                        score: 20,
                        evidence: json!({
                            "run_hours": run_hours,
                            "mean_lat": mean_lat,
                            "mean_lon": mean_lon,
                        }),
                    });
                }
            }
        }
        run.clear();
    }
}

fn detect_circle_spoof(store: &Store, port_proximity_nm: f64, snaps: &[Snap], out: &mut Vec<Pending>) {
    if snaps.len() < CIRCLE_SPOOF_MIN_POINTS {
        return;
    }
    for i in 0..snaps.len() {
        let window_end = snaps[i].ts + Duration::seconds((CIRCLE_SPOOF_WINDOW_HOURS * 3600.0) as i64);
        let window: Vec<&Snap> = snaps[i..].iter().take_while(|p| p.ts <= window_end).collect();
        if window.len() < CIRCLE_SPOOF_MIN_POINTS {
            continue;
        }
        let window_hours =
            (window[window.len() - 1].ts - window[0].ts).num_seconds() as f64 / 3600.0;
        if !(4.0..=8.0).contains(&window_hours) {
            continue;
        }
        let sogs: Vec<f64> = window.iter().filter_map(|p| p.sog).collect();
        if sogs.is_empty() || Data::new(sogs.clone()).median() <= 3.0 {
            continue;
        }
        let lats: Vec<f64> = window.iter().map(|p| p.lat).collect();
        let lons: Vec<f64> = window.iter().map(|p| p.lon).collect();
        let std_lat = lats.clone().std_dev();
        let std_lon = lons.clone().std_dev();
        let mean_lat = lats.mean();
        let mean_lon = lons.mean();
        let std_lon_corrected = std_lon * mean_lat.to_radians().cos();
        // Latitude-scaled threshold: caps near ~0.067° at high latitudes
        let lat_scale = mean_lat.to_radians().cos().max(0.3);
        let threshold = 0.02 / lat_scale;
        if std_lat < threshold
            && std_lon_corrected < threshold
            && !is_near_major_port(store, mean_lat, mean_lon, port_proximity_nm)
        {
            out.push(Pending {
                anomaly_type: SpoofingType::CircleSpoof,
                start: window[0].ts,
                end: window[window.len() - 1].ts,
                implied_speed_kn: None,
                score: 35,
                evidence: json!({
                    "std_lat": std_lat,
                    "std_lon_corrected": std_lon_corrected,
                    "median_sog": Data::new(sogs).median(),
                }),
            });
        }
    }
}

fn detect_erratic_nav_status(snaps: &[Snap], tanker: bool, out: &mut Vec<Pending>) {
    // 6a: ≥3 status changes inside a 60-minute window; consecutive
    // triggering windows collapse into one episode.
    let window = Duration::minutes(60);
    let mut i = 0;
    while i + 1 < snaps.len() {
        let window_end = snaps[i].ts + window;
        let in_window: Vec<&Snap> = snaps[i..].iter().take_while(|p| p.ts <= window_end).collect();
        if in_window.len() >= 2 {
            let statuses: Vec<u8> = in_window.iter().filter_map(|p| p.nav_status).collect();
            let changes = statuses.windows(2).filter(|w| w[0] != w[1]).count();
            if changes >= 3 {
                out.push(Pending {
                    anomaly_type: SpoofingType::ErraticNavStatus,
                    start: snaps[i].ts,
                    end: in_window[in_window.len() - 1].ts,
                    implied_speed_kn: None,
                    score: 12,
                    evidence: json!({
                        "subtype": "erratic_changes",
                        "status_changes": changes,
                        "window_minutes": 60,
                    }),
                });
                // Advance past the entire continuous episode
                let mut episode_end = last_index_within(snaps, window_end);
                while episode_end + 1 < snaps.len() - 1 {
                    let next_i = episode_end + 1;
                    let next_we = snaps[next_i].ts + window;
                    let next_win: Vec<&Snap> =
                        snaps[next_i..].iter().take_while(|p| p.ts <= next_we).collect();
                    if next_win.len() >= 2 {
                        let sv: Vec<u8> = next_win.iter().filter_map(|p| p.nav_status).collect();
                        let ch = sv.windows(2).filter(|w| w[0] != w[1]).count();
                        if ch >= 3 {
                            episode_end = last_index_within(snaps, next_we);
                            continue;
                        }
                    }
                    break;
                }
                i = episode_end + 1;
                continue;
            }
        }
        i += 1;
    }

    if !tanker {
        return;
    }

    // 6b: extended restricted maneuverability (nav_status=3 for ≥ 6 h)
    let mut run: Vec<&Snap> = Vec::new();
    for p in snaps.iter().map(Some).chain(std::iter::once(None)) {
        if p.is_some_and(|p| p.nav_status == Some(3)) {
            if let Some(p) = p {
                run.push(p);
            }
            continue;
        }
        if run.len() >= 2 {
            let run_hours = (run[run.len() - 1].ts - run[0].ts).num_seconds() as f64 / 3600.0;
            if run_hours >= 6.0 {
                out.push(Pending {
                    anomaly_type: SpoofingType::ErraticNavStatus,
                    start: run[0].ts,
                    end: run[run.len() - 1].ts,
                    implied_speed_kn: None,
                    score: 8,
                    evidence: json!({
                        "subtype": "extended_restricted",
                        "hours": (run_hours * 10.0).round() / 10.0,
                    }),
                });
            }
        }
        run.clear();
    }

    // 6c: undefined nav_status 15 on a tanker
    for p in snaps {
        if p.nav_status == Some(15) {
            out.push(Pending {
                anomaly_type: SpoofingType::ErraticNavStatus,
                start: p.ts,
                end: p.ts,
                implied_speed_kn: None,
                score: 5,
                evidence: json!({"subtype": "nav_status_15"}),
            });
        }
    }
}

/// Largest index whose timestamp is ≤ the bound.
fn last_index_within(snaps: &[Snap], bound: DateTime<Utc>) -> usize {
    snaps
        .iter()
        .enumerate()
        .filter(|(_, p)| p.ts <= bound)
        .map(|(idx, _)| idx)
        .last()
        .unwrap_or(0)
}

fn detect_slow_roll(store: &Store, det: &DetectionConfig, snaps: &[Snap], out: &mut Vec<Pending>) {
    let mut run: Vec<&Snap> = Vec::new();
    for p in snaps.iter().map(Some).chain(std::iter::once(None)) {
        if p.is_some_and(|p| p.sog.is_some_and(|s| (0.5..=2.0).contains(&s))) {
            if let Some(p) = p {
                run.push(p);
            }
            continue;
        }
        if run.len() >= 2 {
            let run_hours = (run[run.len() - 1].ts - run[0].ts).num_seconds() as f64 / 3600.0;
            if run_hours >= det.slow_roll_min_hours
                && !run
                    .iter()
                    .any(|p| is_near_major_port(store, p.lat, p.lon, det.port_proximity_nm))
            {
                out.push(Pending {
                    anomaly_type: SpoofingType::SlowRoll,
                    start: run[0].ts,
                    end: run[run.len() - 1].ts,
                    implied_speed_kn: None,
                    score: 12,
                    evidence: json!({"run_hours": run_hours}),
                });
            }
        }
        run.clear();
    }
}

/// Detect frozen transponder data: heading, SOG and COG all identical
/// across ≥ 10 consecutive underway points spanning ≥ 2 h.
///
/// Gated by `features.stale_ais_detection_enabled`.
pub fn detect_stale_ais_data(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.stale_ais_detection_enabled {
        counts.insert("stale_ais_anomalies".to_string(), 0);
        counts.insert("skipped".to_string(), 1);
        return counts;
    }

    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        let snaps: Vec<Snap> = store
            .points_for_vessel(vessel_id)
            .iter()
            .map(|p| Snap {
                ts: p.timestamp,
                lat: p.lat,
                lon: p.lon,
                sog: p.sog,
                cog: p.cog,
                heading: p.heading,
                nav_status: p.nav_status,
            })
            .collect();
        if snaps.len() < STALE_AIS_MIN_CONSECUTIVE {
            continue;
        }

        let mut pending: Vec<Pending> = Vec::new();
        let mut run_start = 0;
        for i in 1..=snaps.len() {
            let frozen = i < snaps.len() && {
                let (prev, curr) = (&snaps[i - 1], &snaps[i]);
                let same_heading =
                    prev.heading.is_some() && curr.heading.is_some() && prev.heading == curr.heading;
                let same_sog = prev.sog.is_some() && curr.sog.is_some() && prev.sog == curr.sog;
                let same_cog = prev.cog.is_some() && curr.cog.is_some() && prev.cog == curr.cog;
                let underway = curr.sog.is_some_and(|s| s > 0.5);
                same_heading && same_sog && same_cog && underway
            };
            if frozen {
                continue;
            }
            let run_len = i - run_start;
            if run_len >= STALE_AIS_MIN_CONSECUTIVE {
                let span_hours =
                    (snaps[i - 1].ts - snaps[run_start].ts).num_seconds() as f64 / 3600.0;
                if span_hours >= STALE_AIS_MIN_SPAN_HOURS
                    && snaps[run_start].sog.is_some_and(|s| s > 0.5)
                {
                    pending.push(Pending {
                        anomaly_type: SpoofingType::StaleAisData,
                        start: snaps[run_start].ts,
                        end: snaps[i - 1].ts,
                        implied_speed_kn: None,
                        score: 20,
                        evidence: json!({
                            "consecutive_count": run_len,
                            "span_hours": (span_hours * 100.0).round() / 100.0,
                            "frozen_sog": snaps[run_start].sog,
                            "frozen_cog": snaps[run_start].cog,
                            "frozen_heading": snaps[run_start].heading,
                        }),
                    });
                }
            }
            run_start = i;
        }

        for p in pending {
            if store.anomaly_exists(vessel_id, SpoofingType::StaleAisData, p.start) {
                continue;
            }
            store.add_anomaly(SpoofingAnomaly {
                anomaly_id: 0,
                vessel_id,
                anomaly_type: p.anomaly_type,
                start_time: p.start,
                end_time: p.end,
                implied_speed_kn: None,
                risk_score_component: p.score,
                evidence: p.evidence,
                gap_event_id: None,
                created_at: now,
            });
            created += 1;
        }
    }
    store.commit("stale_ais_detection");

    info!(anomalies = created, "Stale AIS detection complete");
    counts.insert("stale_ais_anomalies".to_string(), created);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AisClass;
    use chrono::TimeZone;

    fn ts(mins: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::minutes(mins)
    }

    fn tanker_vessel(store: &mut Store) -> i64 {
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.vessel_type = Some("crude oil tanker".to_string());
            vessel.deadweight = Some(100_000.0);
        }
        v
    }

    #[allow(clippy::too_many_arguments)]
    fn add_point(
        store: &mut Store,
        v: i64,
        mins: i64,
        lat: f64,
        lon: f64,
        sog: f64,
        nav: Option<u8>,
    ) {
        store.add_ais_point(
            v,
            ts(mins),
            lat,
            lon,
            Some(sog),
            Some(90.0),
            Some(90.0),
            None,
            nav,
            AisClass::A,
        );
    }

    fn run(store: &mut Store) -> StepCounts {
        let settings = Settings::default();
        let corridors = CorridorIndex::default();
        run_spoofing_detection(store, &settings, &corridors, ts(0))
    }

    #[test]
    fn mmsi_reuse_fires_on_teleport() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        // 60 NM in 30 minutes → 120 kn implied
        add_point(&mut store, v, 0, 55.0, 20.0, 10.0, Some(0));
        add_point(&mut store, v, 30, 56.0, 20.0, 10.0, Some(0));
        run(&mut store);

        let reuse = store.anomalies_of_type(SpoofingType::MmsiReuse);
        assert_eq!(reuse.len(), 1);
        assert_eq!(reuse[0].risk_score_component, 55); // > 100 kn
        // Dual transmission also fires: < 30 min apart with > 30 kn
        assert_eq!(store.anomalies_of_type(SpoofingType::DualTransmission).len(), 1);
    }

    #[test]
    fn nav_status_mismatch_fires_at_anchor_underway() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        add_point(&mut store, v, 0, 55.0, 20.0, 5.0, Some(1));
        add_point(&mut store, v, 10, 55.01, 20.0, 5.0, Some(0));
        run(&mut store);
        assert_eq!(store.anomalies_of_type(SpoofingType::NavStatusMismatch).len(), 1);
    }

    #[test]
    fn anchor_spoof_requires_72h_offshore() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        // 75 h at anchor, far from any port (none loaded)
        for h in 0..=75 {
            add_point(&mut store, v, h * 60, 40.0, -30.0, 0.0, Some(1));
        }
        // Terminator point breaks the run
        add_point(&mut store, v, 76 * 60, 40.0, -30.0, 8.0, Some(0));
        run(&mut store);
        let anomalies = store.anomalies_of_type(SpoofingType::AnchorSpoof);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].risk_score_component, 20);
    }

    #[test]
    fn anchor_spoof_suppressed_inside_anchorage_corridor() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        store.add_corridor(crate::types::Corridor {
            corridor_id: 0,
            name: "Laconian Gulf STS anchorage".to_string(),
            corridor_type: crate::types::CorridorType::AnchorageHolding,
            risk_weight: 1.0,
            is_jamming_zone: false,
            description: None,
            geometry: "POLYGON((22.0 36.0, 23.0 36.0, 23.0 37.0, 22.0 37.0, 22.0 36.0))"
                .to_string(),
            tags: Default::default(),
        });
        for h in 0..=75 {
            add_point(&mut store, v, h * 60, 36.5, 22.5, 0.0, Some(1));
        }
        add_point(&mut store, v, 76 * 60, 36.5, 22.5, 8.0, Some(0));

        let settings = Settings::default();
        let corridor_list: Vec<crate::types::Corridor> =
            store.corridors().into_iter().cloned().collect();
        let corridors = CorridorIndex::build(&corridor_list);
        run_spoofing_detection(&mut store, &settings, &corridors, ts(0));
        assert!(store.anomalies_of_type(SpoofingType::AnchorSpoof).is_empty());
    }

    #[test]
    fn circle_spoof_fires_on_speed_without_displacement() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        // 5 h of points every 30 min, sog 6 kn, positions jittering < 0.005°
        for i in 0..11 {
            let jitter = (i % 3) as f64 * 0.003;
            add_point(&mut store, v, i * 30, 40.0 + jitter, -30.0 + jitter, 6.0, Some(0));
        }
        run(&mut store);
        assert!(!store.anomalies_of_type(SpoofingType::CircleSpoof).is_empty());
    }

    #[test]
    fn erratic_nav_status_collapses_episode() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        // Status oscillates every 10 minutes for 2 hours — one episode
        for i in 0..13 {
            let status = if i % 2 == 0 { 0 } else { 1 };
            // sog 0.3: below mismatch threshold, outside slow-roll band
            add_point(&mut store, v, i * 10, 55.0, 20.0, 0.3, Some(status));
        }
        run(&mut store);
        let erratic: Vec<_> = store
            .anomalies_of_type(SpoofingType::ErraticNavStatus)
            .into_iter()
            .filter(|a| a.evidence["subtype"] == "erratic_changes")
            .collect();
        assert_eq!(erratic.len(), 1, "continuous oscillation must collapse to one episode");
        assert_eq!(erratic[0].risk_score_component, 12);
    }

    #[test]
    fn slow_roll_fires_for_tanker_only() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        for h in 0..=13 {
            add_point(&mut store, v, h * 60, 40.0, -30.0, 1.0, Some(0));
        }
        add_point(&mut store, v, 14 * 60, 40.0, -30.0, 8.0, Some(0));
        run(&mut store);
        assert_eq!(store.anomalies_of_type(SpoofingType::SlowRoll).len(), 1);

        // Same trace on a non-tanker: nothing
        let mut store2 = Store::new();
        let v2 = store2.create_vessel("211000002");
        if let Some(vessel) = store2.vessel_mut(v2) {
            vessel.vessel_type = Some("fishing vessel".to_string());
        }
        for h in 0..=13 {
            add_point(&mut store2, v2, h * 60, 40.0, -30.0, 1.0, Some(0));
        }
        add_point(&mut store2, v2, 14 * 60, 40.0, -30.0, 8.0, Some(0));
        run(&mut store2);
        assert!(store2.anomalies_of_type(SpoofingType::SlowRoll).is_empty());
    }

    #[test]
    fn thresholds_come_from_settings() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        // 60 NM in 30 minutes → 120 kn implied
        add_point(&mut store, v, 0, 55.0, 20.0, 10.0, Some(0));
        add_point(&mut store, v, 30, 56.0, 20.0, 10.0, Some(0));

        // Raising the reuse threshold above the implied speed silences
        // both the reuse and dual-transmission typologies
        let mut settings = Settings::default();
        settings.detection.mmsi_reuse_speed_kn = 200.0;
        let corridors = CorridorIndex::default();
        run_spoofing_detection(&mut store, &settings, &corridors, ts(0));
        assert!(store.anomalies_of_type(SpoofingType::MmsiReuse).is_empty());
        assert!(store.anomalies_of_type(SpoofingType::DualTransmission).is_empty());
    }

    #[test]
    fn rerun_is_idempotent() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        add_point(&mut store, v, 0, 55.0, 20.0, 5.0, Some(1));
        add_point(&mut store, v, 10, 55.01, 20.0, 5.0, Some(0));
        run(&mut store);
        let first = store.anomaly_count();
        run(&mut store);
        assert_eq!(store.anomaly_count(), first);
    }

    #[test]
    fn stale_ais_gated_by_feature_flag() {
        let mut store = Store::new();
        let v = tanker_vessel(&mut store);
        for i in 0..12 {
            // Identical heading/sog/cog, underway, spanning 2.75 h
            add_point(&mut store, v, i * 15, 55.0 + i as f64 * 0.02, 20.0, 9.0, Some(0));
        }
        let mut settings = Settings::default();
        let counts = detect_stale_ais_data(&mut store, &settings, ts(0));
        assert_eq!(counts["stale_ais_anomalies"], 0);
        assert_eq!(counts.get("skipped"), Some(&1));

        settings.features.stale_ais_detection_enabled = true;
        let counts = detect_stale_ais_data(&mut store, &settings, ts(0));
        assert_eq!(counts["stale_ais_anomalies"], 1);
        let anomaly = &store.anomalies_of_type(SpoofingType::StaleAisData)[0];
        assert_eq!(anomaly.risk_score_component, 20);
        assert_eq!(anomaly.evidence["consecutive_count"], 12);
    }
}
