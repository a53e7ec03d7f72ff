//! AIS gap detection.
//!
//! A gap is a time delta between consecutive AIS points at or above the
//! configured minimum (default 2 h, boundary inclusive). Each gap gets a
//! movement envelope describing where the vessel could plausibly have
//! been while silent.

use chrono::Duration;
use tracing::{info, warn};

use super::{interpolation, StepCounts};
use crate::classify::{class_speed, max_plausible_distance_nm};
use crate::config::defaults::{
    ENVELOPE_SEMI_MAJOR_FRACTION, ENVELOPE_SEMI_MINOR_FRACTION, GAP_DEDUP_WINDOW_MINUTES,
    IMPOSSIBLE_SPEED_RATIO,
};
use crate::config::Settings;
use crate::corridor::CorridorIndex;
use crate::geo::{ellipse_wkt, haversine_nm};
use crate::store::Store;
use crate::types::{EnvelopeMethod, GapEvent, GapStatus, MovementEnvelope};

/// Run gap detection across all vessels.
///
/// Returns `{gaps_detected, vessels_processed}`.
pub fn run_gap_detection(
    store: &mut Store,
    settings: &Settings,
    corridors: &CorridorIndex,
) -> StepCounts {
    if store.corridor_count() == 0 {
        warn!(
            "No corridors loaded! All gaps will miss corridor multipliers — \
             import corridor definitions first."
        );
    }

    let vessel_ids = store.vessel_ids();
    let mut total_gaps = 0_i64;

    for vessel_id in &vessel_ids {
        total_gaps += detect_gaps_for_vessel(store, settings, corridors, *vessel_id);
        store.commit("gap_detection.vessel");
    }

    info!(
        gaps = total_gaps,
        vessels = vessel_ids.len(),
        "Gap detection complete"
    );
    let mut counts = StepCounts::new();
    counts.insert("gaps_detected".to_string(), total_gaps);
    counts.insert("vessels_processed".to_string(), vessel_ids.len() as i64);
    counts
}

/// Detect AIS gaps for a single vessel. Returns the count of new gaps.
pub fn detect_gaps_for_vessel(
    store: &mut Store,
    settings: &Settings,
    corridors: &CorridorIndex,
    vessel_id: i64,
) -> i64 {
    let dwt = store.vessel(vessel_id).and_then(|v| v.deadweight);

    // Consecutive-pair candidates collected first; mutation after.
    struct Candidate {
        start_point_id: i64,
        end_point_id: i64,
        start_ts: chrono::DateTime<chrono::Utc>,
        end_ts: chrono::DateTime<chrono::Utc>,
        start_lat: f64,
        start_lon: f64,
        end_lat: f64,
        end_lon: f64,
        pre_gap_sog: Option<f64>,
        start_cog: Option<f64>,
        start_heading: Option<f64>,
        end_sog: Option<f64>,
        end_cog: Option<f64>,
    }

    let min_gap_seconds = settings.detection.gap_min_hours * 3600.0;
    let noise_floor = settings.detection.class_b_noise_filter_seconds;

    let candidates: Vec<Candidate> = {
        let points = store.points_for_vessel(vessel_id);
        if points.len() < 2 {
            return 0;
        }
        points
            .windows(2)
            .filter_map(|pair| {
                let (p1, p2) = (pair[0], pair[1]);
                let delta_seconds = (p2.timestamp - p1.timestamp).num_seconds() as f64;

                // Class B noise filter — skip artifact-level intervals
                if delta_seconds < noise_floor {
                    return None;
                }
                if delta_seconds < min_gap_seconds {
                    return None;
                }
                Some(Candidate {
                    start_point_id: p1.point_id,
                    end_point_id: p2.point_id,
                    start_ts: p1.timestamp,
                    end_ts: p2.timestamp,
                    start_lat: p1.lat,
                    start_lon: p1.lon,
                    end_lat: p2.lat,
                    end_lon: p2.lon,
                    pre_gap_sog: p1.sog,
                    start_cog: p1.cog,
                    start_heading: p1.heading,
                    end_sog: p2.sog,
                    end_cog: p2.cog,
                })
            })
            .collect()
    };

    let mut created = 0_i64;
    for c in candidates {
        // Dedup against prior runs and external gap imports
        if store.gap_exists_near_start(vessel_id, c.start_ts, GAP_DEDUP_WINDOW_MINUTES) {
            continue;
        }

        let delta_seconds = (c.end_ts - c.start_ts).num_seconds() as f64;
        let duration_minutes = (delta_seconds / 60.0) as i64;
        let duration_h = delta_seconds / 3600.0;
        let actual_distance = haversine_nm(c.start_lat, c.start_lon, c.end_lat, c.end_lon);
        let max_distance = max_plausible_distance_nm(dwt, duration_h);
        let ratio = if max_distance > 0.0 {
            actual_distance / max_distance
        } else {
            0.0
        };

        let corridor_id = corridors.find_corridor_for_point(c.start_lat, c.start_lon);
        let dark_zone_id = corridors.find_dark_zone_for_point(c.start_lat, c.start_lon);
        let in_dark_zone = dark_zone_id.is_some()
            || corridor_id
                .and_then(|id| store.corridor(id))
                .is_some_and(|corr| corr.is_jamming_zone);

        let gap_event_id = store.alloc_gap_id();
        let gap = GapEvent {
            gap_event_id,
            vessel_id,
            // Forward provenance for scoring — survives merges (I7)
            original_vessel_id: Some(vessel_id),
            gap_start: c.start_ts,
            gap_end: c.end_ts,
            duration_minutes,
            start_point_id: Some(c.start_point_id),
            end_point_id: Some(c.end_point_id),
            corridor_id,
            dark_zone_id,
            in_dark_zone,
            impossible_speed_flag: ratio > IMPOSSIBLE_SPEED_RATIO,
            velocity_plausibility_ratio: ratio,
            max_plausible_distance_nm: max_distance,
            actual_gap_distance_nm: actual_distance,
            pre_gap_sog: c.pre_gap_sog,
            risk_score: 0, // scoring runs separately
            risk_breakdown: None,
            status: GapStatus::New,
        };
        store.add_gap(gap);

        build_movement_envelope(
            store,
            gap_event_id,
            dwt,
            duration_h,
            max_distance,
            actual_distance,
            ratio,
            (c.start_lat, c.start_lon),
            (c.end_lat, c.end_lon),
            c.pre_gap_sog.unwrap_or(0.0),
            c.start_cog,
            c.start_heading,
            c.end_sog.unwrap_or(0.0),
            c.end_cog,
        );
        created += 1;
    }
    created
}

/// Build the movement envelope for a freshly-created gap.
#[allow(clippy::too_many_arguments)]
fn build_movement_envelope(
    store: &mut Store,
    gap_event_id: i64,
    dwt: Option<f64>,
    duration_h: f64,
    max_distance_nm: f64,
    actual_distance_nm: f64,
    ratio: f64,
    start: (f64, f64),
    end: (f64, f64),
    start_sog: f64,
    start_cog: Option<f64>,
    start_heading: Option<f64>,
    end_sog: f64,
    end_cog: Option<f64>,
) {
    let semi_major = ENVELOPE_SEMI_MAJOR_FRACTION * max_distance_nm;
    let semi_minor = ENVELOPE_SEMI_MINOR_FRACTION * max_distance_nm;
    let heading = start_cog.or(start_heading);

    let (method, positions) = if duration_h <= 2.0 {
        (
            EnvelopeMethod::Linear,
            interpolation::interpolate_linear(start.0, start.1, end.0, end.1),
        )
    } else if duration_h <= 6.0 {
        (
            EnvelopeMethod::Spline,
            interpolation::interpolate_hermite(
                start.0,
                start.1,
                end.0,
                end.1,
                start_sog,
                start_cog.unwrap_or(0.0),
                end_sog,
                end_cog.unwrap_or(0.0),
                duration_h,
            ),
        )
    } else {
        let max_speed = class_speed(dwt).0;
        (
            EnvelopeMethod::Kalman,
            interpolation::interpolate_scenarios(
                start.0,
                start.1,
                end.0,
                end.1,
                start_sog,
                start_cog.unwrap_or(0.0),
                max_speed,
                duration_h,
            ),
        )
    };

    let center_lat = (start.0 + end.0) / 2.0;
    let center_lon = (start.1 + end.1) / 2.0;
    let ellipse = ellipse_wkt(
        center_lat,
        center_lon,
        semi_major,
        semi_minor,
        heading.unwrap_or(0.0),
    );

    store.add_envelope(MovementEnvelope {
        envelope_id: 0,
        gap_event_id,
        max_plausible_distance_nm: max_distance_nm,
        actual_gap_distance_nm: actual_distance_nm,
        velocity_plausibility_ratio: ratio,
        semi_major_nm: semi_major,
        semi_minor_nm: semi_minor,
        heading_degrees: heading,
        method,
        interpolated_positions: positions,
        confidence_ellipse: Some(ellipse),
    });
}

/// Link unlinked spoofing anomalies to the nearest temporally-overlapping
/// gap event (±2 h window). Runs after spoofing detection.
pub fn link_anomalies_to_gaps(store: &mut Store) -> i64 {
    let window = Duration::hours(crate::config::defaults::ANOMALY_GAP_LINK_WINDOW_HOURS);
    let mut linked = 0_i64;

    for anomaly_id in store.unlinked_anomaly_ids() {
        let Some(anomaly) = store.anomaly(anomaly_id) else {
            continue;
        };
        let (vessel_id, a_start, a_end) = (anomaly.vessel_id, anomaly.start_time, anomaly.end_time);

        // Prefer the gap whose start is closest to the anomaly start
        let mut matches: Vec<(chrono::DateTime<chrono::Utc>, i64)> = store
            .gaps_overlapping(vessel_id, a_start - window, a_end + window)
            .iter()
            .map(|g| (g.gap_start, g.gap_event_id))
            .collect();
        matches.sort();

        if let Some((_, gap_id)) = matches.first().copied() {
            if let Some(anomaly) = store.anomaly_mut(anomaly_id) {
                anomaly.gap_event_id = Some(gap_id);
                linked += 1;
            }
        }
    }

    if linked > 0 {
        store.commit("anomaly_gap_linking");
        info!(linked, "Linked spoofing anomalies to gap events");
    }
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AisClass;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(h: f64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::seconds((h * 3600.0) as i64)
    }

    fn setup() -> (Store, Settings, CorridorIndex) {
        (Store::new(), Settings::default(), CorridorIndex::default())
    }

    #[test]
    fn detects_gap_at_exact_two_hour_boundary() {
        let (mut store, settings, corridors) = setup();
        let v = store.create_vessel("211000001");
        store.add_ais_point(v, ts(0.0), 55.0, 20.0, Some(10.0), Some(90.0), None, None, None, AisClass::A);
        store.add_ais_point(v, ts(2.0), 55.1, 20.3, Some(10.0), Some(90.0), None, None, None, AisClass::A);

        let counts = run_gap_detection(&mut store, &settings, &corridors);
        assert_eq!(counts["gaps_detected"], 1);
        let gap = store.gap(1).expect("gap created");
        assert_eq!(gap.duration_minutes, 120);
        assert_eq!(gap.original_vessel_id, Some(v));
        assert_eq!(gap.pre_gap_sog, Some(10.0));
    }

    #[test]
    fn sub_threshold_interval_is_not_a_gap() {
        let (mut store, settings, corridors) = setup();
        let v = store.create_vessel("211000001");
        store.add_ais_point(v, ts(0.0), 55.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
        store.add_ais_point(v, ts(1.99), 55.05, 20.1, Some(10.0), None, None, None, None, AisClass::A);

        let counts = run_gap_detection(&mut store, &settings, &corridors);
        assert_eq!(counts["gaps_detected"], 0);
    }

    #[test]
    fn second_run_creates_no_new_gaps() {
        let (mut store, settings, corridors) = setup();
        let v = store.create_vessel("211000001");
        store.add_ais_point(v, ts(0.0), 55.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
        store.add_ais_point(v, ts(5.0), 55.5, 20.5, Some(10.0), None, None, None, None, AisClass::A);

        let first = run_gap_detection(&mut store, &settings, &corridors);
        assert_eq!(first["gaps_detected"], 1);
        let second = run_gap_detection(&mut store, &settings, &corridors);
        assert_eq!(second["gaps_detected"], 0, "re-run must dedup");
    }

    #[test]
    fn impossible_reappearance_sets_flag() {
        let (mut store, settings, corridors) = setup();
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.deadweight = Some(250_000.0); // VLCC: 18 kn max
        }
        // 2h silence but ~480 NM displacement (8 degrees of latitude)
        store.add_ais_point(v, ts(0.0), 50.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
        store.add_ais_point(v, ts(2.0), 58.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);

        run_gap_detection(&mut store, &settings, &corridors);
        let gap = store.gap(1).expect("gap created");
        assert!(gap.impossible_speed_flag);
        assert!(gap.velocity_plausibility_ratio > IMPOSSIBLE_SPEED_RATIO);
    }

    #[test]
    fn envelope_method_tracks_duration() {
        let (mut store, settings, corridors) = setup();
        let v = store.create_vessel("211000001");
        store.add_ais_point(v, ts(0.0), 55.0, 20.0, Some(10.0), Some(45.0), None, None, None, AisClass::A);
        store.add_ais_point(v, ts(2.0), 55.2, 20.2, Some(10.0), Some(45.0), None, None, None, AisClass::A);
        store.add_ais_point(v, ts(6.5), 55.6, 20.6, Some(10.0), Some(45.0), None, None, None, AisClass::A);
        store.add_ais_point(v, ts(14.0), 56.2, 21.2, Some(10.0), Some(45.0), None, None, None, AisClass::A);

        run_gap_detection(&mut store, &settings, &corridors);
        let methods: Vec<EnvelopeMethod> = store
            .gap_ids()
            .iter()
            .filter_map(|id| store.envelope_for_gap(*id))
            .map(|e| e.method)
            .collect();
        assert_eq!(
            methods,
            vec![EnvelopeMethod::Linear, EnvelopeMethod::Spline, EnvelopeMethod::Kalman]
        );
    }

    #[test]
    fn envelope_axes_follow_class_distance() {
        let (mut store, settings, corridors) = setup();
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.deadweight = Some(250_000.0);
        }
        store.add_ais_point(v, ts(0.0), 55.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
        store.add_ais_point(v, ts(4.0), 55.3, 20.3, Some(10.0), None, None, None, None, AisClass::A);

        run_gap_detection(&mut store, &settings, &corridors);
        let envelope = store.envelope_for_gap(1).expect("envelope created");
        // 18 kn × 4 h = 72 NM → 0.7/0.3 fractions
        assert!((envelope.semi_major_nm - 50.4).abs() < 1e-6);
        assert!((envelope.semi_minor_nm - 21.6).abs() < 1e-6);
    }
}
