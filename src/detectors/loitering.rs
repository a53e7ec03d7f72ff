//! Loitering detection.
//!
//! A loitering event is a sustained near-stationary drift episode: SOG
//! at or below the configured ceiling for at least the minimum duration.
//! Episodes bracketed by AIS gaps (the loiter-gap-loiter pattern) link
//! to the neighbouring gap events so scoring can recognise the cycle.

use chrono::{DateTime, Duration, Utc};
use statrs::statistics::{Data, OrderStatistics};
use tracing::info;

use super::StepCounts;
use crate::config::Settings;
use crate::corridor::CorridorIndex;
use crate::store::Store;
use crate::types::LoiteringEvent;

/// Window for linking a loiter to a preceding/following gap (hours).
const GAP_LINK_WINDOW_HOURS: i64 = 48;

/// Run loitering detection for every vessel.
///
/// Returns `{loitering_events}`.
pub fn run_loitering_detection(
    store: &mut Store,
    settings: &Settings,
    corridors: &CorridorIndex,
) -> StepCounts {
    let min_duration_h = settings.detection.loiter_min_hours;
    let max_sog = settings.detection.loiter_max_sog;

    struct Episode {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_h: f64,
        mean_lat: f64,
        mean_lon: f64,
        median_sog: f64,
    }

    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        let mut episodes: Vec<Episode> = Vec::new();
        {
            let points = store.points_for_vessel(vessel_id);
            let mut run: Vec<(&DateTime<Utc>, f64, f64, f64)> = Vec::new();
            for p in points.iter().map(Some).chain(std::iter::once(None)) {
                let slow = p.is_some_and(|p| p.sog.is_some_and(|s| s <= max_sog));
                if slow {
                    if let Some(p) = p {
                        run.push((&p.timestamp, p.lat, p.lon, p.sog.unwrap_or(0.0)));
                    }
                    continue;
                }
                if run.len() >= 2 {
                    let duration_h =
                        (*run[run.len() - 1].0 - *run[0].0).num_seconds() as f64 / 3600.0;
                    if duration_h >= min_duration_h {
                        let n = run.len() as f64;
                        episodes.push(Episode {
                            start: *run[0].0,
                            end: *run[run.len() - 1].0,
                            duration_h,
                            mean_lat: run.iter().map(|r| r.1).sum::<f64>() / n,
                            mean_lon: run.iter().map(|r| r.2).sum::<f64>() / n,
                            median_sog: Data::new(
                                run.iter().map(|r| r.3).collect::<Vec<f64>>(),
                            )
                            .median(),
                        });
                    }
                }
                run.clear();
            }
        }

        for ep in episodes {
            if store.loiter_exists(vessel_id, ep.start) {
                continue;
            }

            let link_window = Duration::hours(GAP_LINK_WINDOW_HOURS);
            let preceding = store
                .gaps_overlapping(vessel_id, ep.start - link_window, ep.start)
                .iter()
                .filter(|g| g.gap_end <= ep.start)
                .max_by_key(|g| g.gap_end)
                .map(|g| g.gap_event_id);
            let following = store
                .gaps_overlapping(vessel_id, ep.end, ep.end + link_window)
                .iter()
                .filter(|g| g.gap_start >= ep.end)
                .min_by_key(|g| g.gap_start)
                .map(|g| g.gap_event_id);

            store.add_loiter(LoiteringEvent {
                loiter_id: 0,
                vessel_id,
                start_time: ep.start,
                end_time: ep.end,
                duration_hours: ep.duration_h,
                mean_lat: ep.mean_lat,
                mean_lon: ep.mean_lon,
                median_sog_kn: ep.median_sog,
                corridor_id: corridors.find_corridor_for_point(ep.mean_lat, ep.mean_lon),
                preceding_gap_id: preceding,
                following_gap_id: following,
            });
            created += 1;
        }
        store.commit("loitering.vessel");
    }

    info!(events = created, "Loitering detection complete");
    let mut counts = StepCounts::new();
    counts.insert("loitering_events".to_string(), created);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AisClass, GapEvent, GapStatus};
    use chrono::TimeZone;

    fn ts(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::hours(h)
    }

    fn make_gap(store: &mut Store, vessel: i64, start_h: i64, end_h: i64) -> i64 {
        let id = store.alloc_gap_id();
        store.add_gap(GapEvent {
            gap_event_id: id,
            vessel_id: vessel,
            original_vessel_id: Some(vessel),
            gap_start: ts(start_h),
            gap_end: ts(end_h),
            duration_minutes: (end_h - start_h) * 60,
            start_point_id: None,
            end_point_id: None,
            corridor_id: None,
            dark_zone_id: None,
            in_dark_zone: false,
            impossible_speed_flag: false,
            velocity_plausibility_ratio: 0.1,
            max_plausible_distance_nm: 100.0,
            actual_gap_distance_nm: 10.0,
            pre_gap_sog: None,
            risk_score: 0,
            risk_breakdown: None,
            status: GapStatus::New,
        });
        id
    }

    #[test]
    fn six_hour_drift_creates_event_with_gap_links() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        let before = make_gap(&mut store, v, 0, 8);
        // Drift from hour 10 to 16
        for h in 10..=16 {
            store.add_ais_point(v, ts(h), 36.5, 22.5, Some(0.2), None, None, None, None, AisClass::A);
        }
        // Underway point terminates the run
        store.add_ais_point(v, ts(17), 36.6, 22.5, Some(8.0), None, None, None, None, AisClass::A);
        let after = make_gap(&mut store, v, 18, 24);

        let counts = run_loitering_detection(
            &mut store,
            &Settings::default(),
            &CorridorIndex::default(),
        );
        assert_eq!(counts["loitering_events"], 1);
        let loiters = store.loiters_for_vessel(v);
        let loiter = loiters[0];
        assert!((loiter.duration_hours - 6.0).abs() < 1e-9);
        assert_eq!(loiter.preceding_gap_id, Some(before));
        assert_eq!(loiter.following_gap_id, Some(after));
        assert!((loiter.median_sog_kn - 0.2).abs() < 1e-9);
    }

    #[test]
    fn short_drift_is_ignored() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        for h in 0..=3 {
            store.add_ais_point(v, ts(h), 36.5, 22.5, Some(0.2), None, None, None, None, AisClass::A);
        }
        store.add_ais_point(v, ts(4), 36.6, 22.5, Some(8.0), None, None, None, None, AisClass::A);
        let counts = run_loitering_detection(
            &mut store,
            &Settings::default(),
            &CorridorIndex::default(),
        );
        assert_eq!(counts["loitering_events"], 0);
    }

    #[test]
    fn rerun_is_idempotent() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        for h in 0..=6 {
            store.add_ais_point(v, ts(h), 36.5, 22.5, Some(0.2), None, None, None, None, AisClass::A);
        }
        store.add_ais_point(v, ts(7), 36.6, 22.5, Some(8.0), None, None, None, None, AisClass::A);
        let settings = Settings::default();
        let corridors = CorridorIndex::default();
        run_loitering_detection(&mut store, &settings, &corridors);
        let counts = run_loitering_detection(&mut store, &settings, &corridors);
        assert_eq!(counts["loitering_events"], 0);
    }
}
