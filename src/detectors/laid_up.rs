//! Laid-up classification.
//!
//! A vessel is laid up when its recent track shows no meaningful
//! movement over a whole classification window (30 d / 60 d). Laid-up
//! hulls parked inside STS zones are the highest-interest class — idle
//! storage capacity pre-positioned at transfer areas.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::StepCounts;
use crate::config::Settings;
use crate::corridor::CorridorIndex;
use crate::geo::haversine_nm;
use crate::store::Store;

/// Total displacement below which a window counts as stationary (NM).
const LAID_UP_MAX_DRIFT_NM: f64 = 2.0;

/// Classify laid-up state for every vessel. Updates the vessel flags and
/// records `{laid_up_30d, laid_up_60d, laid_up_in_sts_zone}` counts.
pub fn run_laid_up_classification(
    store: &mut Store,
    settings: &Settings,
    corridors: &CorridorIndex,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut n30 = 0_i64;
    let mut n60 = 0_i64;
    let mut n_sts = 0_i64;

    for vessel_id in store.vessel_ids() {
        let laid_30 = is_stationary_window(store, vessel_id, now, settings.detection.laid_up_30d_days);
        let laid_60 = laid_30
            && is_stationary_window(store, vessel_id, now, settings.detection.laid_up_60d_days);

        let in_sts_zone = laid_30
            && store
                .last_point_for_vessel(vessel_id)
                .is_some_and(|p| corridors.find_sts_zone_for_point(p.lat, p.lon).is_some());

        if let Some(vessel) = store.vessel_mut(vessel_id) {
            vessel.laid_up_30d = laid_30;
            vessel.laid_up_60d = laid_60;
            vessel.laid_up_in_sts_zone = in_sts_zone;
        }
        n30 += i64::from(laid_30);
        n60 += i64::from(laid_60);
        n_sts += i64::from(in_sts_zone);
    }
    store.commit("laid_up_classification");

    info!(laid_up_30d = n30, laid_up_60d = n60, in_sts_zone = n_sts, "Laid-up classification complete");
    let mut counts = StepCounts::new();
    counts.insert("laid_up_30d".to_string(), n30);
    counts.insert("laid_up_60d".to_string(), n60);
    counts.insert("laid_up_in_sts_zone".to_string(), n_sts);
    counts
}

/// True when the vessel transmitted through the whole window without
/// leaving a small neighbourhood of its first position.
fn is_stationary_window(store: &Store, vessel_id: i64, now: DateTime<Utc>, days: i64) -> bool {
    let window_start = now - Duration::days(days);
    let points = store.points_for_vessel_between(vessel_id, window_start, now);
    if points.len() < 2 {
        return false;
    }
    // Coverage: track must span most of the window, not just its tail
    let span_h = (points[points.len() - 1].timestamp - points[0].timestamp).num_seconds() as f64
        / 3600.0;
    if span_h < (days as f64) * 24.0 * 0.8 {
        return false;
    }
    let origin = points[0];
    points
        .iter()
        .all(|p| haversine_nm(origin.lat, origin.lon, p.lat, p.lon) <= LAID_UP_MAX_DRIFT_NM)
}
