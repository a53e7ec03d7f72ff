//! Detection passes over the AIS point store.
//!
//! Every detector is idempotent: equivalent records are checked for
//! before insert, so re-running a pass over unchanged data creates
//! nothing new. Detectors return count maps and log warnings — they
//! never abort the pipeline on individual-row problems.

pub mod compliance;
pub mod dark_sts;
pub mod gap;
mod interpolation;
pub mod laid_up;
pub mod loitering;
pub mod spoofing;
pub mod sts;
pub mod track_integrity;

use std::collections::BTreeMap;

/// Count map returned by every detection step.
pub type StepCounts = BTreeMap<String, i64>;

/// Shared helper: is a position within `radius_nm` of any major port?
pub(crate) fn is_near_major_port(store: &crate::store::Store, lat: f64, lon: f64, radius_nm: f64) -> bool {
    for port in store.major_ports() {
        let Some((p_lat, p_lon)) = crate::geo::parse_wkt_point(&port.geometry) else {
            continue;
        };
        if crate::geo::haversine_nm(lat, lon, p_lat, p_lon) <= radius_nm {
            return true;
        }
    }
    false
}
