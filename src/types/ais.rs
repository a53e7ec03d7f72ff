//! AIS position types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AisClass, AisPointId, VesselId};

/// A decoded AIS position report. Immutable once ingested.
///
/// Only a merge operation may change `vessel_id`, and then only in
/// ascending-ID batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AisPoint {
    pub point_id: AisPointId,
    pub vessel_id: VesselId,
    pub timestamp: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    /// Speed over ground (knots).
    pub sog: Option<f64>,
    /// Course over ground (degrees, [0, 360)).
    pub cog: Option<f64>,
    pub heading: Option<f64>,
    /// Draught (metres).
    pub draught: Option<f64>,
    /// ITU navigation status (0..15).
    pub nav_status: Option<u8>,
    pub ais_class: AisClass,
}

impl AisPoint {
    /// Course if present, else heading — the best direction estimate.
    pub fn course_or_heading(&self) -> Option<f64> {
        self.cog.or(self.heading)
    }
}
