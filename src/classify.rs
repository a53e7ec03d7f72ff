//! Vessel speed classification — DWT to tanker-class speed envelopes.
//!
//! The class table drives gap plausibility, spoof thresholds in scoring,
//! and the hunt drift ellipse. Shared so every consumer sees identical
//! envelopes for a given deadweight.

use crate::types::Vessel;

/// Tanker size class derived from deadweight tonnage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedClass {
    Vlcc,
    Suezmax,
    Aframax,
    Panamax,
    /// Sub-60k DWT or unknown deadweight.
    Default,
}

impl SpeedClass {
    pub fn from_dwt(dwt: Option<f64>) -> Self {
        match dwt {
            Some(d) if d >= 200_000.0 => Self::Vlcc,
            Some(d) if d >= 120_000.0 => Self::Suezmax,
            Some(d) if d >= 80_000.0 => Self::Aframax,
            Some(d) if d >= 60_000.0 => Self::Panamax,
            _ => Self::Default,
        }
    }

    /// Maximum sustained speed for the class (knots).
    pub fn max_speed_kn(self) -> f64 {
        match self {
            Self::Vlcc => 18.0,
            Self::Suezmax => 19.0,
            Self::Aframax | Self::Panamax => 20.0,
            Self::Default => 17.0,
        }
    }

    /// Speed above which a reading is treated as spoofed (knots).
    pub fn spoof_threshold_kn(self) -> f64 {
        match self {
            Self::Vlcc => 22.0,
            Self::Suezmax => 23.0,
            Self::Aframax | Self::Panamax => 24.0,
            Self::Default => 22.0,
        }
    }
}

/// Return (max_speed_kn, spoof_threshold_kn) for a given deadweight.
pub fn class_speed(dwt: Option<f64>) -> (f64, f64) {
    let class = SpeedClass::from_dwt(dwt);
    (class.max_speed_kn(), class.spoof_threshold_kn())
}

/// Maximum plausible drift distance for a vessel class over elapsed time.
///
/// Reused by: gap detection, envelope construction, hunt drift ellipse.
pub fn max_plausible_distance_nm(dwt: Option<f64>, elapsed_hours: f64) -> f64 {
    class_speed(dwt).0 * elapsed_hours
}

/// Type vocabulary that marks a vessel as an oil tanker.
const TANKER_TYPE_MARKERS: &[&str] = &[
    "tanker", "crude", "oil", "products", "vlcc", "suezmax", "aframax", "shuttle",
];

/// Tanker filter used by STS detection and tanker-only spoofing typologies.
///
/// A textual type match wins; with no type on record, deadweight at or
/// above the tanker floor qualifies.
pub fn is_tanker_type(vessel: &Vessel) -> bool {
    if let Some(vt) = &vessel.vessel_type {
        let lower = vt.to_lowercase();
        return TANKER_TYPE_MARKERS.iter().any(|m| lower.contains(m));
    }
    vessel
        .deadweight
        .is_some_and(|dwt| dwt >= crate::config::defaults::TANKER_MIN_DWT)
}
