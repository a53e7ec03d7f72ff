//! Vessel identity and metadata types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VesselId;

/// AIS transponder class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AisClass {
    A,
    B,
    #[default]
    Unknown,
}

impl AisClass {
    /// Parse from a raw AIS feed value ("A", "b", "CLASS A", ...).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" | "CLASS A" => Self::A,
            "B" | "CLASS B" => Self::B,
            _ => Self::Unknown,
        }
    }
}

/// Flag-state risk category assigned at enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlagRisk {
    Low,
    Medium,
    High,
    #[default]
    Unknown,
}

/// P&I insurance coverage status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PiCoverage {
    Active,
    Lapsed,
    #[default]
    Unknown,
}

/// A physical ship, keyed by the MMSI it first appeared under.
///
/// MMSIs are reassignable; the merge machinery links identities via
/// `merged_into`. A vessel with `merged_into == None` is canonical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vessel {
    pub vessel_id: VesselId,
    /// 9-digit transponder identity — NOT unique over time.
    pub mmsi: String,
    /// 7-digit hull identifier with check digit; rarely null.
    pub imo: Option<String>,
    pub name: Option<String>,
    /// ISO country code of the flag state.
    pub flag: Option<String>,
    pub vessel_type: Option<String>,
    /// Deadweight tonnage (tons).
    pub deadweight: Option<f64>,
    pub year_built: Option<i32>,
    pub ais_class: AisClass,
    pub flag_risk: FlagRisk,
    pub pi_coverage: PiCoverage,
    pub psc_detained_last_12m: bool,
    pub psc_major_deficiencies_last_12m: i32,
    pub mmsi_first_seen: Option<DateTime<Utc>>,
    pub laid_up_30d: bool,
    pub laid_up_60d: bool,
    pub laid_up_in_sts_zone: bool,
    /// Canonical pointer; set exactly once by a merge operation.
    pub merged_into: Option<VesselId>,
    pub owner_name: Option<String>,
    pub callsign: Option<String>,
    /// IMO reported scrapped by an external registry (chain scoring input).
    pub imo_scrapped: bool,
}

impl Vessel {
    pub fn new(vessel_id: VesselId, mmsi: &str) -> Self {
        Self {
            vessel_id,
            mmsi: mmsi.to_string(),
            imo: None,
            name: None,
            flag: None,
            vessel_type: None,
            deadweight: None,
            year_built: None,
            ais_class: AisClass::Unknown,
            flag_risk: FlagRisk::Unknown,
            pi_coverage: PiCoverage::Unknown,
            psc_detained_last_12m: false,
            psc_major_deficiencies_last_12m: 0,
            mmsi_first_seen: None,
            laid_up_30d: false,
            laid_up_60d: false,
            laid_up_in_sts_zone: false,
            merged_into: None,
            owner_name: None,
            callsign: None,
            imo_scrapped: false,
        }
    }

    /// True when this record is the canonical identity (not absorbed).
    pub fn is_canonical(&self) -> bool {
        self.merged_into.is_none()
    }
}

/// Chronological attribute-change log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VesselHistory {
    pub history_id: i64,
    pub vessel_id: VesselId,
    pub field_changed: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub source: String,
}

/// Ownership / management record for a vessel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VesselOwner {
    pub owner_id: i64,
    pub vessel_id: VesselId,
    pub owner_name: Option<String>,
    pub ism_manager: Option<String>,
    pub pi_club_name: Option<String>,
    pub is_sanctioned: bool,
}

/// Watchlist membership resolved from a sanctions source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub entry_id: i64,
    pub vessel_id: VesselId,
    /// Source label, e.g. "OFAC_SDN", "EU_COUNCIL", "KSE_SHADOW".
    pub source: String,
    pub reason: Option<String>,
    pub date_listed: Option<DateTime<Utc>>,
    pub source_url: Option<String>,
    pub is_active: bool,
    pub match_confidence: i32,
    /// How the row was resolved: exact_mmsi, exact_imo, fuzzy_name.
    pub match_type: String,
}

/// Port visit derived from AIS proximity or an external feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortCall {
    pub port_call_id: i64,
    pub vessel_id: VesselId,
    pub port_id: Option<i64>,
    pub arrival: DateTime<Utc>,
    pub departure: Option<DateTime<Utc>>,
    pub source: String,
}
