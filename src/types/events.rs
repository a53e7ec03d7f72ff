//! Detection event types — gaps, spoofing, STS, loitering and derived
//! fusion records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AisPointId, CorridorId, GapEventId, VesselId};
use crate::scoring::ScoreBreakdown;

/// Analyst workflow status of a gap alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    #[default]
    New,
    UnderReview,
    NeedsSatelliteCheck,
    Documented,
    Dismissed,
}

/// A detected AIS silence of at least the configured minimum duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapEvent {
    pub gap_event_id: GapEventId,
    pub vessel_id: VesselId,
    /// The vessel ID under which this gap was *detected*. Set once at
    /// detection, never rewritten by merges — gap-frequency scoring
    /// filters on it to avoid post-merge inflation.
    pub original_vessel_id: Option<VesselId>,
    pub gap_start: DateTime<Utc>,
    pub gap_end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub start_point_id: Option<AisPointId>,
    pub end_point_id: Option<AisPointId>,
    pub corridor_id: Option<CorridorId>,
    pub dark_zone_id: Option<CorridorId>,
    pub in_dark_zone: bool,
    /// Reappearance farther than physics allows (ratio > 1.1).
    pub impossible_speed_flag: bool,
    pub velocity_plausibility_ratio: f64,
    pub max_plausible_distance_nm: f64,
    pub actual_gap_distance_nm: f64,
    /// SOG of the last point before the silence, captured at detection
    /// time for deterministic scoring.
    pub pre_gap_sog: Option<f64>,
    pub risk_score: i32,
    pub risk_breakdown: Option<ScoreBreakdown>,
    pub status: GapStatus,
}

impl GapEvent {
    pub fn duration_hours(&self) -> f64 {
        self.duration_minutes as f64 / 60.0
    }
}

/// Interpolation method used for a movement envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeMethod {
    Linear,
    Spline,
    Kalman,
}

/// Plausible-position envelope for one gap event (1:1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementEnvelope {
    pub envelope_id: i64,
    pub gap_event_id: GapEventId,
    pub max_plausible_distance_nm: f64,
    pub actual_gap_distance_nm: f64,
    pub velocity_plausibility_ratio: f64,
    pub semi_major_nm: f64,
    pub semi_minor_nm: f64,
    pub heading_degrees: Option<f64>,
    pub method: EnvelopeMethod,
    /// Interpolated (lat, lon, fraction) samples across the gap.
    pub interpolated_positions: Vec<(f64, f64, f64)>,
    /// Confidence ellipse as WKT polygon.
    pub confidence_ellipse: Option<String>,
}

/// Spoofing typology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpoofingType {
    AnchorSpoof,
    CircleSpoof,
    SlowRoll,
    MmsiReuse,
    NavStatusMismatch,
    ErraticNavStatus,
    StaleAisData,
    DualTransmission,
    ImoFraud,
    StatelessMmsi,
    FlagHopping,
    SyntheticTrack,
    IdentitySwap,
    FakePortCall,
    RouteLaundering,
    PiCycling,
    SparseTransmission,
    TypeDwtMismatch,
}

impl SpoofingType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnchorSpoof => "anchor_spoof",
            Self::CircleSpoof => "circle_spoof",
            Self::SlowRoll => "slow_roll",
            Self::MmsiReuse => "mmsi_reuse",
            Self::NavStatusMismatch => "nav_status_mismatch",
            Self::ErraticNavStatus => "erratic_nav_status",
            Self::StaleAisData => "stale_ais_data",
            Self::DualTransmission => "dual_transmission",
            Self::ImoFraud => "imo_fraud",
            Self::StatelessMmsi => "stateless_mmsi",
            Self::FlagHopping => "flag_hopping",
            Self::SyntheticTrack => "synthetic_track",
            Self::IdentitySwap => "identity_swap",
            Self::FakePortCall => "fake_port_call",
            Self::RouteLaundering => "route_laundering",
            Self::PiCycling => "pi_cycling",
            Self::SparseTransmission => "sparse_transmission",
            Self::TypeDwtMismatch => "type_dwt_mismatch",
        }
    }
}

/// One detected spoofing anomaly with typology-specific evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoofingAnomaly {
    pub anomaly_id: i64,
    pub vessel_id: VesselId,
    pub anomaly_type: SpoofingType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub implied_speed_kn: Option<f64>,
    pub risk_score_component: i32,
    /// Typology-specific evidence map (sorted keys — deterministic).
    pub evidence: Value,
    /// Linked gap event, assigned by the post-detection linking pass.
    pub gap_event_id: Option<GapEventId>,
    pub created_at: DateTime<Utc>,
}

/// How an STS event was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StsDetectionType {
    VisibleVisible,
    Approaching,
    DarkDark,
    GfwEncounter,
}

/// A suspected ship-to-ship transfer between two tankers.
///
/// Canonical ordering invariant: `vessel_1_id < vessel_2_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StsTransferEvent {
    pub sts_id: i64,
    pub vessel_1_id: VesselId,
    pub vessel_2_id: VesselId,
    pub detection_type: StsDetectionType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub mean_proximity_meters: Option<f64>,
    pub mean_lat: Option<f64>,
    pub mean_lon: Option<f64>,
    pub corridor_id: Option<CorridorId>,
    /// Phase B only: minutes until intercept.
    pub eta_minutes: Option<i64>,
    pub risk_score_component: i32,
    /// Detection source label ("proximity", "gfw").
    pub source: String,
}

/// A sustained slow-drift episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoiteringEvent {
    pub loiter_id: i64,
    pub vessel_id: VesselId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub mean_lat: f64,
    pub mean_lon: f64,
    pub median_sog_kn: f64,
    pub corridor_id: Option<CorridorId>,
    pub preceding_gap_id: Option<GapEventId>,
    pub following_gap_id: Option<GapEventId>,
}

/// External (SAR / GFW) detection of a vessel not matched to AIS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarkVesselDetection {
    pub detection_id: i64,
    pub detection_time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub corridor_id: Option<CorridorId>,
    /// "matched" | "unmatched"
    pub ais_match_result: String,
    pub matched_vessel_id: Option<VesselId>,
    pub source: String,
}

/// Recommended satellite imagery tasking produced by dark-dark detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteTaskingCandidate {
    pub candidate_id: i64,
    pub vessel_1_id: VesselId,
    pub vessel_2_id: VesselId,
    /// Recommended imagery window = the gap-overlap interval.
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub mean_lat: f64,
    pub mean_lon: f64,
    /// "high" | "medium" | "low"
    pub confidence_level: String,
    pub corridor_id: Option<CorridorId>,
}

/// Two vessels co-moving in formation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvoyEvent {
    pub convoy_id: i64,
    pub vessel_1_id: VesselId,
    pub vessel_2_id: VesselId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub mean_separation_nm: f64,
    pub risk_score_component: i32,
}

/// Fleet-level alert emitted by fusion passes (relay chains, floating
/// storage, Arctic routing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetAlert {
    pub alert_id: i64,
    pub alert_type: String,
    pub vessel_ids: Vec<VesselId>,
    pub evidence: Value,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

/// Connected component of merge-candidate edges (identity laundering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeChain {
    pub chain_id: i64,
    /// Sorted member vessel IDs — the dedup key.
    pub vessel_ids: Vec<VesselId>,
    /// min(edge confidence) across the component.
    pub confidence: i32,
    /// "HIGH" (≥75) | "MEDIUM" (50-74) | "LOW"
    pub band: String,
    pub contains_scrapped_imo: bool,
}

/// Recurring port sequence extracted from port-call history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTemplate {
    pub template_id: i64,
    pub port_sequence: Vec<i64>,
    pub observation_count: i32,
}

/// Per-corridor gap-rate baseline used to suppress jamming noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapRateBaseline {
    pub corridor_id: CorridorId,
    /// Gaps observed in the trailing window.
    pub gap_count: i64,
    /// P95 of the daily gap-count distribution.
    pub p95_threshold: f64,
}

/// Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: i64,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub details: Value,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Analyst-facing evidence bundle for one gap alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceCard {
    pub card_id: i64,
    pub gap_event_id: GapEventId,
    /// Provenance set during merge: the identity the evidence was
    /// collected under.
    pub original_vessel_id: Option<VesselId>,
    pub original_mmsi: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}
