//! Typed score breakdown.
//!
//! The breakdown for a scored gap is a fixed-variant signal list plus a
//! metadata header, not a free-form dict. Export renders it as the flat
//! map the UI consumes: signal keys carry point values; metadata keys
//! carry a leading underscore and MUST NOT be summed as signals.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::SpoofingType;

/// Every signal the engine can emit. Payload variants carry the entity
/// ID (or source label) that parameterises the rendered key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalKind {
    // Gap duration tiers
    GapDuration2h4h,
    GapDuration4h8h,
    GapDuration8h12h,
    GapDuration12h24h,
    GapDuration24hPlus,
    GapDurationSpeedSpikeBonus,
    // Speed anomaly (tri-state subsumption)
    SpeedImpossible,
    SpeedSpoofBeforeGap,
    SpeedSpikeBeforeGap,
    // Movement envelope
    ImpossibleReappear,
    NearImpossibleReappear,
    // Dark zone tri-state
    DarkZoneExitImpossible,
    DarkZoneEntry,
    DarkZoneDeduction,
    // Corridor
    GapInStsTaggedCorridor,
    // Gap frequency (single-tier subsumption)
    GapFrequency5In30d,
    GapFrequency4In30d,
    GapFrequency3In14d,
    GapFrequency3In30d,
    GapFrequency2In7d,
    // Flag state
    FlagWhiteList,
    FlagHighRisk,
    // Vessel age
    VesselAge0To10,
    VesselAge10To20,
    VesselAge20To25,
    VesselAge25Plus,
    VesselAge25PlusHighRisk,
    // AIS class
    AisClassMismatch,
    ClassSwitchingAToB,
    TransmissionFrequencyMismatch,
    // Insurance / PSC
    PiCoverageLapsed,
    PiCoverageUnknown,
    PscDetainedLast12m,
    PscMajorDeficiencies3Plus,
    // Metadata changes
    CallsignChange,
    FlagAndNameChange48h,
    FlagChange7d,
    FlagChange30d,
    FlagChanges3Plus90d,
    FlagChangeHighToLow12m,
    NameChangeDuringVoyage,
    MmsiChange,
    MmsiChangeDifferentPosition,
    // Ownership
    OwnerOnSanctionsList,
    // Spoofing anomalies
    SpoofingErraticNavStatus,
    Spoofing(SpoofingType),
    SpoofingDup(SpoofingType, i64),
    // Loitering
    LoiterGapLoiterFull(i64),
    LoiterGapPattern(i64),
    Loitering(i64),
    // Laid-up
    VesselLaidUpInStsZone,
    VesselLaidUp60d,
    VesselLaidUp30d,
    // STS
    StsEvent(i64),
    StsWithSanctionedVessel,
    StsWithShadowFleetVessel,
    // Watchlist
    Watchlist(String),
    // Behavioral
    NewMmsiFirst30d,
    NewMmsiRussianOriginFlag,
    NewMmsiFirst60d,
    SuspiciousMid,
    RussianPortGapSts,
    RussianPortRecent,
    // Dark vessel detections
    DarkVesselUnmatchedInCorridor,
    DarkVesselUnmatched,
    // Identity merge
    IdentityMergeDetected,
    ImoFabricated,
    GapReactivationInJammingZone,
    // Legitimacy deductions
    LegitimacyGapFree90d,
    LegitimacyAisClassAConsistent,
    LegitimacyWhiteFlagJurisdiction,
    LegitimacyEuPortCalls,
    // Fusion
    MergeChain3,
    MergeChain4Plus,
    ScrappedImoInChain,
    StsRelayChain3,
    StsRelayChain4Plus,
    Convoy4To8h,
    Convoy8To24h,
    Convoy24hPlus,
    FloatingStorage,
    ArcticNoIceClass,
    RouteDeviationTowardSts,
    LadenRussianSts,
    WeatherHighWind,
    WeatherModerateWind,
}

impl SignalKind {
    /// Stable breakdown key rendered for the UI and exports.
    pub fn key(&self) -> String {
        match self {
            Self::GapDuration2h4h => "gap_duration_2h_4h".into(),
            Self::GapDuration4h8h => "gap_duration_4h_8h".into(),
            Self::GapDuration8h12h => "gap_duration_8h_12h".into(),
            Self::GapDuration12h24h => "gap_duration_12h_24h".into(),
            Self::GapDuration24hPlus => "gap_duration_24h_plus".into(),
            Self::GapDurationSpeedSpikeBonus => "gap_duration_speed_spike_bonus".into(),
            Self::SpeedImpossible => "speed_impossible".into(),
            Self::SpeedSpoofBeforeGap => "speed_spoof_before_gap".into(),
            Self::SpeedSpikeBeforeGap => "speed_spike_before_gap".into(),
            Self::ImpossibleReappear => "impossible_reappear".into(),
            Self::NearImpossibleReappear => "near_impossible_reappear".into(),
            Self::DarkZoneExitImpossible => "dark_zone_exit_impossible".into(),
            Self::DarkZoneEntry => "dark_zone_entry".into(),
            Self::DarkZoneDeduction => "dark_zone_deduction".into(),
            Self::GapInStsTaggedCorridor => "gap_in_sts_tagged_corridor".into(),
            Self::GapFrequency5In30d => "gap_frequency_5_in_30d".into(),
            Self::GapFrequency4In30d => "gap_frequency_4_in_30d".into(),
            Self::GapFrequency3In14d => "gap_frequency_3_in_14d".into(),
            Self::GapFrequency3In30d => "gap_frequency_3_in_30d".into(),
            Self::GapFrequency2In7d => "gap_frequency_2_in_7d".into(),
            Self::FlagWhiteList => "flag_white_list".into(),
            Self::FlagHighRisk => "flag_high_risk".into(),
            Self::VesselAge0To10 => "vessel_age_0_10y".into(),
            Self::VesselAge10To20 => "vessel_age_10_20y".into(),
            Self::VesselAge20To25 => "vessel_age_20_25y".into(),
            Self::VesselAge25Plus => "vessel_age_25plus".into(),
            Self::VesselAge25PlusHighRisk => "vessel_age_25plus_high_risk".into(),
            Self::AisClassMismatch => "ais_class_mismatch".into(),
            Self::ClassSwitchingAToB => "class_switching_a_to_b".into(),
            Self::TransmissionFrequencyMismatch => "transmission_frequency_mismatch".into(),
            Self::PiCoverageLapsed => "pi_coverage_lapsed".into(),
            Self::PiCoverageUnknown => "pi_coverage_unknown".into(),
            Self::PscDetainedLast12m => "psc_detained_last_12m".into(),
            Self::PscMajorDeficiencies3Plus => "psc_major_deficiencies_3_plus".into(),
            Self::CallsignChange => "callsign_change".into(),
            Self::FlagAndNameChange48h => "flag_and_name_change_48h".into(),
            Self::FlagChange7d => "flag_change_7d".into(),
            Self::FlagChange30d => "flag_change_30d".into(),
            Self::FlagChanges3Plus90d => "flag_changes_3plus_90d".into(),
            Self::FlagChangeHighToLow12m => "flag_change_high_to_low_12m".into(),
            Self::NameChangeDuringVoyage => "name_change_during_voyage".into(),
            Self::MmsiChange => "mmsi_change".into(),
            Self::MmsiChangeDifferentPosition => "mmsi_change_different_position".into(),
            Self::OwnerOnSanctionsList => "owner_or_manager_on_sanctions_list".into(),
            Self::SpoofingErraticNavStatus => "spoofing_erratic_nav_status".into(),
            Self::Spoofing(t) => format!("spoofing_{}", t.as_str()),
            Self::SpoofingDup(t, id) => format!("spoofing_{}_{id}", t.as_str()),
            Self::LoiterGapLoiterFull(id) => format!("loiter_gap_loiter_full_{id}"),
            Self::LoiterGapPattern(id) => format!("loiter_gap_pattern_{id}"),
            Self::Loitering(id) => format!("loitering_{id}"),
            Self::VesselLaidUpInStsZone => "vessel_laid_up_in_sts_zone".into(),
            Self::VesselLaidUp60d => "vessel_laid_up_60d".into(),
            Self::VesselLaidUp30d => "vessel_laid_up_30d".into(),
            Self::StsEvent(id) => format!("sts_event_{id}"),
            Self::StsWithSanctionedVessel => "sts_with_sanctioned_vessel".into(),
            Self::StsWithShadowFleetVessel => "sts_with_shadow_fleet_vessel".into(),
            Self::Watchlist(source) => format!("watchlist_{source}"),
            Self::NewMmsiFirst30d => "new_mmsi_first_30d".into(),
            Self::NewMmsiRussianOriginFlag => "new_mmsi_russian_origin_flag".into(),
            Self::NewMmsiFirst60d => "new_mmsi_first_60d".into(),
            Self::SuspiciousMid => "suspicious_mid".into(),
            Self::RussianPortGapSts => "russian_port_gap_sts".into(),
            Self::RussianPortRecent => "russian_port_recent".into(),
            Self::DarkVesselUnmatchedInCorridor => "dark_vessel_unmatched_in_corridor".into(),
            Self::DarkVesselUnmatched => "dark_vessel_unmatched".into(),
            Self::IdentityMergeDetected => "identity_merge_detected".into(),
            Self::ImoFabricated => "imo_fabricated".into(),
            Self::GapReactivationInJammingZone => "gap_reactivation_in_jamming_zone".into(),
            Self::LegitimacyGapFree90d => "legitimacy_gap_free_90d".into(),
            Self::LegitimacyAisClassAConsistent => "legitimacy_ais_class_a_consistent".into(),
            Self::LegitimacyWhiteFlagJurisdiction => "legitimacy_white_flag_jurisdiction".into(),
            Self::LegitimacyEuPortCalls => "legitimacy_eu_port_calls".into(),
            Self::MergeChain3 => "merge_chain_3".into(),
            Self::MergeChain4Plus => "merge_chain_4plus".into(),
            Self::ScrappedImoInChain => "scrapped_imo_in_chain".into(),
            Self::StsRelayChain3 => "sts_relay_chain_3".into(),
            Self::StsRelayChain4Plus => "sts_relay_chain_4plus".into(),
            Self::Convoy4To8h => "convoy_4_8h".into(),
            Self::Convoy8To24h => "convoy_8_24h".into(),
            Self::Convoy24hPlus => "convoy_24h_plus".into(),
            Self::FloatingStorage => "floating_storage".into(),
            Self::ArcticNoIceClass => "arctic_no_ice_class".into(),
            Self::RouteDeviationTowardSts => "route_deviation_toward_sts".into(),
            Self::LadenRussianSts => "laden_russian_sts".into(),
            Self::WeatherHighWind => "weather_high_wind_deduction".into(),
            Self::WeatherModerateWind => "weather_moderate_wind_deduction".into(),
        }
    }
}

/// Composition metadata stored alongside the signal list. Rendered with
/// leading-underscore keys so the UI never sums it as signal points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownMeta {
    pub corridor_type: String,
    pub corridor_multiplier: f64,
    pub vessel_size_class: String,
    pub vessel_size_multiplier: f64,
    pub additive_subtotal: i32,
    pub final_score: i32,
}

/// Ordered signal list plus composition metadata for one scored gap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    entries: Vec<(SignalKind, i32)>,
    pub meta: Option<BreakdownMeta>,
}

impl ScoreBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a signal. Insertion order is the engine's fixed
    /// evaluation order, which keeps serialization deterministic.
    pub fn push(&mut self, kind: SignalKind, points: i32) {
        self.entries.push((kind, points));
    }

    pub fn get(&self, kind: &SignalKind) -> Option<i32> {
        self.entries
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, kind: &SignalKind) -> bool {
        self.get(kind).is_some()
    }

    /// True when any rendered key starts with the prefix.
    pub fn contains_key_prefix(&self, prefix: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.key().starts_with(prefix))
    }

    pub fn entries(&self) -> &[(SignalKind, i32)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of positive signal values (risk).
    pub fn sum_risk(&self) -> i32 {
        self.entries.iter().map(|(_, v)| *v).filter(|v| *v > 0).sum()
    }

    /// Sum of negative signal values (legitimacy deductions).
    pub fn sum_legitimacy(&self) -> i32 {
        self.entries.iter().map(|(_, v)| *v).filter(|v| *v < 0).sum()
    }

    /// True when any positive signal has been recorded.
    pub fn has_positive_signal(&self) -> bool {
        self.entries.iter().any(|(_, v)| *v > 0)
    }

    /// Render the flat map the UI and exports consume: signal keys plus
    /// `_`-prefixed metadata.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (kind, points) in &self.entries {
            map.insert(kind.key(), json!(points));
        }
        if let Some(meta) = &self.meta {
            map.insert("_corridor_type".to_string(), json!(meta.corridor_type));
            map.insert("_corridor_multiplier".to_string(), json!(meta.corridor_multiplier));
            map.insert("_vessel_size_class".to_string(), json!(meta.vessel_size_class));
            map.insert(
                "_vessel_size_multiplier".to_string(),
                json!(meta.vessel_size_multiplier),
            );
            map.insert("_additive_subtotal".to_string(), json!(meta.additive_subtotal));
            map.insert("_final_score".to_string(), json!(meta.final_score));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable() {
        assert_eq!(SignalKind::GapDuration24hPlus.key(), "gap_duration_24h_plus");
        assert_eq!(SignalKind::StsEvent(7).key(), "sts_event_7");
        assert_eq!(
            SignalKind::Watchlist("OFAC_SDN".to_string()).key(),
            "watchlist_OFAC_SDN"
        );
        assert_eq!(
            SignalKind::Spoofing(SpoofingType::CircleSpoof).key(),
            "spoofing_circle_spoof"
        );
    }

    #[test]
    fn map_rendering_separates_meta() {
        let mut breakdown = ScoreBreakdown::new();
        breakdown.push(SignalKind::GapDuration24hPlus, 55);
        breakdown.push(SignalKind::LegitimacyGapFree90d, -10);
        breakdown.meta = Some(BreakdownMeta {
            corridor_type: "sts_zone".to_string(),
            corridor_multiplier: 1.5,
            vessel_size_class: "vlcc".to_string(),
            vessel_size_multiplier: 1.3,
            additive_subtotal: 45,
            final_score: 97,
        });
        let map = breakdown.to_map();
        assert_eq!(map["gap_duration_24h_plus"], 55);
        assert_eq!(map["legitimacy_gap_free_90d"], -10);
        assert_eq!(map["_corridor_multiplier"], 1.5);
        assert_eq!(map["_final_score"], 97);
        // Signal sums ignore metadata keys by construction
        assert_eq!(breakdown.sum_risk(), 55);
        assert_eq!(breakdown.sum_legitimacy(), -10);
    }
}
