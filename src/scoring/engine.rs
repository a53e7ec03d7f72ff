//! Gap-event scoring: signal evaluation and three-phase composition.
//!
//! Evaluation order is fixed and semantic — several signals subsume or
//! gate one another:
//!
//! - speed anomaly: `speed_impossible` (position-error class, no
//!   duration bonus) > `speed_spoof` > `speed_spike` (both trigger the
//!   1.4× gap-duration bonus)
//! - dark zone: exit-impossible / high-speed entry / deduction are
//!   pairwise exclusive
//! - gap frequency: the single highest-scoring eligible tier only,
//!   counted on `original_vessel_id` to survive merges
//! - flag changes: flag+name-within-48h beats 7d beats 30d; the
//!   3-in-90d burst stacks separately
//! - STS: one event only (highest component) — a 3-vessel cluster must
//!   not triple-count
//! - loitering: a loiter-gap-loiter cycle subsumes duration signals
//! - weather deductions apply only when a speed-anomaly signal fired

use chrono::{DateTime, Datelike, Duration, Utc};
use statrs::statistics::{Data, OrderStatistics};
use tracing::info;

use super::{BreakdownMeta, ScoreBreakdown, ScoringConfig, SignalKind};
use crate::detectors::StepCounts;
use crate::geo::haversine_nm;
use crate::identity::{validate_imo_checksum, RUSSIAN_ORIGIN_FLAGS};
use crate::store::Store;
use crate::types::{
    AisClass, CorridorType, FlagRisk, GapEvent, PiCoverage, SpoofingType, StsDetectionType,
};

/// White-list flag jurisdictions (legitimacy deduction).
const WHITE_FLAGS: &[&str] = &["NO", "DK", "DE", "JP", "NL"];

/// Watchlist sources treated as sanctioned (vs shadow-fleet tracking).
const SANCTIONED_SOURCES: &[&str] = &["OFAC_SDN", "EU_COUNCIL"];

/// Per-class (spike, spoof) speed thresholds from config.
fn speed_thresholds(config: &ScoringConfig, dwt: Option<f64>) -> (f64, f64) {
    let dwt = dwt.unwrap_or(0.0);
    if dwt >= 200_000.0 {
        (
            config.get_nested("speed_anomaly", "vlcc_200k_plus_dwt", "spike_threshold_kn", 18.0),
            config.get_nested("speed_anomaly", "vlcc_200k_plus_dwt", "spoof_threshold_kn", 22.0),
        )
    } else if dwt >= 120_000.0 {
        (
            config.get_nested("speed_anomaly", "suezmax_120_200k_dwt", "spike_threshold_kn", 19.0),
            config.get_nested("speed_anomaly", "suezmax_120_200k_dwt", "spoof_threshold_kn", 23.0),
        )
    } else if dwt >= 80_000.0 {
        (
            config.get_nested("speed_anomaly", "aframax_80_120k_dwt", "spike_threshold_kn", 20.0),
            config.get_nested("speed_anomaly", "aframax_80_120k_dwt", "spoof_threshold_kn", 24.0),
        )
    } else if dwt >= 60_000.0 {
        (
            config.get_nested("speed_anomaly", "panamax_60_80k_dwt", "spike_threshold_kn", 20.0),
            config.get_nested("speed_anomaly", "panamax_60_80k_dwt", "spoof_threshold_kn", 24.0),
        )
    } else {
        (20.0, 24.0)
    }
}

/// Corridor multiplier and type label.
///
/// The corridor model's `risk_weight` is informational metadata only —
/// multipliers come from the scoring config. Anchorage-holding maps to
/// the standard 1.0×, never the trade-route discount.
fn corridor_multiplier(store: &Store, config: &ScoringConfig, gap: &GapEvent) -> (f64, String) {
    let Some(corridor) = gap.corridor_id.and_then(|id| store.corridor(id)) else {
        return (1.0, "none".to_string());
    };
    let label = corridor.corridor_type.as_str().to_string();
    let mult = match corridor.corridor_type {
        CorridorType::StsZone => config.get("corridor", "known_sts_zone", 1.5),
        CorridorType::ExportRoute => config.get("corridor", "high_risk_export_corridor", 1.5),
        CorridorType::LegitimateTradeRoute => {
            config.get("corridor", "legitimate_trade_route", 0.7)
        }
        _ => config.get("corridor", "standard_corridor", 1.0),
    };
    (mult, label)
}

/// Vessel-size multiplier and class label.
fn vessel_size_multiplier(store: &Store, config: &ScoringConfig, gap: &GapEvent) -> (f64, String) {
    let Some(dwt) = store.vessel(gap.vessel_id).and_then(|v| v.deadweight) else {
        return (1.0, "unknown".to_string());
    };
    if dwt >= 200_000.0 {
        (config.get("vessel_size_multiplier", "vlcc_200k_plus_dwt", 1.3), "vlcc".to_string())
    } else if dwt >= 120_000.0 {
        (config.get("vessel_size_multiplier", "suezmax_120_200k_dwt", 1.2), "suezmax".to_string())
    } else if dwt >= 80_000.0 {
        (config.get("vessel_size_multiplier", "aframax_80_120k_dwt", 1.0), "aframax".to_string())
    } else if dwt >= 60_000.0 {
        (config.get("vessel_size_multiplier", "panamax_60_80k_dwt", 0.8), "panamax".to_string())
    } else {
        (1.0, "sub_panamax".to_string())
    }
}

/// Compute the risk score for a single gap event.
///
/// `scoring_date` fixes "now" for age and window calculations so that
/// identical inputs always produce bit-identical output (I9).
#[allow(clippy::too_many_lines)]
pub fn compute_gap_score(
    store: &Store,
    config: &ScoringConfig,
    gap: &GapEvent,
    scoring_date: DateTime<Utc>,
) -> (i32, ScoreBreakdown) {
    let mut breakdown = ScoreBreakdown::new();
    let duration_h = gap.duration_hours();
    let vessel = store.vessel(gap.vessel_id);

    // ── Gap duration tiers ────────────────────────────────────────────
    let gap_duration_pts = if (2.0..4.0).contains(&duration_h) {
        let pts = config.get_i32("gap_duration", "2h_to_4h", 5);
        breakdown.push(SignalKind::GapDuration2h4h, pts);
        pts
    } else if (4.0..8.0).contains(&duration_h) {
        let pts = config.get_i32("gap_duration", "4h_to_8h", 12);
        breakdown.push(SignalKind::GapDuration4h8h, pts);
        pts
    } else if (8.0..12.0).contains(&duration_h) {
        let pts = config.get_i32("gap_duration", "8h_to_12h", 25);
        breakdown.push(SignalKind::GapDuration8h12h, pts);
        pts
    } else if (12.0..24.0).contains(&duration_h) {
        let pts = config.get_i32("gap_duration", "12h_to_24h", 40);
        breakdown.push(SignalKind::GapDuration12h24h, pts);
        pts
    } else if duration_h >= 24.0 {
        let pts = config.get_i32("gap_duration", "24h_plus", 55);
        breakdown.push(SignalKind::GapDuration24hPlus, pts);
        pts
    } else {
        0
    };

    // ── Speed anomaly tri-state ───────────────────────────────────────
    // Impossible speed (> 30 kn) is a position-error / MMSI-reuse class
    // signal, not evasive behavior: no duration bonus. Spoof supersedes
    // spike; both trigger the 1.4× gap-duration bonus.
    let pre_sog = gap.pre_gap_sog;
    let mut speed_signal_fired = false;
    let mut speed_bonus_applies = false;
    if let Some(sog) = pre_sog {
        if sog > 30.0 {
            breakdown.push(
                SignalKind::SpeedImpossible,
                config.get_i32("speed_anomaly", "speed_impossible", 40),
            );
            speed_signal_fired = true;
        } else if let Some(vessel) = vessel {
            let (spike_kn, spoof_kn) = speed_thresholds(config, vessel.deadweight);
            if sog >= spoof_kn {
                breakdown.push(
                    SignalKind::SpeedSpoofBeforeGap,
                    config.get_i32("speed_anomaly", "speed_spoof", 25),
                );
                speed_signal_fired = true;
                speed_bonus_applies = true;
            } else if sog >= spike_kn {
                breakdown.push(
                    SignalKind::SpeedSpikeBeforeGap,
                    config.get_i32("speed_anomaly", "speed_spike", 8),
                );
                speed_signal_fired = true;
                speed_bonus_applies = true;
            }
        }
    }
    if speed_bonus_applies && gap_duration_pts > 0 {
        let mult = config.get("speed_anomaly", "gap_preceded_by_speed_spike_multiplier", 1.4);
        let bonus = (f64::from(gap_duration_pts) * (mult - 1.0)).round() as i32;
        if bonus > 0 {
            breakdown.push(SignalKind::GapDurationSpeedSpikeBonus, bonus);
        }
    }

    // ── Movement envelope ─────────────────────────────────────────────
    if gap.impossible_speed_flag {
        breakdown.push(
            SignalKind::ImpossibleReappear,
            config.get_i32("movement_envelope", "impossible_reappear", 40),
        );
    } else if (0.7..1.0).contains(&gap.velocity_plausibility_ratio) {
        breakdown.push(
            SignalKind::NearImpossibleReappear,
            config.get_i32("movement_envelope", "near_impossible_reappear", 15),
        );
    }

    // ── Dark zone tri-state ───────────────────────────────────────────
    if gap.in_dark_zone {
        let has_dz_id = gap.dark_zone_id.is_some();
        if gap.impossible_speed_flag && has_dz_id {
            breakdown.push(
                SignalKind::DarkZoneExitImpossible,
                config.get_i32("dark_zone", "vessel_exits_dark_zone_with_impossible_jump", 35),
            );
        } else if has_dz_id {
            // High-speed entry followed by a short silence is
            // intentional evasion; a normal-speed gap in a jamming zone
            // is expected noise and deducts.
            let spike_kn =
                speed_thresholds(config, vessel.and_then(|v| v.deadweight)).0;
            let entry_speed = pre_sog.unwrap_or(0.0);
            if entry_speed > spike_kn && gap.duration_minutes < 360 {
                breakdown.push(
                    SignalKind::DarkZoneEntry,
                    config.get_i32("dark_zone", "gap_immediately_before_dark_zone_entry", 20),
                );
            } else {
                breakdown.push(
                    SignalKind::DarkZoneDeduction,
                    config.get_i32("dark_zone", "gap_in_known_jamming_zone", -10),
                );
            }
        } else {
            breakdown.push(
                SignalKind::DarkZoneDeduction,
                config.get_i32("dark_zone", "gap_in_known_jamming_zone", -10),
            );
        }
    }

    // ── Flat STS-corridor signal (amplified by the corridor multiplier) ─
    let gap_corridor_type = gap
        .corridor_id
        .and_then(|id| store.corridor(id))
        .map(|c| c.corridor_type);
    if gap_corridor_type == Some(CorridorType::StsZone) {
        breakdown.push(
            SignalKind::GapInStsTaggedCorridor,
            config.get_i32("sts", "gap_in_sts_tagged_corridor", 30),
        );
    }

    // ── Gap frequency: single highest-scoring eligible tier ───────────
    // Counts include this gap and filter on original_vessel_id (I7).
    let gaps_7d = store.count_gaps_in_window(gap, 7) + 1;
    let gaps_14d = store.count_gaps_in_window(gap, 14) + 1;
    let gaps_30d = store.count_gaps_in_window(gap, 30) + 1;
    let mut tiers: Vec<(SignalKind, i32)> = Vec::new();
    if gaps_30d >= 5 {
        tiers.push((SignalKind::GapFrequency5In30d, config.get_i32("gap_frequency", "5_gaps_in_30d", 50)));
    }
    if gaps_30d >= 4 {
        tiers.push((SignalKind::GapFrequency4In30d, config.get_i32("gap_frequency", "4_gaps_in_30d", 40)));
    }
    if gaps_14d >= 3 {
        tiers.push((SignalKind::GapFrequency3In14d, config.get_i32("gap_frequency", "3_gaps_in_14d", 32)));
    }
    if gaps_30d >= 3 {
        tiers.push((SignalKind::GapFrequency3In30d, config.get_i32("gap_frequency", "3_gaps_in_30d", 25)));
    }
    if gaps_7d >= 2 {
        tiers.push((SignalKind::GapFrequency2In7d, config.get_i32("gap_frequency", "2_gaps_in_7d", 18)));
    }
    if let Some((kind, pts)) = tiers.into_iter().max_by_key(|(_, pts)| *pts) {
        breakdown.push(kind, pts);
    }

    // ── Vessel-level signals ──────────────────────────────────────────
    if let Some(vessel) = vessel {
        match vessel.flag_risk {
            FlagRisk::Low => {
                let pts = config.get_i32("flag_state", "white_list_flag", -10);
                if pts != 0 {
                    breakdown.push(SignalKind::FlagWhiteList, pts);
                }
            }
            FlagRisk::High => {
                breakdown.push(
                    SignalKind::FlagHighRisk,
                    config.get_i32("flag_state", "high_risk_registry", 15),
                );
            }
            _ => {}
        }

        // Vessel age; 25+ composes with a high-risk flag
        if let Some(year_built) = vessel.year_built {
            let age = (scoring_date.year() - year_built).max(0);
            if age <= 10 {
                let pts = config.get_i32("vessel_age", "age_0_to_10y", -5);
                if pts != 0 {
                    breakdown.push(SignalKind::VesselAge0To10, pts);
                }
            } else if age <= 20 {
                // Zero by default but kept in the breakdown for explainability
                breakdown.push(
                    SignalKind::VesselAge10To20,
                    config.get_i32("vessel_age", "age_10_to_20y", 0),
                );
            } else if age <= 25 {
                breakdown.push(
                    SignalKind::VesselAge20To25,
                    config.get_i32("vessel_age", "age_20_to_25y", 10),
                );
            } else if vessel.flag_risk == FlagRisk::High {
                breakdown.push(
                    SignalKind::VesselAge25PlusHighRisk,
                    config.get_i32("vessel_age", "age_25_plus_AND_high_risk_flag", 30),
                );
            } else {
                breakdown.push(
                    SignalKind::VesselAge25Plus,
                    config.get_i32("vessel_age", "age_25_plus_y", 20),
                );
            }
        }

        // SOLAS requires Class A above ~3 000 DWT for tankers
        if vessel.ais_class == AisClass::B
            && vessel.deadweight.is_some_and(|dwt| dwt > 3_000.0)
        {
            breakdown.push(
                SignalKind::AisClassMismatch,
                config.get_i32("ais_class", "large_tanker_using_class_b", 25),
            );
        }

        match vessel.pi_coverage {
            PiCoverage::Lapsed => breakdown.push(
                SignalKind::PiCoverageLapsed,
                config.get_i32("pi_insurance", "pi_coverage_lapsed", 20),
            ),
            PiCoverage::Unknown => breakdown.push(
                SignalKind::PiCoverageUnknown,
                config.get_i32("pi_insurance", "pi_coverage_unknown", 5),
            ),
            PiCoverage::Active => {}
        }

        if vessel.psc_detained_last_12m {
            breakdown.push(
                SignalKind::PscDetainedLast12m,
                config.get_i32("psc_detention", "psc_detained_last_12m", 15),
            );
        }
        if vessel.psc_major_deficiencies_last_12m >= 3 {
            breakdown.push(
                SignalKind::PscMajorDeficiencies3Plus,
                config.get_i32("psc_detention", "psc_major_deficiencies_3_plus", 10),
            );
        }
    }

    // ── History-driven signals ────────────────────────────────────────
    let history = store.history_for_vessel(gap.vessel_id);
    let history_window_start = gap.gap_start - Duration::days(90);

    let class_switch = history.iter().any(|h| {
        h.field_changed == "ais_class"
            && h.observed_at >= history_window_start
            && h.old_value.as_deref().map(str::trim).map(str::to_uppercase) == Some("A".into())
            && h.new_value.as_deref().map(str::trim).map(str::to_uppercase) == Some("B".into())
    });
    if class_switch {
        breakdown.push(
            SignalKind::ClassSwitchingAToB,
            config.get_i32("ais_class", "class_switching_a_to_b", 25),
        );
    }

    if history
        .iter()
        .any(|h| h.field_changed == "callsign" && h.observed_at >= history_window_start)
    {
        breakdown.push(
            SignalKind::CallsignChange,
            config.get_i32("metadata", "callsign_change", 20),
        );
    }

    // ── Ownership sanctions ───────────────────────────────────────────
    if store
        .owner_for_vessel(gap.vessel_id)
        .is_some_and(|o| o.is_sanctioned)
    {
        breakdown.push(
            SignalKind::OwnerOnSanctionsList,
            config.get_i32("watchlist", "owner_or_manager_on_sanctions_list", 35),
        );
    }

    // ── Spoofing anomalies linked to this gap ─────────────────────────
    score_spoofing_signals(store, gap, &mut breakdown);

    // ── Loitering (with loiter-gap-loiter subsumption) + laid-up ──────
    score_loitering_signals(store, config, gap, &mut breakdown);
    if let Some(vessel) = vessel {
        if vessel.laid_up_in_sts_zone {
            breakdown.push(
                SignalKind::VesselLaidUpInStsZone,
                config.get_i32("behavioral", "vessel_laid_up_in_sts_zone", 30),
            );
        } else if vessel.laid_up_60d {
            breakdown.push(
                SignalKind::VesselLaidUp60d,
                config.get_i32("behavioral", "vessel_laid_up_60d_plus", 25),
            );
        } else if vessel.laid_up_30d {
            breakdown.push(
                SignalKind::VesselLaidUp30d,
                config.get_i32("behavioral", "vessel_laid_up_30d_plus", 15),
            );
        }
    }

    // ── STS events: single best within ±7 d ───────────────────────────
    score_sts_signal(store, config, gap, &mut breakdown);

    // ── Watchlist membership ──────────────────────────────────────────
    for entry in store.watchlist_for_vessel(gap.vessel_id) {
        if !entry.is_active {
            continue;
        }
        let pts = match entry.source.as_str() {
            "OFAC_SDN" => config.get_i32("watchlist", "vessel_on_ofac_sdn_list", 50),
            "EU_COUNCIL" => config.get_i32("watchlist", "vessel_on_eu_sanctions_list", 50),
            "KSE_SHADOW" => config.get_i32("watchlist", "vessel_on_kse_shadow_fleet_list", 30),
            _ => 20,
        };
        breakdown.push(SignalKind::Watchlist(entry.source.clone()), pts);
    }

    // ── Identity-change signals ───────────────────────────────────────
    score_identity_changes(store, config, gap, &mut breakdown);

    // ── Legitimacy deductions ─────────────────────────────────────────
    score_legitimacy_signals(store, config, gap, &mut breakdown);

    // ── Transmission cadence mismatch ─────────────────────────────────
    score_transmission_cadence(store, config, gap, &mut breakdown);

    // ── New MMSI & suspicious MID ─────────────────────────────────────
    if let Some(vessel) = vessel {
        if let Some(first_seen) = vessel.mmsi_first_seen {
            let age_days = (scoring_date - first_seen).num_days();
            if age_days < 30 {
                breakdown.push(
                    SignalKind::NewMmsiFirst30d,
                    config.get_i32("behavioral", "new_mmsi_first_30d", 15),
                );
                let ru_flag = vessel
                    .flag
                    .as_deref()
                    .is_some_and(|f| RUSSIAN_ORIGIN_FLAGS.contains(&f.to_uppercase().as_str()));
                if ru_flag {
                    breakdown.push(
                        SignalKind::NewMmsiRussianOriginFlag,
                        config.get_i32("behavioral", "new_mmsi_plus_russian_origin_zone", 25),
                    );
                }
            } else if age_days < 60 {
                breakdown.push(
                    SignalKind::NewMmsiFirst60d,
                    config.get_i32("behavioral", "new_mmsi_first_60d", 8),
                );
            }
        }
        if crate::identity::is_suspicious_mid(&vessel.mmsi) {
            breakdown.push(
                SignalKind::SuspiciousMid,
                config.get_i32("behavioral", "suspicious_mid", 25),
            );
        }
    }

    // ── Russian port-call composite ───────────────────────────────────
    if crate::identity::had_russian_port_call(store, gap.vessel_id, gap.gap_start, 30) {
        if gap_corridor_type == Some(CorridorType::StsZone) {
            breakdown.push(
                SignalKind::RussianPortGapSts,
                config.get_i32("behavioral", "russian_port_gap_sts", 40),
            );
        } else {
            breakdown.push(
                SignalKind::RussianPortRecent,
                config.get_i32("behavioral", "russian_port_recent", 25),
            );
        }
    }

    // ── Guilt-by-association via STS partners ─────────────────────────
    score_sts_partner_watchlist(store, gap, &mut breakdown);

    // ── Unmatched dark-vessel detections near the gap ─────────────────
    score_dark_detections(store, config, gap, &mut breakdown);

    // ── Identity-merge signals ────────────────────────────────────────
    let absorbed_count = history
        .iter()
        .filter(|h| h.field_changed == "mmsi_absorbed")
        .count();
    if absorbed_count > 0 {
        breakdown.push(
            SignalKind::IdentityMergeDetected,
            config.get_i32("identity_merge", "identity_merge_detected", 30),
        );
    }
    if let Some(vessel) = vessel {
        if let Some(imo) = &vessel.imo {
            if !validate_imo_checksum(imo) {
                breakdown.push(
                    SignalKind::ImoFabricated,
                    config.get_i32("identity_merge", "imo_fabricated", 40),
                );
            }
        }
    }
    if gap.in_dark_zone && breakdown.has_positive_signal() {
        breakdown.push(
            SignalKind::GapReactivationInJammingZone,
            config.get_i32("identity_merge", "gap_reactivation_in_jamming_zone", 15),
        );
    }

    // ── Fusion enrichment signals ─────────────────────────────────────
    score_fusion_signals(store, config, gap, &mut breakdown);

    // ── Weather deduction (speed-anomaly precondition) ────────────────
    if speed_signal_fired {
        if let Some(wind_kn) = store.gap_weather(gap.gap_event_id) {
            if wind_kn > 40.0 {
                breakdown.push(
                    SignalKind::WeatherHighWind,
                    config.get_i32("weather", "high_wind_deduction", -15),
                );
            } else if wind_kn > 25.0 {
                breakdown.push(
                    SignalKind::WeatherModerateWind,
                    config.get_i32("weather", "moderate_wind_deduction", -8),
                );
            }
        }
    }

    // ── Phase 2 + 3: asymmetric multiplier composition ────────────────
    let risk_signals = breakdown.sum_risk();
    let legitimacy_signals = breakdown.sum_legitimacy();
    let (corridor_mult, corridor_type) = corridor_multiplier(store, config, gap);
    let (size_mult, size_class) = vessel_size_multiplier(store, config, gap);

    let amplified = f64::from(risk_signals) * corridor_mult * size_mult;
    let final_score = ((amplified + f64::from(legitimacy_signals)).round() as i32).max(0);

    breakdown.meta = Some(BreakdownMeta {
        corridor_type,
        corridor_multiplier: corridor_mult,
        vessel_size_class: size_class,
        vessel_size_multiplier: size_mult,
        additive_subtotal: risk_signals + legitimacy_signals,
        final_score,
    });

    (final_score, breakdown)
}

/// Spoofing anomalies linked to this gap, or unlinked ones ending within
/// 2 h of the gap start. Erratic-nav anomalies collapse to their single
/// highest component.
fn score_spoofing_signals(store: &Store, gap: &GapEvent, breakdown: &mut ScoreBreakdown) {
    let window = Duration::hours(2);
    let relevant: Vec<&crate::types::SpoofingAnomaly> = store
        .anomalies_for_vessel(gap.vessel_id)
        .into_iter()
        .filter(|a| {
            a.gap_event_id == Some(gap.gap_event_id)
                || (a.gap_event_id.is_none()
                    && a.end_time >= gap.gap_start - window
                    && a.start_time <= gap.gap_start)
        })
        .collect();

    let erratic_max = relevant
        .iter()
        .filter(|a| a.anomaly_type == SpoofingType::ErraticNavStatus)
        .map(|a| a.risk_score_component)
        .max();
    if let Some(pts) = erratic_max {
        breakdown.push(SignalKind::SpoofingErraticNavStatus, pts);
    }

    for anomaly in relevant {
        if anomaly.anomaly_type == SpoofingType::ErraticNavStatus {
            continue;
        }
        let kind = if breakdown.contains(&SignalKind::Spoofing(anomaly.anomaly_type)) {
            SignalKind::SpoofingDup(anomaly.anomaly_type, anomaly.anomaly_id)
        } else {
            SignalKind::Spoofing(anomaly.anomaly_type)
        };
        breakdown.push(kind, anomaly.risk_score_component);
    }
}

/// Loitering within ±48 h of the gap. A loiter-gap-loiter cycle (both
/// neighbours) subsumes the one-sided pattern, which subsumes plain
/// duration signals.
fn score_loitering_signals(
    store: &Store,
    config: &ScoringConfig,
    gap: &GapEvent,
    breakdown: &mut ScoreBreakdown,
) {
    let window = Duration::hours(48);
    for loiter in store.loiters_for_vessel(gap.vessel_id) {
        if loiter.start_time < gap.gap_start - window || loiter.end_time > gap.gap_end + window {
            continue;
        }
        if loiter.preceding_gap_id.is_some() && loiter.following_gap_id.is_some() {
            breakdown.push(
                SignalKind::LoiterGapLoiterFull(loiter.loiter_id),
                config.get_i32("sts", "loiter_gap_loiter_full_cycle", 25),
            );
            continue;
        }
        if loiter.preceding_gap_id.is_some() || loiter.following_gap_id.is_some() {
            breakdown.push(
                SignalKind::LoiterGapPattern(loiter.loiter_id),
                config.get_i32("sts", "loiter_gap_loiter_pattern_48h_window", 15),
            );
            continue;
        }
        if loiter.corridor_id.is_some() {
            let sts_corridor = loiter
                .corridor_id
                .and_then(|id| store.corridor(id))
                .is_some_and(|c| c.corridor_type == CorridorType::StsZone);
            if loiter.duration_hours >= 12.0 && sts_corridor {
                breakdown.push(
                    SignalKind::Loitering(loiter.loiter_id),
                    config.get_i32("sts", "loitering_12h_plus_in_sts_corridor", 20),
                );
            } else if loiter.duration_hours >= 4.0 {
                breakdown.push(
                    SignalKind::Loitering(loiter.loiter_id),
                    config.get_i32("sts", "loitering_4h_plus_in_corridor", 8),
                );
            }
        }
    }
}

/// One STS signal only: the event with the highest component among
/// those overlapping the gap ±7 d. Dark-dark events add the
/// dark-partner bonus before comparison.
fn score_sts_signal(
    store: &Store,
    config: &ScoringConfig,
    gap: &GapEvent,
    breakdown: &mut ScoreBreakdown,
) {
    let window = Duration::days(7);
    let mut best: Option<(i64, i32)> = None;
    for event in store.sts_for_vessel(gap.vessel_id) {
        if event.start_time < gap.gap_start - window || event.end_time > gap.gap_end + window {
            continue;
        }
        let mut component = event.risk_score_component;
        if event.detection_type == StsDetectionType::DarkDark {
            component += config.get_i32("sts", "one_vessel_dark_during_proximity", 15);
        }
        if best.map_or(true, |(_, best_pts)| component > best_pts) {
            best = Some((event.sts_id, component));
        }
    }
    if let Some((sts_id, pts)) = best {
        breakdown.push(SignalKind::StsEvent(sts_id), pts);
    }
}

/// Flag / name / MMSI change hierarchy.
fn score_identity_changes(
    store: &Store,
    config: &ScoringConfig,
    gap: &GapEvent,
    breakdown: &mut ScoreBreakdown,
) {
    let history = store.history_for_vessel(gap.vessel_id);
    let window_start = gap.gap_start - Duration::days(90);
    let recent: Vec<_> = history
        .iter()
        .filter(|h| h.observed_at >= window_start)
        .collect();

    let flag_changes: Vec<_> = recent.iter().filter(|h| h.field_changed == "flag").collect();
    let name_changes: Vec<_> = recent.iter().filter(|h| h.field_changed == "name").collect();

    // Coordinated flag+name change inside 48 h wins the hierarchy
    let mut flag_and_name = false;
    'outer: for fc in &flag_changes {
        for nc in &name_changes {
            let diff_h = (fc.observed_at - nc.observed_at).num_seconds().abs() / 3600;
            if diff_h <= 48 {
                breakdown.push(
                    SignalKind::FlagAndNameChange48h,
                    config.get_i32("metadata", "flag_AND_name_change_within_48h", 30),
                );
                flag_and_name = true;
                break 'outer;
            }
        }
    }

    if !flag_and_name {
        let within = |days: i64| {
            flag_changes
                .iter()
                .any(|h| (gap.gap_start - h.observed_at).num_days() <= days)
        };
        if within(7) {
            breakdown.push(
                SignalKind::FlagChange7d,
                config.get_i32("metadata", "flag_change_in_last_7d", 35),
            );
        } else if within(30) {
            breakdown.push(
                SignalKind::FlagChange30d,
                config.get_i32("metadata", "flag_change_in_last_30d", 25),
            );
        }
    }

    // A burst of flag changes stacks — different severity class
    if flag_changes.len() >= 3 {
        breakdown.push(
            SignalKind::FlagChanges3Plus90d,
            config.get_i32("metadata", "3_plus_flag_changes_in_90d", 40),
        );
    }

    // Re-flagging countermeasure: high-risk registry washed to a
    // neutral one inside 12 months
    let reflagged = store
        .history_for_vessel(gap.vessel_id)
        .iter()
        .filter(|h| h.field_changed == "flag")
        .filter(|h| (gap.gap_start - h.observed_at).num_days() <= 365)
        .any(|h| {
            let old = h.old_value.as_deref().unwrap_or("").trim().to_uppercase();
            let new = h.new_value.as_deref().unwrap_or("").trim().to_uppercase();
            RUSSIAN_ORIGIN_FLAGS.contains(&old.as_str())
                && !RUSSIAN_ORIGIN_FLAGS.contains(&new.as_str())
        });
    if reflagged {
        breakdown.push(
            SignalKind::FlagChangeHighToLow12m,
            config.get_i32("metadata", "flag_change_from_high_risk_to_low_risk_12m", 20),
        );
    }

    // Name change during an active voyage (port departure → gap start,
    // capped at 30 d). Suppressed when the 48 h composite already fired.
    if !flag_and_name && !name_changes.is_empty() {
        let voyage_window_days = store
            .port_calls_for_vessel(gap.vessel_id)
            .iter()
            .filter(|c| c.departure.is_some_and(|d| d <= gap.gap_start))
            .filter_map(|c| c.departure)
            .max()
            .map_or(30, |departure| {
                (gap.gap_start - departure).num_days().max(1)
            });
        let during_voyage = name_changes
            .iter()
            .any(|h| (gap.gap_start - h.observed_at).num_days() <= voyage_window_days);
        if during_voyage {
            breakdown.push(
                SignalKind::NameChangeDuringVoyage,
                config.get_i32("metadata", "name_change_during_active_voyage", 30),
            );
        }
    }

    // MMSI change: verify position stability across the change (±6 h).
    // Same position (≤ 5 NM) means the hull did not move while the
    // identity did.
    let mmsi_changes: Vec<_> = recent.iter().filter(|h| h.field_changed == "mmsi").collect();
    if !mmsi_changes.is_empty() {
        let mut same_position = false;
        let mut verified_any = false;
        for change in &mmsi_changes {
            let before = store
                .points_for_vessel_between(
                    gap.vessel_id,
                    change.observed_at - Duration::hours(6),
                    change.observed_at,
                )
                .last()
                .map(|p| (p.lat, p.lon));
            let after = store
                .points_for_vessel_between(
                    gap.vessel_id,
                    change.observed_at,
                    change.observed_at + Duration::hours(6),
                )
                .first()
                .map(|p| (p.lat, p.lon));
            if let (Some(b), Some(a)) = (before, after) {
                verified_any = true;
                if haversine_nm(b.0, b.1, a.0, a.1) <= 5.0 {
                    same_position = true;
                    break;
                }
            }
        }
        // Unverifiable position: conservative — assume same position
        if same_position || !verified_any {
            breakdown.push(
                SignalKind::MmsiChange,
                config.get_i32("metadata", "mmsi_change_mapped_same_position", 45),
            );
        } else {
            breakdown.push(SignalKind::MmsiChangeDifferentPosition, 20);
        }
    }
}

fn score_legitimacy_signals(
    store: &Store,
    config: &ScoringConfig,
    gap: &GapEvent,
    breakdown: &mut ScoreBreakdown,
) {
    let Some(vessel) = store.vessel(gap.vessel_id) else {
        return;
    };

    // Gap-free 90 d; a high-risk flag never earns the clean deduction
    let prior_gaps = store.count_gaps_in_window(gap, 90);
    if prior_gaps == 0 && vessel.flag_risk != FlagRisk::High {
        breakdown.push(
            SignalKind::LegitimacyGapFree90d,
            config.get_i32("legitimacy", "gap_free_90d_clean", -10),
        );
    }

    // Every point Class A
    if store.has_points(gap.vessel_id) && !store.has_non_class_a_point(gap.vessel_id) {
        breakdown.push(
            SignalKind::LegitimacyAisClassAConsistent,
            config.get_i32("legitimacy", "ais_class_a_consistent", -5),
        );
    }

    // White-list flag jurisdiction
    if vessel
        .flag
        .as_deref()
        .is_some_and(|f| WHITE_FLAGS.contains(&f.to_uppercase().as_str()))
    {
        breakdown.push(
            SignalKind::LegitimacyWhiteFlagJurisdiction,
            config.get_i32("legitimacy", "white_flag_jurisdiction", -10),
        );
    }

    // EU port calls: −5 each, capped at 3
    let eu_calls = store
        .port_calls_for_vessel(gap.vessel_id)
        .iter()
        .filter(|c| {
            c.port_id
                .and_then(|id| store.port(id))
                .is_some_and(|p| p.is_eu)
        })
        .count();
    if eu_calls > 0 {
        let per_call = config.get_i32("legitimacy", "consistent_eu_port_calls", -5);
        breakdown.push(
            SignalKind::LegitimacyEuPortCalls,
            per_call * (eu_calls.min(3) as i32),
        );
    }
}

/// Class A vessels should report every 2-10 s; a median interval above
/// 25 s in the 24 h before the gap is a deliberate cadence reduction.
fn score_transmission_cadence(
    store: &Store,
    config: &ScoringConfig,
    gap: &GapEvent,
    breakdown: &mut ScoreBreakdown,
) {
    let Some(vessel) = store.vessel(gap.vessel_id) else {
        return;
    };
    if vessel.ais_class != AisClass::A {
        return;
    }
    let points = store.points_for_vessel_between(
        gap.vessel_id,
        gap.gap_start - Duration::hours(24),
        gap.gap_start,
    );
    if points.len() < 3 {
        return;
    }
    let intervals: Vec<f64> = points
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64)
        .collect();
    let median = Data::new(intervals).median();
    if median > 25.0 {
        breakdown.push(
            SignalKind::TransmissionFrequencyMismatch,
            config.get_i32("ais_class", "transmission_frequency_mismatch", 8),
        );
    }
}

/// STS partners on active watchlists: sanctioned sources beat
/// shadow-fleet trackers.
fn score_sts_partner_watchlist(store: &Store, gap: &GapEvent, breakdown: &mut ScoreBreakdown) {
    let mut best_score = 0;
    let mut best_sanctioned = false;
    for event in store.sts_for_vessel(gap.vessel_id) {
        let partner = if event.vessel_1_id == gap.vessel_id {
            event.vessel_2_id
        } else {
            event.vessel_1_id
        };
        for entry in store.watchlist_for_vessel(partner) {
            if !entry.is_active {
                continue;
            }
            let sanctioned = SANCTIONED_SOURCES.contains(&entry.source.as_str());
            let pts = if sanctioned { 30 } else { 20 };
            if pts > best_score {
                best_score = pts;
                best_sanctioned = sanctioned;
            }
        }
    }
    if best_score > 0 {
        let kind = if best_sanctioned {
            SignalKind::StsWithSanctionedVessel
        } else {
            SignalKind::StsWithShadowFleetVessel
        };
        breakdown.push(kind, best_score);
    }
}

/// Unmatched SAR/GFW detections inside the gap window (±6 h) matched by
/// corridor or spatial proximity to the gap's plausible area.
fn score_dark_detections(
    store: &Store,
    config: &ScoringConfig,
    gap: &GapEvent,
    breakdown: &mut ScoreBreakdown,
) {
    let window = Duration::hours(6);
    let gap_pos = gap
        .start_point_id
        .and_then(|id| store.ais_point(id))
        .map(|p| (p.lat, p.lon));
    let max_radius = if gap.max_plausible_distance_nm > 0.0 {
        gap.max_plausible_distance_nm
    } else {
        200.0
    };

    let mut corridor_match = false;
    let mut proximity_match = false;
    for detection in store.dark_detections() {
        if detection.ais_match_result != "unmatched" {
            continue;
        }
        if detection.detection_time < gap.gap_start - window
            || detection.detection_time > gap.gap_end + window
        {
            continue;
        }
        if let (Some(det_corridor), Some(gap_corridor)) = (detection.corridor_id, gap.corridor_id) {
            if det_corridor == gap_corridor {
                corridor_match = true;
                continue;
            }
        }
        if let Some((lat, lon)) = gap_pos {
            if haversine_nm(lat, lon, detection.lat, detection.lon) <= max_radius {
                proximity_match = true;
            }
        }
    }

    if corridor_match {
        breakdown.push(
            SignalKind::DarkVesselUnmatchedInCorridor,
            config.get_i32("dark_vessel", "unmatched_detection_in_corridor", 35),
        );
    } else if proximity_match {
        breakdown.push(
            SignalKind::DarkVesselUnmatched,
            config.get_i32("dark_vessel", "unmatched_detection_outside_corridor", 20),
        );
    }
}

/// Fusion-derived signals: merge chains, relay chains, convoys,
/// floating storage, Arctic routing, voyage deviation and cargo state.
/// Presence of the records implies the corresponding module ran.
fn score_fusion_signals(
    store: &Store,
    config: &ScoringConfig,
    gap: &GapEvent,
    breakdown: &mut ScoreBreakdown,
) {
    // Merge chains
    let chains = store.chains_containing(gap.vessel_id);
    if let Some(largest) = chains.iter().max_by_key(|c| c.vessel_ids.len()) {
        if largest.vessel_ids.len() >= 4 {
            breakdown.push(
                SignalKind::MergeChain4Plus,
                config.get_i32("fleet", "merge_chain_4plus", 25),
            );
        } else {
            breakdown.push(
                SignalKind::MergeChain3,
                config.get_i32("fleet", "merge_chain_3", 15),
            );
        }
        if chains.iter().any(|c| c.contains_scrapped_imo) {
            breakdown.push(
                SignalKind::ScrappedImoInChain,
                config.get_i32("fleet", "scrapped_imo_in_chain", 35),
            );
        }
    }

    // STS relay chains
    let relay_hops = store
        .fleet_alerts_for_vessel(gap.vessel_id)
        .iter()
        .filter(|a| a.alert_type == "sts_relay_chain")
        .filter_map(|a| a.evidence.get("hops").and_then(serde_json::Value::as_i64))
        .max();
    if let Some(hops) = relay_hops {
        if hops >= 4 {
            breakdown.push(
                SignalKind::StsRelayChain4Plus,
                config.get_i32("fleet", "sts_relay_chain_4plus", 40),
            );
        } else {
            breakdown.push(
                SignalKind::StsRelayChain3,
                config.get_i32("fleet", "sts_relay_chain_3", 20),
            );
        }
    }

    // Convoys: best tier among events overlapping the gap ±7 d
    let window = Duration::days(7);
    let best_convoy = store
        .convoys_for_vessel(gap.vessel_id)
        .into_iter()
        .filter(|c| c.start_time <= gap.gap_end + window && c.end_time >= gap.gap_start - window)
        .max_by(|a, b| {
            a.duration_hours
                .partial_cmp(&b.duration_hours)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    if let Some(convoy) = best_convoy {
        let (kind, key, default) = if convoy.duration_hours >= 24.0 {
            (SignalKind::Convoy24hPlus, "convoy_24h_plus", 35)
        } else if convoy.duration_hours >= 8.0 {
            (SignalKind::Convoy8To24h, "convoy_8_24h", 25)
        } else {
            (SignalKind::Convoy4To8h, "convoy_4_8h", 15)
        };
        breakdown.push(kind, config.get_i32("fleet", key, default));
    }

    // Fleet alerts from the remaining fusion passes
    for alert in store.fleet_alerts_for_vessel(gap.vessel_id) {
        match alert.alert_type.as_str() {
            "floating_storage" => breakdown.push(
                SignalKind::FloatingStorage,
                config.get_i32("fleet", "floating_storage", 25),
            ),
            "arctic_no_ice_class" => breakdown.push(
                SignalKind::ArcticNoIceClass,
                config.get_i32("fleet", "arctic_no_ice_class", 25),
            ),
            "route_deviation_sts" => breakdown.push(
                SignalKind::RouteDeviationTowardSts,
                config.get_i32("fleet", "route_deviation_toward_sts", 25),
            ),
            "laden_russian_sts" => breakdown.push(
                SignalKind::LadenRussianSts,
                config.get_i32("fleet", "laden_russian_sts", 15),
            ),
            _ => {}
        }
    }
}

/// Score all unscored gap events in ascending gap ID order.
///
/// Returns `{scored}`.
pub fn score_all(
    store: &mut Store,
    config: &ScoringConfig,
    scoring_date: DateTime<Utc>,
) -> StepCounts {
    let mut scored = 0_i64;
    for gap_id in store.gap_ids() {
        let Some(gap) = store.gap(gap_id) else { continue };
        if gap.risk_score != 0 {
            continue;
        }
        let gap_snapshot = gap.clone();
        let (score, breakdown) = compute_gap_score(store, config, &gap_snapshot, scoring_date);
        if let Some(gap) = store.gap_mut(gap_id) {
            gap.risk_score = score;
            gap.risk_breakdown = Some(breakdown);
            scored += 1;
        }
    }
    store.commit("risk_scoring");

    info!(scored, "Scored gap alerts");
    let mut counts = StepCounts::new();
    counts.insert("scored".to_string(), scored);
    counts
}

/// Clear and recompute every risk score; optionally purge derived
/// detection tables first (requires re-running detection afterwards).
///
/// Returns `{rescored, detections_cleared}` plus the config hash.
pub fn rescore_all(
    store: &mut Store,
    config: &ScoringConfig,
    clear_detections: bool,
    scoring_date: DateTime<Utc>,
) -> (StepCounts, String) {
    let config_hash = config.hash();

    if clear_detections {
        store.clear_anomalies();
        store.clear_loitering();
        store.clear_sts_events();
        store.commit("rescore.clear_detections");
        info!("Cleared detection signals (clear_detections=true)");
    }

    for gap_id in store.gap_ids() {
        if let Some(gap) = store.gap_mut(gap_id) {
            gap.risk_score = 0;
            gap.risk_breakdown = None;
        }
    }
    let mut counts = score_all(store, config, scoring_date);
    let scored = counts.remove("scored").unwrap_or(0);
    counts.insert("rescored".to_string(), scored);
    counts.insert("detections_cleared".to_string(), i64::from(clear_detections));

    info!(rescored = scored, config_hash = %config_hash, "Rescored all alerts");
    (counts, config_hash)
}

/// Rescore every gap event of one vessel (merge aftermath).
pub fn rescore_vessel(
    store: &mut Store,
    config: &ScoringConfig,
    vessel_id: i64,
    scoring_date: DateTime<Utc>,
) {
    for gap_id in store.gap_ids_for_vessel(vessel_id) {
        let Some(gap) = store.gap(gap_id).cloned() else { continue };
        let (score, breakdown) = compute_gap_score(store, config, &gap, scoring_date);
        if let Some(gap) = store.gap_mut(gap_id) {
            gap.risk_score = score;
            gap.risk_breakdown = Some(breakdown);
        }
    }
}

/// Final pipeline step: band distribution over scored alerts.
pub fn classify_confidence(store: &Store) -> StepCounts {
    let mut counts = StepCounts::new();
    for label in ["low", "medium", "high", "critical"] {
        counts.insert(label.to_string(), 0);
    }
    for gap_id in store.gap_ids() {
        if let Some(gap) = store.gap(gap_id) {
            let band = super::score_band(gap.risk_score);
            *counts.entry(band.to_string()).or_default() += 1;
        }
    }
    counts
}
