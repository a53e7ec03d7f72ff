//! Risk Scoring Regression Tests
//!
//! Exercises the three-phase scoring composition against hand-built
//! store fixtures. Asserts on determinism, breakdown arithmetic,
//! subsumption rules, and multiplier asymmetry.

use chrono::{DateTime, Duration, TimeZone, Utc};
use darkfleet::scoring::{compute_gap_score, score_band, ScoringConfig, SignalKind};
use darkfleet::types::{
    AisClass, Corridor, CorridorType, GapEvent, GapStatus, PiCoverage, SpoofingAnomaly,
    SpoofingType,
};
use darkfleet::Store;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
}

fn ts(h: i64) -> DateTime<Utc> {
    base() + Duration::hours(h)
}

/// Fixed reference time for reproducible scoring.
fn scoring_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid date")
}

fn sts_corridor(store: &mut Store) -> i64 {
    store.add_corridor(Corridor {
        corridor_id: 0,
        name: "Laconian Gulf STS anchorage".to_string(),
        corridor_type: CorridorType::StsZone,
        risk_weight: 2.0,
        is_jamming_zone: false,
        description: None,
        geometry: "POLYGON((22.0 36.0, 23.0 36.0, 23.0 37.0, 22.0 37.0, 22.0 36.0))".to_string(),
        tags: Default::default(),
    })
}

#[allow(clippy::too_many_arguments)]
fn make_gap(
    store: &mut Store,
    vessel: i64,
    start_h: i64,
    duration_h: i64,
    corridor_id: Option<i64>,
) -> i64 {
    let id = store.alloc_gap_id();
    store.add_gap(GapEvent {
        gap_event_id: id,
        vessel_id: vessel,
        original_vessel_id: Some(vessel),
        gap_start: ts(start_h),
        gap_end: ts(start_h + duration_h),
        duration_minutes: duration_h * 60,
        start_point_id: None,
        end_point_id: None,
        corridor_id,
        dark_zone_id: None,
        in_dark_zone: false,
        impossible_speed_flag: false,
        velocity_plausibility_ratio: 0.3,
        max_plausible_distance_nm: 450.0,
        actual_gap_distance_nm: 130.0,
        pre_gap_sog: Some(11.0),
        risk_score: 0,
        risk_breakdown: None,
        status: GapStatus::New,
    });
    id
}

/// Seed scenario: VLCC, flag PA, year 2005, 25 h silence inside an STS
/// anchorage corridor. Must land critical with both multipliers.
#[test]
fn vlcc_long_gap_in_sts_corridor_is_critical() {
    let mut store = Store::new();
    let corridor = sts_corridor(&mut store);
    let v = store.create_vessel("351000001");
    {
        let vessel = store.vessel_mut(v).expect("vessel exists");
        vessel.deadweight = Some(250_000.0);
        vessel.flag = Some("PA".to_string());
        vessel.year_built = Some(2005);
    }
    // Clean Class A track bracketing the silence
    store.add_ais_point(v, ts(-1), 36.5, 22.5, Some(11.0), Some(90.0), None, None, None, AisClass::A);
    store.add_ais_point(v, ts(26), 36.6, 22.6, Some(11.0), Some(90.0), None, None, None, AisClass::A);

    let gap_id = make_gap(&mut store, v, 0, 25, Some(corridor));
    let gap = store.gap(gap_id).expect("gap exists").clone();
    let config = ScoringConfig::default();
    let (score, breakdown) = compute_gap_score(&store, &config, &gap, scoring_date());

    assert!(score >= 76, "expected critical, got {score}");
    assert_eq!(score_band(score), "critical");
    assert_eq!(breakdown.get(&SignalKind::GapDuration24hPlus), Some(55));
    assert_eq!(breakdown.get(&SignalKind::GapInStsTaggedCorridor), Some(30));
    assert_eq!(breakdown.get(&SignalKind::VesselAge20To25), Some(10));
    assert_eq!(breakdown.get(&SignalKind::PiCoverageUnknown), Some(5));

    let meta = breakdown.meta.as_ref().expect("meta present");
    assert_eq!(meta.corridor_multiplier, 1.5);
    assert_eq!(meta.corridor_type, "sts_zone");
    assert_eq!(meta.vessel_size_multiplier, 1.3);
    assert_eq!(meta.vessel_size_class, "vlcc");
}

/// P5: identical inputs and scoring date produce bit-identical output.
#[test]
fn scoring_is_deterministic() {
    let mut store = Store::new();
    let corridor = sts_corridor(&mut store);
    let v = store.create_vessel("351000001");
    store.vessel_mut(v).expect("vessel exists").deadweight = Some(250_000.0);
    let gap_id = make_gap(&mut store, v, 0, 25, Some(corridor));
    let gap = store.gap(gap_id).expect("gap exists").clone();
    let config = ScoringConfig::default();

    let (score_a, breakdown_a) = compute_gap_score(&store, &config, &gap, scoring_date());
    let (score_b, breakdown_b) = compute_gap_score(&store, &config, &gap, scoring_date());
    assert_eq!(score_a, score_b);
    assert_eq!(breakdown_a, breakdown_b);
    assert_eq!(
        serde_json::to_string(&breakdown_a.to_map()).expect("serializes"),
        serde_json::to_string(&breakdown_b.to_map()).expect("serializes"),
    );
}

/// P6: the stored final score equals the recomposition from the
/// breakdown map.
#[test]
fn breakdown_arithmetic_recomposes() {
    let mut store = Store::new();
    let corridor = sts_corridor(&mut store);
    let v = store.create_vessel("351000001");
    {
        let vessel = store.vessel_mut(v).expect("vessel exists");
        vessel.deadweight = Some(250_000.0);
        vessel.year_built = Some(1990);
        vessel.pi_coverage = PiCoverage::Lapsed;
    }
    let gap_id = make_gap(&mut store, v, 0, 25, Some(corridor));
    let gap = store.gap(gap_id).expect("gap exists").clone();
    let config = ScoringConfig::default();
    let (score, breakdown) = compute_gap_score(&store, &config, &gap, scoring_date());

    let meta = breakdown.meta.as_ref().expect("meta present");
    let recomposed = (f64::from(breakdown.sum_risk())
        * meta.corridor_multiplier
        * meta.vessel_size_multiplier
        + f64::from(breakdown.sum_legitimacy()))
    .round() as i32;
    assert_eq!(score, recomposed.max(0));
    assert_eq!(meta.final_score, score);
    assert_eq!(meta.additive_subtotal, breakdown.sum_risk() + breakdown.sum_legitimacy());
}

/// P7: legitimacy deductions are never amplified — two gaps identical
/// except for the corridor differ only in the multiplied risk part.
#[test]
fn multiplier_asymmetry_spares_deductions() {
    let config = ScoringConfig::default();

    let score_with = |in_zone: bool| -> (i32, i32, i32) {
        let mut store = Store::new();
        let corridor = in_zone.then(|| sts_corridor(&mut store));
        let v = store.create_vessel("211000001");
        {
            let vessel = store.vessel_mut(v).expect("vessel exists");
            vessel.deadweight = Some(100_000.0);
            vessel.flag = Some("DE".to_string()); // white-flag deduction
        }
        store.add_ais_point(v, ts(-1), 36.5, 22.5, Some(10.0), None, None, None, None, AisClass::A);
        let gap_id = make_gap(&mut store, v, 0, 10, corridor);
        let gap = store.gap(gap_id).expect("gap exists").clone();
        let (score, breakdown) = compute_gap_score(&store, &config, &gap, scoring_date());
        (score, breakdown.sum_risk(), breakdown.sum_legitimacy())
    };

    let (score_zone, risk_zone, legit_zone) = score_with(true);
    let (score_none, risk_none, legit_none) = score_with(false);

    // Negative totals identical in both zones
    assert_eq!(legit_zone, legit_none);
    assert!(legit_zone < 0);
    // Risk part in the zone includes the flat STS signal and the 1.5×
    let expected_zone = (f64::from(risk_zone) * 1.5 + f64::from(legit_zone)).round() as i32;
    let expected_none = (f64::from(risk_none) * 1.0 + f64::from(legit_none)).round() as i32;
    assert_eq!(score_zone, expected_zone.max(0));
    assert_eq!(score_none, expected_none.max(0));
}

/// S4 + P8: five gaps in 30 days emit exactly one frequency key — the
/// highest tier.
#[test]
fn gap_frequency_emits_single_highest_tier() {
    let mut store = Store::new();
    let v = store.create_vessel("211000001");
    // One gap every 6 days; the fifth is the scored one
    let mut last_gap = 0;
    for i in 0..5 {
        last_gap = make_gap(&mut store, v, i * 6 * 24, 3, None);
    }
    let gap = store.gap(last_gap).expect("gap exists").clone();
    let config = ScoringConfig::default();
    let (_, breakdown) = compute_gap_score(&store, &config, &gap, scoring_date());

    assert_eq!(breakdown.get(&SignalKind::GapFrequency5In30d), Some(50));
    let frequency_keys = breakdown
        .entries()
        .iter()
        .filter(|(k, _)| k.key().starts_with("gap_frequency_"))
        .count();
    assert_eq!(frequency_keys, 1, "no two gap_frequency_* keys may coexist");
}

/// P9: the three dark-zone outcomes are pairwise exclusive.
#[test]
fn dark_zone_tri_state_is_exclusive() {
    let config = ScoringConfig::default();
    let variants = [
        (true, true),   // impossible + zone id → exit_impossible
        (false, true),  // zone id, slow entry → deduction
        (false, false), // jamming corridor only → deduction
    ];
    for (impossible, with_zone_id) in variants {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        let dark_zone = store.add_corridor(Corridor {
            corridor_id: 0,
            name: "Kerch jamming".to_string(),
            corridor_type: CorridorType::DarkZone,
            risk_weight: 1.0,
            is_jamming_zone: true,
            description: None,
            geometry: "POLYGON((36.0 44.0, 37.0 45.0))".to_string(),
            tags: Default::default(),
        });
        let gap_id = store.alloc_gap_id();
        store.add_gap(GapEvent {
            gap_event_id: gap_id,
            vessel_id: v,
            original_vessel_id: Some(v),
            gap_start: ts(0),
            gap_end: ts(10),
            duration_minutes: 600,
            start_point_id: None,
            end_point_id: None,
            corridor_id: None,
            dark_zone_id: with_zone_id.then_some(dark_zone),
            in_dark_zone: true,
            impossible_speed_flag: impossible,
            velocity_plausibility_ratio: if impossible { 1.5 } else { 0.3 },
            max_plausible_distance_nm: 170.0,
            actual_gap_distance_nm: if impossible { 260.0 } else { 50.0 },
            pre_gap_sog: Some(5.0),
            risk_score: 0,
            risk_breakdown: None,
            status: GapStatus::New,
        });
        let gap = store.gap(gap_id).expect("gap exists").clone();
        let (_, breakdown) = compute_gap_score(&store, &config, &gap, scoring_date());
        let fired = [
            breakdown.contains(&SignalKind::DarkZoneExitImpossible),
            breakdown.contains(&SignalKind::DarkZoneEntry),
            breakdown.contains(&SignalKind::DarkZoneDeduction),
        ]
        .iter()
        .filter(|fired| **fired)
        .count();
        assert_eq!(fired, 1, "exactly one dark-zone signal per gap");
    }
}

/// Speed anomaly subsumption: impossible > spoof > spike, with the
/// duration bonus reserved for the evasion-class signals.
#[test]
fn speed_anomaly_subsumption_and_bonus() {
    let config = ScoringConfig::default();
    let with_pre_sog = |sog: f64| -> darkfleet::ScoreBreakdown {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        store.vessel_mut(v).expect("vessel exists").deadweight = Some(250_000.0);
        let gap_id = store.alloc_gap_id();
        store.add_gap(GapEvent {
            gap_event_id: gap_id,
            vessel_id: v,
            original_vessel_id: Some(v),
            gap_start: ts(0),
            gap_end: ts(10),
            duration_minutes: 600,
            start_point_id: None,
            end_point_id: None,
            corridor_id: None,
            dark_zone_id: None,
            in_dark_zone: false,
            impossible_speed_flag: false,
            velocity_plausibility_ratio: 0.3,
            max_plausible_distance_nm: 180.0,
            actual_gap_distance_nm: 60.0,
            pre_gap_sog: Some(sog),
            risk_score: 0,
            risk_breakdown: None,
            status: GapStatus::New,
        });
        let gap = store.gap(gap_id).expect("gap exists").clone();
        compute_gap_score(&store, &config, &gap, scoring_date()).1
    };

    // > 30 kn: position-error class, no duration bonus
    let impossible = with_pre_sog(35.0);
    assert_eq!(impossible.get(&SignalKind::SpeedImpossible), Some(40));
    assert!(!impossible.contains(&SignalKind::SpeedSpoofBeforeGap));
    assert!(!impossible.contains(&SignalKind::GapDurationSpeedSpikeBonus));

    // VLCC spoof threshold 22: spoof + bonus, no spike
    let spoof = with_pre_sog(23.0);
    assert_eq!(spoof.get(&SignalKind::SpeedSpoofBeforeGap), Some(25));
    assert!(!spoof.contains(&SignalKind::SpeedSpikeBeforeGap));
    // 8-12 h tier = 25 points; bonus = round(25 × 0.4) = 10
    assert_eq!(spoof.get(&SignalKind::GapDurationSpeedSpikeBonus), Some(10));

    // VLCC spike threshold 18: spike + bonus
    let spike = with_pre_sog(19.0);
    assert_eq!(spike.get(&SignalKind::SpeedSpikeBeforeGap), Some(8));
    assert_eq!(spike.get(&SignalKind::GapDurationSpeedSpikeBonus), Some(10));

    // Below every threshold: nothing fires
    let clean = with_pre_sog(12.0);
    assert!(!clean.contains(&SignalKind::SpeedSpikeBeforeGap));
    assert!(!clean.contains(&SignalKind::SpeedSpoofBeforeGap));
    assert!(!clean.contains(&SignalKind::SpeedImpossible));
}

/// Weather deductions require a speed-anomaly signal on the same gap.
#[test]
fn weather_deduction_gated_on_speed_anomaly() {
    let config = ScoringConfig::default();
    let run = |pre_sog: f64, wind: f64| -> darkfleet::ScoreBreakdown {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        store.vessel_mut(v).expect("vessel exists").deadweight = Some(250_000.0);
        let gap_id = make_gap(&mut store, v, 0, 10, None);
        if let Some(gap) = store.gap_mut(gap_id) {
            gap.pre_gap_sog = Some(pre_sog);
        }
        store.set_gap_weather(gap_id, wind);
        let gap = store.gap(gap_id).expect("gap exists").clone();
        compute_gap_score(&store, &config, &gap, scoring_date()).1
    };

    // Spoof-level speed + storm wind → deduction applies
    let gated_on = run(23.0, 45.0);
    assert_eq!(gated_on.get(&SignalKind::WeatherHighWind), Some(-15));

    // Moderate wind band
    let moderate = run(23.0, 30.0);
    assert_eq!(moderate.get(&SignalKind::WeatherModerateWind), Some(-8));

    // No speed anomaly → no weather deduction even with storm wind
    let gated_off = run(12.0, 45.0);
    assert!(!gated_off.contains(&SignalKind::WeatherHighWind));
    assert!(!gated_off.contains(&SignalKind::WeatherModerateWind));
}

/// Erratic-nav anomalies collapse to one signal at the highest
/// component; other typologies keep their own keys.
#[test]
fn spoofing_signals_cap_erratic_and_keep_others() {
    let mut store = Store::new();
    let v = store.create_vessel("211000001");
    let gap_id = make_gap(&mut store, v, 0, 10, None);
    for (anomaly_type, score) in [
        (SpoofingType::ErraticNavStatus, 12),
        (SpoofingType::ErraticNavStatus, 8),
        (SpoofingType::CircleSpoof, 35),
    ] {
        store.add_anomaly(SpoofingAnomaly {
            anomaly_id: 0,
            vessel_id: v,
            anomaly_type,
            start_time: ts(1),
            end_time: ts(2),
            implied_speed_kn: None,
            risk_score_component: score,
            evidence: serde_json::json!({}),
            gap_event_id: Some(gap_id),
            created_at: ts(0),
        });
    }
    let gap = store.gap(gap_id).expect("gap exists").clone();
    let config = ScoringConfig::default();
    let (_, breakdown) = compute_gap_score(&store, &config, &gap, scoring_date());

    assert_eq!(breakdown.get(&SignalKind::SpoofingErraticNavStatus), Some(12));
    assert_eq!(
        breakdown.get(&SignalKind::Spoofing(SpoofingType::CircleSpoof)),
        Some(35)
    );
    let erratic_count = breakdown
        .entries()
        .iter()
        .filter(|(k, _)| k.key().starts_with("spoofing_erratic"))
        .count();
    assert_eq!(erratic_count, 1);
}

/// Config overrides flow through to the emitted points.
#[test]
fn config_overrides_apply() {
    let config = ScoringConfig::from_toml(
        r#"
        [gap_duration]
        "24h_plus" = 70.0

        [corridor]
        known_sts_zone = 2.0
        "#,
    )
    .expect("valid TOML");

    let mut store = Store::new();
    let corridor = sts_corridor(&mut store);
    let v = store.create_vessel("211000001");
    let gap_id = make_gap(&mut store, v, 0, 25, Some(corridor));
    let gap = store.gap(gap_id).expect("gap exists").clone();
    let (_, breakdown) = compute_gap_score(&store, &config, &gap, scoring_date());

    assert_eq!(breakdown.get(&SignalKind::GapDuration24hPlus), Some(70));
    assert_eq!(breakdown.meta.as_ref().expect("meta").corridor_multiplier, 2.0);
}

/// Rescore clears and recomputes everything, reporting the config hash.
#[test]
fn rescore_all_reports_config_hash() {
    let mut store = Store::new();
    let v = store.create_vessel("211000001");
    make_gap(&mut store, v, 0, 25, None);
    let config = ScoringConfig::default();

    darkfleet::scoring::score_all(&mut store, &config, scoring_date());
    let first_score = store.gap(1).expect("gap exists").risk_score;
    assert!(first_score > 0);

    let (counts, hash) =
        darkfleet::scoring::rescore_all(&mut store, &config, false, scoring_date());
    assert_eq!(counts["rescored"], 1);
    assert_eq!(hash.len(), 8);
    assert_eq!(store.gap(1).expect("gap exists").risk_score, first_score);
}
