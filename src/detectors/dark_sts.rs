//! Dark-dark STS detection (Phase C) and the corridor gap-rate baseline.
//!
//! Two tankers that both go silent in the same corridor with
//! substantially overlapping gaps and nearby last-known positions are a
//! strong mid-ocean transfer indicator — neither vessel is visible, so
//! the output is a candidate for satellite tasking rather than a
//! confirmed event.
//!
//! Corridors whose current gap rate exceeds their P95 baseline are
//! suppressed: widespread jamming produces correlated gaps that are
//! noise, not signal.

use chrono::{DateTime, Duration, Utc};
use statrs::statistics::{Data, OrderStatistics};
use std::collections::BTreeMap;
use tracing::info;

use super::StepCounts;
use crate::classify::is_tanker_type;
use crate::config::defaults::{
    DARK_STS_MAX_CANDIDATES_PER_CORRIDOR, DARK_STS_MIN_OVERLAP_HOURS,
};
use crate::config::Settings;
use crate::geo::haversine_nm;
use crate::scoring::ScoringConfig;
use crate::store::Store;
use crate::types::{
    FlagRisk, GapRateBaseline, SatelliteTaskingCandidate, StsDetectionType, StsTransferEvent,
};

/// Confidence tiers by off-position proximity.
const TIER_HIGH_NM: f64 = 5.0;
const TIER_MEDIUM_NM: f64 = 15.0;
const TIER_LOW_NM: f64 = 50.0;

/// Trailing window for baseline computation (days).
const BASELINE_WINDOW_DAYS: i64 = 30;

/// Compute per-corridor gap-rate baselines (daily counts → P95).
///
/// Returns `{corridors_processed, baselines_created}`.
pub fn compute_gap_rate_baseline(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.dark_sts_enabled {
        counts.insert("corridors_processed".to_string(), 0);
        counts.insert("baselines_created".to_string(), 0);
        return counts;
    }

    let window_start = now - Duration::days(BASELINE_WINDOW_DAYS);

    // corridor → day index → gap count
    let mut daily: BTreeMap<i64, BTreeMap<i64, f64>> = BTreeMap::new();
    let mut totals: BTreeMap<i64, i64> = BTreeMap::new();
    for gap_id in store.gap_ids() {
        let Some(gap) = store.gap(gap_id) else { continue };
        let Some(corridor_id) = gap.corridor_id else { continue };
        if gap.gap_start < window_start {
            continue;
        }
        let day = gap.gap_start.timestamp() / 86_400;
        *daily.entry(corridor_id).or_default().entry(day).or_default() += 1.0;
        *totals.entry(corridor_id).or_default() += 1;
    }

    let mut created = 0_i64;
    let processed = daily.len() as i64;
    for (corridor_id, days) in daily {
        let mut samples: Vec<f64> = days.into_values().collect();
        if samples.is_empty() {
            continue;
        }
        // Pad with zero-gap days so sparse corridors don't inflate P95
        while (samples.len() as i64) < BASELINE_WINDOW_DAYS {
            samples.push(0.0);
        }
        let mut data = Data::new(samples);
        let p95 = data.percentile(95);
        store.set_gap_rate_baseline(GapRateBaseline {
            corridor_id,
            gap_count: totals.get(&corridor_id).copied().unwrap_or(0),
            p95_threshold: p95,
        });
        created += 1;
    }
    store.commit("gap_rate_baseline");

    info!(processed, created, "Gap-rate baseline computation complete");
    counts.insert("corridors_processed".to_string(), processed);
    counts.insert("baselines_created".to_string(), created);
    counts
}

/// True when a corridor's recent daily gap rate exceeds its P95 baseline.
pub fn is_above_p95(store: &Store, corridor_id: i64) -> bool {
    store.gap_rate_baseline(corridor_id).is_some_and(|b| {
        let daily_rate = b.gap_count as f64 / BASELINE_WINDOW_DAYS as f64;
        daily_rate > b.p95_threshold
    })
}

/// A vessel qualifies for the low-confidence tier only when it carries a
/// standing risk factor.
fn has_risk_factor(store: &Store, vessel_id: i64) -> bool {
    store.vessel(vessel_id).is_some_and(|v| {
        v.flag_risk == FlagRisk::High
            || v.year_built.is_some_and(|y| y <= 1995)
            || v.psc_detained_last_12m
    })
}

/// Run Phase C over gap events with both off/on positions present.
///
/// Returns `{dark_sts_events, satellite_candidates, suppressed_p95}`.
pub fn detect_dark_dark_sts(
    store: &mut Store,
    settings: &Settings,
    scoring: &ScoringConfig,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.dark_sts_enabled {
        counts.insert("dark_sts_events".to_string(), 0);
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    // Candidate gap snapshot: (gap_id, vessel, corridor, start, end, off_lat, off_lon)
    struct DarkGap {
        vessel_id: i64,
        corridor_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        off_lat: f64,
        off_lon: f64,
    }

    let mut by_corridor: BTreeMap<i64, Vec<DarkGap>> = BTreeMap::new();
    for gap_id in store.gap_ids() {
        let Some(gap) = store.gap(gap_id) else { continue };
        let Some(corridor_id) = gap.corridor_id else { continue };
        if !store.vessel(gap.vessel_id).is_some_and(is_tanker_type) {
            continue;
        }
        // Off/on positions: the AIS points bracketing the silence
        let Some(off_point) = gap.start_point_id.and_then(|id| store.ais_point(id)) else {
            continue;
        };
        if gap.end_point_id.and_then(|id| store.ais_point(id)).is_none() {
            continue;
        }
        by_corridor.entry(corridor_id).or_default().push(DarkGap {
            vessel_id: gap.vessel_id,
            corridor_id,
            start: gap.gap_start,
            end: gap.gap_end,
            off_lat: off_point.lat,
            off_lon: off_point.lon,
        });
    }

    let min_overlap = Duration::seconds((DARK_STS_MIN_OVERLAP_HOURS * 3600.0) as i64);
    let mut events = 0_i64;
    let mut tasking = 0_i64;
    let mut suppressed = 0_i64;

    for (corridor_id, gaps) in &by_corridor {
        if is_above_p95(store, *corridor_id) {
            // Jamming noise, not STS signal
            suppressed += gaps.len() as i64;
            continue;
        }

        let mut corridor_candidates = 0_usize;
        'pairs: for i in 0..gaps.len() {
            for j in (i + 1)..gaps.len() {
                if corridor_candidates >= DARK_STS_MAX_CANDIDATES_PER_CORRIDOR {
                    break 'pairs;
                }
                let (a, b) = (&gaps[i], &gaps[j]);
                if a.vessel_id == b.vessel_id {
                    continue;
                }

                // Temporal overlap of the two silences
                let overlap_start = a.start.max(b.start);
                let overlap_end = a.end.min(b.end);
                if overlap_end - overlap_start < min_overlap {
                    continue;
                }

                let dist_nm = haversine_nm(a.off_lat, a.off_lon, b.off_lat, b.off_lon);
                if dist_nm > TIER_LOW_NM {
                    continue;
                }

                let (level, score) = if dist_nm <= TIER_HIGH_NM {
                    ("high", scoring.get("sts", "dark_dark_high_confidence_5nm", 30.0) as i32)
                } else if dist_nm <= TIER_MEDIUM_NM {
                    ("medium", scoring.get("sts", "dark_dark_medium_confidence_15nm", 20.0) as i32)
                } else {
                    // Low tier needs a standing risk factor on both hulls
                    if !has_risk_factor(store, a.vessel_id) || !has_risk_factor(store, b.vessel_id)
                    {
                        continue;
                    }
                    ("low", scoring.get("sts", "dark_dark_low_confidence_50nm", 10.0) as i32)
                };

                let vid1 = a.vessel_id.min(b.vessel_id);
                let vid2 = a.vessel_id.max(b.vessel_id);
                if store.sts_overlap_exists(vid1, vid2, overlap_start, overlap_end) {
                    continue;
                }

                corridor_candidates += 1;
                let mean_lat = (a.off_lat + b.off_lat) / 2.0;
                let mean_lon = (a.off_lon + b.off_lon) / 2.0;
                store.add_sts(StsTransferEvent {
                    sts_id: 0,
                    vessel_1_id: vid1,
                    vessel_2_id: vid2,
                    detection_type: StsDetectionType::DarkDark,
                    start_time: overlap_start,
                    end_time: overlap_end,
                    duration_minutes: (overlap_end - overlap_start).num_minutes(),
                    mean_proximity_meters: None,
                    mean_lat: Some(mean_lat),
                    mean_lon: Some(mean_lon),
                    corridor_id: Some(a.corridor_id),
                    eta_minutes: None,
                    risk_score_component: score,
                    source: "dark_dark".to_string(),
                });
                store.add_satellite_candidate(SatelliteTaskingCandidate {
                    candidate_id: 0,
                    vessel_1_id: vid1,
                    vessel_2_id: vid2,
                    window_start: overlap_start,
                    window_end: overlap_end,
                    mean_lat,
                    mean_lon,
                    confidence_level: level.to_string(),
                    corridor_id: Some(a.corridor_id),
                });
                events += 1;
                tasking += 1;
            }
        }
    }
    store.commit("dark_sts");

    info!(events, tasking, suppressed, "Dark-dark STS detection complete");
    counts.insert("dark_sts_events".to_string(), events);
    counts.insert("satellite_candidates".to_string(), tasking);
    counts.insert("suppressed_p95".to_string(), suppressed);
    counts
}
