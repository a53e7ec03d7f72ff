//! Behavioral fingerprinting.
//!
//! A vessel's operating style — cruising speed distribution, heading
//! stability, acceleration habits, draught range — survives an identity
//! swap even when every registry attribute changes. Fingerprints are
//! per-window feature vectors aggregated to a mean and covariance;
//! Mahalanobis distance between two fingerprints drives merge-bonus
//! scoring.
//!
//! Extraction requires ≥ 300 non-anchored points spanning ≥ 24 h,
//! segmented into 6 h windows. With ≥ 10 windows a full covariance
//! matrix is estimated (with diagonal loading for invertibility);
//! below that, diagonal-only.

use nalgebra::{DMatrix, DVector};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use tracing::info;

use crate::classify::is_tanker_type;
use crate::config::defaults::{
    FINGERPRINT_DIAGONAL_LOADING, FINGERPRINT_FULL_COV_MIN_WINDOWS, FINGERPRINT_MIN_POINTS,
    FINGERPRINT_MIN_SPAN_HOURS, FINGERPRINT_WINDOW_HOURS,
};
use crate::config::Settings;
use crate::detectors::StepCounts;
use crate::store::Store;

/// Feature vector dimensionality.
pub const FEATURE_DIMS: usize = 6;

/// Aggregated behavior fingerprint for one vessel.
#[derive(Debug, Clone)]
pub struct BehaviorFingerprint {
    pub vessel_id: i64,
    pub window_count: usize,
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub diagonal_only: bool,
}

/// Per-window feature extraction:
/// [sog median, sog IQR, heading circular variance, accel mean,
///  accel std, draught range]
fn window_features(
    timestamps: &[i64],
    sogs: &[f64],
    headings: &[f64],
    draughts: &[f64],
) -> Option<DVector<f64>> {
    if sogs.len() < 4 {
        return None;
    }

    let mut sog_data = Data::new(sogs.to_vec());
    let sog_median = sog_data.median();
    let sog_iqr = sog_data.percentile(75) - sog_data.percentile(25);

    // Circular variance of headings: 1 − |mean resultant vector|
    let heading_cv = if headings.is_empty() {
        0.0
    } else {
        let (sin_sum, cos_sum) = headings.iter().fold((0.0, 0.0), |(s, c), h| {
            let rad = h.to_radians();
            (s + rad.sin(), c + rad.cos())
        });
        let n = headings.len() as f64;
        1.0 - ((sin_sum / n).powi(2) + (cos_sum / n).powi(2)).sqrt()
    };

    // Accelerations between consecutive samples (kn per hour)
    let mut accels: Vec<f64> = Vec::with_capacity(sogs.len().saturating_sub(1));
    for i in 1..sogs.len() {
        let dt_h = (timestamps[i] - timestamps[i - 1]) as f64 / 3600.0;
        if dt_h > 0.0 {
            accels.push((sogs[i] - sogs[i - 1]) / dt_h);
        }
    }
    let (accel_mean, accel_std) = if accels.len() >= 2 {
        (accels.clone().mean(), accels.std_dev())
    } else {
        (0.0, 0.0)
    };

    let draught_range = if draughts.is_empty() {
        0.0
    } else {
        let max = draughts.iter().fold(f64::NEG_INFINITY, |a, b| a.max(*b));
        let min = draughts.iter().fold(f64::INFINITY, |a, b| a.min(*b));
        max - min
    };

    Some(DVector::from_vec(vec![
        sog_median,
        sog_iqr,
        heading_cv,
        accel_mean,
        accel_std,
        draught_range,
    ]))
}

/// Extract a fingerprint for a vessel, or None when the track is too
/// thin (insufficient points, span, or usable windows).
pub fn extract_fingerprint(store: &Store, vessel_id: i64) -> Option<BehaviorFingerprint> {
    struct Sample {
        ts: i64,
        sog: f64,
        heading: Option<f64>,
        draught: Option<f64>,
    }
    let samples: Vec<Sample> = store
        .points_for_vessel(vessel_id)
        .iter()
        .filter_map(|p| {
            let sog = p.sog?;
            // Anchored samples carry no behavioral signature
            (sog > 0.5).then(|| Sample {
                ts: p.timestamp.timestamp(),
                sog,
                heading: p.course_or_heading(),
                draught: p.draught,
            })
        })
        .collect();

    if samples.len() < FINGERPRINT_MIN_POINTS {
        return None;
    }
    let span_h = (samples[samples.len() - 1].ts - samples[0].ts) as f64 / 3600.0;
    if span_h < FINGERPRINT_MIN_SPAN_HOURS {
        return None;
    }

    // Segment into fixed 6 h windows from the first sample
    let window_s = (FINGERPRINT_WINDOW_HOURS * 3600.0) as i64;
    let origin = samples[0].ts;
    let mut windows: Vec<DVector<f64>> = Vec::new();
    let mut idx = 0;
    while idx < samples.len() {
        let window_index = (samples[idx].ts - origin) / window_s;
        let window_end = origin + (window_index + 1) * window_s;
        let mut timestamps = Vec::new();
        let mut sogs = Vec::new();
        let mut headings = Vec::new();
        let mut draughts = Vec::new();
        while idx < samples.len() && samples[idx].ts < window_end {
            let s = &samples[idx];
            timestamps.push(s.ts);
            sogs.push(s.sog);
            if let Some(h) = s.heading {
                headings.push(h);
            }
            if let Some(d) = s.draught {
                draughts.push(d);
            }
            idx += 1;
        }
        if let Some(features) = window_features(&timestamps, &sogs, &headings, &draughts) {
            windows.push(features);
        }
    }

    if windows.is_empty() {
        return None;
    }

    let n = windows.len();
    let mut mean = DVector::zeros(FEATURE_DIMS);
    for w in &windows {
        mean += w;
    }
    mean /= n as f64;

    let diagonal_only = n < FINGERPRINT_FULL_COV_MIN_WINDOWS;
    let mut covariance = DMatrix::zeros(FEATURE_DIMS, FEATURE_DIMS);
    if n >= 2 {
        for w in &windows {
            let delta = w - &mean;
            covariance += &delta * delta.transpose();
        }
        covariance /= (n - 1) as f64;
    }
    if diagonal_only {
        // Keep only the variances; cross-terms are noise at low n
        let diag = covariance.diagonal();
        covariance = DMatrix::from_diagonal(&diag);
    }
    // Diagonal loading keeps the pooled matrix invertible
    for i in 0..FEATURE_DIMS {
        covariance[(i, i)] += FINGERPRINT_DIAGONAL_LOADING;
    }

    Some(BehaviorFingerprint {
        vessel_id,
        window_count: n,
        mean,
        covariance,
        diagonal_only,
    })
}

/// Mahalanobis distance between two fingerprints over the pooled
/// covariance. None when the pooled matrix is singular.
pub fn mahalanobis_distance(a: &BehaviorFingerprint, b: &BehaviorFingerprint) -> Option<f64> {
    let pooled = (&a.covariance + &b.covariance) * 0.5;
    let inverse = pooled.try_inverse()?;
    let delta = &a.mean - &b.mean;
    let squared = (delta.transpose() * inverse * &delta)[(0, 0)];
    (squared >= 0.0).then(|| squared.sqrt())
}

/// Eliminative pre-filter: fingerprint comparison only makes sense for
/// hulls that could plausibly be the same ship.
fn passes_eliminative_filter(store: &Store, a: i64, b: i64) -> bool {
    let (Some(va), Some(vb)) = (store.vessel(a), store.vessel(b)) else {
        return false;
    };
    if is_tanker_type(va) != is_tanker_type(vb) {
        return false;
    }
    if let (Some(da), Some(db)) = (va.deadweight, vb.deadweight) {
        if da > 0.0 && db > 0.0 && da.min(db) / da.max(db) < 0.8 {
            return false;
        }
    }
    if va.ais_class != crate::types::AisClass::Unknown
        && vb.ais_class != crate::types::AisClass::Unknown
        && va.ais_class != vb.ais_class
    {
        return false;
    }
    true
}

/// Merge-candidate bonus from fingerprint similarity:
/// close → +15, similar → +10, divergent → −5, otherwise 0.
pub fn fingerprint_merge_bonus(store: &Store, settings: &Settings, a: i64, b: i64) -> i32 {
    if !settings.features.fingerprinting_enabled {
        return 0;
    }
    if !passes_eliminative_filter(store, a, b) {
        return 0;
    }
    let (Some(fp_a), Some(fp_b)) = (extract_fingerprint(store, a), extract_fingerprint(store, b))
    else {
        return 0;
    };
    let Some(distance) = mahalanobis_distance(&fp_a, &fp_b) else {
        return 0;
    };

    let bands = &settings.fingerprint;
    if distance <= bands.close_threshold {
        15
    } else if distance <= bands.similar_threshold {
        10
    } else if distance > bands.divergent_threshold {
        -5
    } else {
        0
    }
}

/// Rank candidate vessels by fingerprint distance to the target,
/// nearest first. Candidates failing the eliminative filter are
/// excluded; the scan stops after `fingerprint.candidate_cap` vessels
/// (extraction dominates the cost of a ranking query).
pub fn rank_similar_vessels(
    store: &Store,
    settings: &Settings,
    vessel_id: i64,
) -> Vec<(i64, f64)> {
    let Some(target) = extract_fingerprint(store, vessel_id) else {
        return Vec::new();
    };
    let mut ranked: Vec<(i64, f64)> = Vec::new();
    for candidate_id in store
        .canonical_vessel_ids()
        .into_iter()
        .filter(|id| *id != vessel_id)
        .take(settings.fingerprint.candidate_cap)
    {
        if !passes_eliminative_filter(store, vessel_id, candidate_id) {
            continue;
        }
        let Some(candidate) = extract_fingerprint(store, candidate_id) else {
            continue;
        };
        if let Some(distance) = mahalanobis_distance(&target, &candidate) {
            ranked.push((candidate_id, distance));
        }
    }
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}

/// Pipeline step: count vessels with extractable fingerprints.
pub fn run_fingerprint_extraction(store: &mut Store, settings: &Settings) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.fingerprinting_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }
    let mut extracted = 0_i64;
    for vessel_id in store.canonical_vessel_ids() {
        if extract_fingerprint(store, vessel_id).is_some() {
            extracted += 1;
        }
    }
    info!(extracted, "Fingerprint extraction complete");
    counts.insert("fingerprints_extracted".to_string(), extracted);
    counts
}
