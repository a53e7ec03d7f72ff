//! Runtime settings — detector thresholds and feature flags as TOML values.
//!
//! Every struct implements `Default` with values matching the deployed
//! defaults, ensuring zero-change behavior when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Configuration load/validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Root runtime configuration.
///
/// Load with `Settings::load()` which searches:
/// 1. `$DARKFLEET_CONFIG` env var
/// 2. `./darkfleet.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Gap / spoofing detection thresholds
    #[serde(default)]
    pub detection: DetectionConfig,

    /// STS proximity analysis thresholds
    #[serde(default)]
    pub sts: StsConfig,

    /// Identity merge thresholds
    #[serde(default)]
    pub merge: MergeConfig,

    /// Ingestion limits and matching thresholds
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Behavioral fingerprint similarity bands
    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    /// Per-module feature flags
    #[serde(default)]
    pub features: FeatureFlags,

    /// Storage paths (audit log, run history)
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            sts: StsConfig::default(),
            merge: MergeConfig::default(),
            ingest: IngestConfig::default(),
            fingerprint: FingerprintConfig::default(),
            features: FeatureFlags::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Mahalanobis-distance bands for behavioral fingerprint comparison.
///
/// The close/similar thresholds were fit empirically (distribution Q1
/// and median over matched-pair distances) and are deployment-tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Distance at or below which two fingerprints are "close" (+15).
    pub close_threshold: f64,
    /// Distance at or below which two fingerprints are "similar" (+10).
    pub similar_threshold: f64,
    /// Distance above which fingerprints actively diverge (−5).
    pub divergent_threshold: f64,
    /// Candidates examined per similarity-ranking query.
    pub candidate_cap: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            close_threshold: 2.60,
            similar_threshold: 3.06,
            divergent_threshold: 6.0,
            candidate_cap: super::defaults::FINGERPRINT_CANDIDATE_CAP,
        }
    }
}

/// Gap and spoofing detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum AIS silence that constitutes a gap (hours, inclusive boundary).
    pub gap_min_hours: f64,
    /// Intervals shorter than this are Class-B reporting noise (seconds).
    pub class_b_noise_filter_seconds: f64,
    /// Implied speed above which consecutive points indicate MMSI reuse
    /// or a second transmitter (knots).
    pub mmsi_reuse_speed_kn: f64,
    /// Port proximity radius used by the spoofing typologies (NM).
    pub port_proximity_nm: f64,
    /// Minimum offshore anchor run before anchor-spoof fires (hours).
    pub anchor_spoof_min_hours: f64,
    /// Minimum slow-roll run for tankers (hours).
    pub slow_roll_min_hours: f64,
    /// Loitering run minimum duration (hours).
    pub loiter_min_hours: f64,
    /// Loitering speed ceiling (knots).
    pub loiter_max_sog: f64,
    /// Laid-up classification window thresholds (days).
    pub laid_up_30d_days: i64,
    pub laid_up_60d_days: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            gap_min_hours: super::defaults::GAP_MIN_HOURS,
            class_b_noise_filter_seconds: super::defaults::CLASS_B_NOISE_FILTER_SECONDS,
            mmsi_reuse_speed_kn: super::defaults::MMSI_REUSE_SPEED_KN,
            port_proximity_nm: super::defaults::PORT_PROXIMITY_NM,
            anchor_spoof_min_hours: super::defaults::ANCHOR_SPOOF_MIN_HOURS,
            slow_roll_min_hours: super::defaults::SLOW_ROLL_MIN_HOURS,
            loiter_min_hours: 4.0,
            loiter_max_sog: 0.5,
            laid_up_30d_days: 30,
            laid_up_60d_days: 60,
        }
    }
}

/// STS detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StsConfig {
    /// Pair proximity ceiling for Phase A (meters).
    pub proximity_meters: f64,
    /// Consecutive 15-minute windows required for a confirmed event.
    pub min_windows: usize,
}

impl Default for StsConfig {
    fn default() -> Self {
        Self {
            proximity_meters: 200.0,
            min_windows: 8,
        }
    }
}

/// Identity merge thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// How far back a newly-appeared MMSI can pair with a dark vessel (days).
    pub max_gap_days: i64,
    /// Speed used for the travel-feasibility cone (knots).
    pub max_speed_kn: f64,
    /// Confidence at or above which merges execute automatically.
    pub auto_confidence_threshold: i32,
    /// Confidence below which candidates are discarded instead of persisted.
    pub candidate_min_confidence: i32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_gap_days: 30,
            max_speed_kn: 16.0,
            auto_confidence_threshold: 75,
            candidate_min_confidence: 50,
        }
    }
}

/// Ingestion limits and watchlist matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Fuzzy name-match acceptance threshold with a flag pre-filter (0-100).
    pub fuzzy_match_threshold: u32,
    /// Maximum accepted upload size (MB) — enforced by the ingest boundary.
    pub max_upload_mb: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fuzzy_match_threshold: 85,
            max_upload_mb: 100,
        }
    }
}

/// Per-module feature flags.
///
/// Each flag also accepts a `DARKFLEET_<NAME>` boolean environment
/// override (e.g. `DARKFLEET_DARK_STS_ENABLED=true`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub stale_ais_detection_enabled: bool,
    pub dark_sts_enabled: bool,
    pub track_integrity_enabled: bool,
    pub route_laundering_enabled: bool,
    pub pi_cycling_enabled: bool,
    pub sparse_transmission_enabled: bool,
    pub type_consistency_enabled: bool,
    pub merge_chains_enabled: bool,
    pub fingerprinting_enabled: bool,
    pub sts_relay_chains_enabled: bool,
    pub convoy_detection_enabled: bool,
    pub voyage_prediction_enabled: bool,
    pub cargo_inference_enabled: bool,
    pub weather_correlation_enabled: bool,
    pub ism_continuity_scoring_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            stale_ais_detection_enabled: false,
            dark_sts_enabled: false,
            track_integrity_enabled: false,
            route_laundering_enabled: false,
            pi_cycling_enabled: false,
            sparse_transmission_enabled: false,
            type_consistency_enabled: false,
            merge_chains_enabled: false,
            fingerprinting_enabled: false,
            sts_relay_chains_enabled: false,
            convoy_detection_enabled: false,
            voyage_prediction_enabled: false,
            cargo_inference_enabled: false,
            weather_correlation_enabled: false,
            ism_continuity_scoring_enabled: false,
        }
    }
}

/// Storage paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Sled database directory for the audit log and run history.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/darkfleet"),
        }
    }
}

impl Settings {
    /// Load configuration using the standard search order:
    /// 1. `$DARKFLEET_CONFIG` environment variable
    /// 2. `./darkfleet.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Feature-flag env overrides are applied last in every case.
    pub fn load() -> Self {
        let mut settings = Self::load_file_or_default();
        settings.features.apply_env_overrides();
        settings
    }

    fn load_file_or_default() -> Self {
        if let Ok(path) = std::env::var("DARKFLEET_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(settings) => {
                        info!(path = %p.display(), "Loaded settings from DARKFLEET_CONFIG");
                        return settings;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load DARKFLEET_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "DARKFLEET_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("darkfleet.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(settings) => {
                    info!("Loaded settings from ./darkfleet.toml");
                    return settings;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./darkfleet.toml, using defaults");
                }
            }
        }

        info!("No darkfleet.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let settings: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations that would silently disable core detection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detection.gap_min_hours <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "detection.gap_min_hours must be positive, got {}",
                self.detection.gap_min_hours
            )));
        }
        if self.detection.mmsi_reuse_speed_kn <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "detection.mmsi_reuse_speed_kn must be positive, got {}",
                self.detection.mmsi_reuse_speed_kn
            )));
        }
        if self.sts.min_windows == 0 {
            return Err(ConfigError::Invalid(
                "sts.min_windows must be at least 1".to_string(),
            ));
        }
        if self.merge.candidate_min_confidence > self.merge.auto_confidence_threshold {
            return Err(ConfigError::Invalid(format!(
                "merge.candidate_min_confidence ({}) exceeds auto_confidence_threshold ({})",
                self.merge.candidate_min_confidence, self.merge.auto_confidence_threshold
            )));
        }
        if self.merge.max_speed_kn <= 0.0 {
            return Err(ConfigError::Invalid(
                "merge.max_speed_kn must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl FeatureFlags {
    /// Apply `DARKFLEET_*` boolean environment overrides.
    fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut bool); 15] = [
            ("DARKFLEET_STALE_AIS_ENABLED", &mut self.stale_ais_detection_enabled),
            ("DARKFLEET_DARK_STS_ENABLED", &mut self.dark_sts_enabled),
            ("DARKFLEET_TRACK_INTEGRITY_ENABLED", &mut self.track_integrity_enabled),
            ("DARKFLEET_ROUTE_LAUNDERING_ENABLED", &mut self.route_laundering_enabled),
            ("DARKFLEET_PI_CYCLING_ENABLED", &mut self.pi_cycling_enabled),
            ("DARKFLEET_SPARSE_TRANSMISSION_ENABLED", &mut self.sparse_transmission_enabled),
            ("DARKFLEET_TYPE_CONSISTENCY_ENABLED", &mut self.type_consistency_enabled),
            ("DARKFLEET_MERGE_CHAINS_ENABLED", &mut self.merge_chains_enabled),
            ("DARKFLEET_FINGERPRINTING_ENABLED", &mut self.fingerprinting_enabled),
            ("DARKFLEET_STS_RELAY_CHAINS_ENABLED", &mut self.sts_relay_chains_enabled),
            ("DARKFLEET_CONVOY_ENABLED", &mut self.convoy_detection_enabled),
            ("DARKFLEET_VOYAGE_PREDICTION_ENABLED", &mut self.voyage_prediction_enabled),
            ("DARKFLEET_CARGO_INFERENCE_ENABLED", &mut self.cargo_inference_enabled),
            ("DARKFLEET_WEATHER_ENABLED", &mut self.weather_correlation_enabled),
            ("DARKFLEET_ISM_CONTINUITY_ENABLED", &mut self.ism_continuity_scoring_enabled),
        ];
        for (key, slot) in overrides {
            if let Ok(raw) = std::env::var(key) {
                match raw.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => *slot = true,
                    "0" | "false" | "no" | "off" => *slot = false,
                    other => warn!(key, value = other, "Unparseable boolean env override — ignoring"),
                }
            }
        }
    }

    /// Enable every detection module. Used by exhaustive test runs.
    pub fn all_enabled() -> Self {
        Self {
            stale_ais_detection_enabled: true,
            dark_sts_enabled: true,
            track_integrity_enabled: true,
            route_laundering_enabled: true,
            pi_cycling_enabled: true,
            sparse_transmission_enabled: true,
            type_consistency_enabled: true,
            merge_chains_enabled: true,
            fingerprinting_enabled: true,
            sts_relay_chains_enabled: true,
            convoy_detection_enabled: true,
            voyage_prediction_enabled: true,
            cargo_inference_enabled: true,
            weather_correlation_enabled: true,
            ism_continuity_scoring_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        Settings::default().validate().expect("defaults must be valid");
    }

    #[test]
    fn rejects_inverted_merge_thresholds() {
        let mut s = Settings::default();
        s.merge.candidate_min_confidence = 90;
        s.merge.auto_confidence_threshold = 75;
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_zero_gap_threshold() {
        let mut s = Settings::default();
        s.detection.gap_min_hours = 0.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let doc = r#"
            [merge]
            max_gap_days = 14
            max_speed_kn = 16.0
            auto_confidence_threshold = 80
            candidate_min_confidence = 55

            [features]
            dark_sts_enabled = true
            stale_ais_detection_enabled = false
            track_integrity_enabled = false
            route_laundering_enabled = false
            pi_cycling_enabled = false
            sparse_transmission_enabled = false
            type_consistency_enabled = false
            merge_chains_enabled = false
            fingerprinting_enabled = false
            sts_relay_chains_enabled = false
            convoy_detection_enabled = false
            voyage_prediction_enabled = false
            cargo_inference_enabled = false
            weather_correlation_enabled = false
            ism_continuity_scoring_enabled = false
        "#;
        let settings: Settings = toml::from_str(doc).expect("partial TOML must parse");
        assert_eq!(settings.merge.max_gap_days, 14);
        assert!(settings.features.dark_sts_enabled);
        // Untouched sections fall back to defaults
        assert_eq!(settings.sts.min_windows, 8);
    }
}
