//! Scoring configuration — a frozen, hash-audited point catalogue.
//!
//! The document is a TOML file of sections mapping signal keys to point
//! values (or nested per-class tables for speed thresholds). Every
//! lookup carries a documented default, so a missing key or an entirely
//! missing file degrades to the shipped behavior rather than failing.
//!
//! The SHA-256 hash of the canonical JSON serialization is recorded in
//! rescore reports for auditability.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use super::ScoringError;

/// One value inside a section: a point value or a nested per-class table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigEntry {
    Number(f64),
    Table(BTreeMap<String, f64>),
}

/// Sections expected in a complete scoring document. Missing sections
/// only warn — defaults cover them.
const EXPECTED_SECTIONS: &[&str] = &[
    "gap_duration",
    "gap_frequency",
    "speed_anomaly",
    "movement_envelope",
    "spoofing",
    "metadata",
    "vessel_age",
    "flag_state",
    "vessel_size_multiplier",
    "watchlist",
    "dark_zone",
    "sts",
    "behavioral",
    "legitimacy",
    "corridor",
    "score_bands",
    "ais_class",
    "dark_vessel",
    "pi_insurance",
    "psc_detention",
    "identity_merge",
    "fleet",
];

/// The frozen scoring configuration.
///
/// `Default` is the empty document: every signal falls back to its
/// documented default value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(flatten)]
    sections: BTreeMap<String, BTreeMap<String, ConfigEntry>>,
}

impl ScoringConfig {
    /// Load from a TOML file, validating value ranges with warnings.
    pub fn load_from_file(path: &Path) -> Result<Self, ScoringError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ScoringError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ScoringError::Parse(path.to_path_buf(), e))?;
        config.validate();
        Ok(config)
    }

    /// Load from the configured path, or fall back to the empty
    /// (all-defaults) document with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "Scoring config not found — using built-in defaults");
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to load scoring config — using built-in defaults");
                Self::default()
            }
        }
    }

    /// Parse from a TOML string (tests, embedded documents).
    pub fn from_toml(doc: &str) -> Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(doc)?;
        config.validate();
        Ok(config)
    }

    fn validate(&self) {
        for section in EXPECTED_SECTIONS {
            if !self.sections.contains_key(*section) {
                warn!(section, "Scoring config missing section — defaults apply");
            }
        }
        for (section, entries) in &self.sections {
            for (key, entry) in entries {
                let ConfigEntry::Number(value) = entry else { continue };
                let in_range = if section == "corridor" || section == "vessel_size_multiplier" {
                    (0.0..=10.0).contains(value)
                } else {
                    (-50.0..=200.0).contains(value)
                };
                if !in_range {
                    warn!(section, key, value, "Scoring config value outside expected range");
                }
            }
        }
    }

    /// Point value for `section.key`, falling back to `default`.
    pub fn get(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.sections.get(section).and_then(|s| s.get(key)) {
            Some(ConfigEntry::Number(v)) => *v,
            _ => default,
        }
    }

    /// Integer convenience wrapper around `get`.
    pub fn get_i32(&self, section: &str, key: &str, default: i32) -> i32 {
        self.get(section, key, f64::from(default)).round() as i32
    }

    /// Nested lookup for per-class tables, e.g.
    /// `speed_anomaly.vlcc_200k_plus_dwt.spike_threshold_kn`.
    pub fn get_nested(&self, section: &str, table: &str, key: &str, default: f64) -> f64 {
        match self.sections.get(section).and_then(|s| s.get(table)) {
            Some(ConfigEntry::Table(t)) => t.get(key).copied().unwrap_or(default),
            _ => default,
        }
    }

    /// SHA-256 hex digest of the canonical JSON serialization,
    /// truncated to 8 characters for report display.
    pub fn hash(&self) -> String {
        let canonical = serde_json::to_string(&self.sections).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..8].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_serves_defaults() {
        let config = ScoringConfig::default();
        assert_eq!(config.get("gap_duration", "24h_plus", 55.0), 55.0);
        assert_eq!(config.get_i32("sts", "gap_in_sts_tagged_corridor", 30), 30);
    }

    #[test]
    fn toml_overrides_win() {
        let config = ScoringConfig::from_toml(
            r#"
            [gap_duration]
            "24h_plus" = 60.0
            "2h_to_4h" = 5.0

            [speed_anomaly.vlcc_200k_plus_dwt]
            spike_threshold_kn = 17.0
            spoof_threshold_kn = 21.0

            [corridor]
            known_sts_zone = 2.0
            "#,
        )
        .expect("valid TOML");
        assert_eq!(config.get("gap_duration", "24h_plus", 55.0), 60.0);
        assert_eq!(
            config.get_nested("speed_anomaly", "vlcc_200k_plus_dwt", "spike_threshold_kn", 18.0),
            17.0
        );
        assert_eq!(config.get("corridor", "known_sts_zone", 1.5), 2.0);
        // Untouched keys keep their defaults
        assert_eq!(config.get("gap_duration", "12h_to_24h", 40.0), 40.0);
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = ScoringConfig::from_toml("[gap_duration]\n\"24h_plus\" = 55.0\n").expect("valid");
        let b = ScoringConfig::from_toml("[gap_duration]\n\"24h_plus\" = 55.0\n").expect("valid");
        let c = ScoringConfig::from_toml("[gap_duration]\n\"24h_plus\" = 60.0\n").expect("valid");
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert_eq!(a.hash().len(), 8);
    }
}
