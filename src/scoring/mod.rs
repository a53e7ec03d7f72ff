//! Risk scoring engine.
//!
//! Applies configurable rules to produce an explainable score for each
//! AIS gap event. Three-phase composition:
//!
//!   Phase 1 — additive signals (flat points each; gap_duration gets
//!   ×1.4 when a speed spike preceded the silence)
//!   Phase 2 — corridor multiplier (risk signals × corridor factor)
//!   Phase 3 — vessel size multiplier
//!
//! Multipliers amplify ONLY positive (risk) signals. Legitimacy
//! deductions are added after amplification so they always deduct their
//! face value regardless of zone or size:
//!
//!   final = max(0, round(risk × corridor × size + legitimacy))
//!
//! No hard cap; 76+ is "critical" regardless of upper bound.

mod config;
mod engine;
mod signals;

pub use config::*;
pub use engine::*;
pub use signals::*;

use thiserror::Error;

/// Scoring-subsystem errors.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("failed to read scoring config {0}: {1}")]
    Io(std::path::PathBuf, #[source] std::io::Error),

    #[error("failed to parse scoring config {0}: {1}")]
    Parse(std::path::PathBuf, #[source] toml::de::Error),
}

/// Human-readable band label for a final score.
///
/// low 0-20, medium 21-50, high 51-75, critical 76+ (no upper bound).
pub fn score_band(score: i32) -> &'static str {
    match score {
        i32::MIN..=20 => "low",
        21..=50 => "medium",
        51..=75 => "high",
        _ => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::score_band;

    #[test]
    fn band_boundaries() {
        assert_eq!(score_band(0), "low");
        assert_eq!(score_band(20), "low");
        assert_eq!(score_band(21), "medium");
        assert_eq!(score_band(50), "medium");
        assert_eq!(score_band(51), "high");
        assert_eq!(score_band(75), "high");
        assert_eq!(score_band(76), "critical");
        assert_eq!(score_band(250), "critical");
    }
}
