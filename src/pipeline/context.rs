//! Pipeline context and run reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::detectors::StepCounts;
use crate::fusion::weather::{NoWeather, WeatherProvider};
use crate::scoring::ScoringConfig;

/// Everything a pipeline run needs, passed explicitly — no globals.
pub struct PipelineContext<'a> {
    /// Runtime settings (thresholds + feature flags).
    pub settings: &'a Settings,
    /// Frozen scoring configuration.
    pub scoring: &'a ScoringConfig,
    /// Fixed reference time for the whole run: detection windows, merge
    /// cutoffs and scoring dates all derive from it, which is what
    /// makes a run reproducible.
    pub now: DateTime<Utc>,
    /// Weather lookup seam (defaults to the null provider).
    pub weather: &'a dyn WeatherProvider,
}

impl<'a> PipelineContext<'a> {
    pub fn new(settings: &'a Settings, scoring: &'a ScoringConfig, now: DateTime<Utc>) -> Self {
        static NO_WEATHER: NoWeather = NoWeather;
        Self {
            settings,
            scoring,
            now,
            weather: &NO_WEATHER,
        }
    }

    pub fn with_weather(mut self, weather: &'a dyn WeatherProvider) -> Self {
        self.weather = weather;
        self
    }
}

/// One executed step with its count map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub counts: StepCounts,
}

/// Accumulated report for a whole pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
    /// SHA-256 (truncated) of the scoring config used for this run.
    pub config_hash: String,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: None,
            steps: Vec::new(),
            config_hash: String::new(),
        }
    }

    pub(crate) fn record(&mut self, name: &str, counts: StepCounts) {
        self.steps.push(StepReport {
            name: name.to_string(),
            counts,
        });
    }

    /// Count value from a named step, if the step ran and emitted it.
    pub fn count(&self, step: &str, key: &str) -> Option<i64> {
        self.steps
            .iter()
            .find(|s| s.name == step)
            .and_then(|s| s.counts.get(key))
            .copied()
    }
}
