//! Weather correlation.
//!
//! High wind at the pre-gap position can explain a speed anomaly
//! (drifting off station, storm avoidance). The enrichment step stores
//! the observed wind per gap; the scoring engine applies the deduction
//! only when a speed-anomaly signal actually fired — the gate is a
//! precondition in the signal catalogue, not post-hoc filtering.
//!
//! The weather source itself is an external collaborator; this module
//! defines the provider seam and the enrichment pass.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::Settings;
use crate::detectors::StepCounts;
use crate::store::Store;

/// Weather lookup seam. Implementations wrap whatever forecast/reanalysis
/// source the deployment has; `NoWeather` disables the enrichment.
pub trait WeatherProvider {
    /// Wind speed in knots at a position and time, if known.
    fn wind_kn_at(&self, lat: f64, lon: f64, ts: DateTime<Utc>) -> Option<f64>;
}

/// Null provider: no observations, no deductions.
pub struct NoWeather;

impl WeatherProvider for NoWeather {
    fn wind_kn_at(&self, _lat: f64, _lon: f64, _ts: DateTime<Utc>) -> Option<f64> {
        None
    }
}

/// Fixed-table provider for tests and replays.
pub struct StaticWeather {
    pub wind_kn: f64,
}

impl WeatherProvider for StaticWeather {
    fn wind_kn_at(&self, _lat: f64, _lon: f64, _ts: DateTime<Utc>) -> Option<f64> {
        Some(self.wind_kn)
    }
}

/// Annotate gaps whose pre-gap point shows elevated speed with the wind
/// observed at that position. Only fast movers matter — the deduction
/// exists to excuse weather-driven speed anomalies.
///
/// Returns `{gaps_annotated}`.
pub fn run_weather_enrichment(
    store: &mut Store,
    settings: &Settings,
    provider: &dyn WeatherProvider,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.weather_correlation_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let mut annotated = 0_i64;
    let gap_ids = store.gap_ids();
    for gap_id in gap_ids {
        let observation = {
            let Some(gap) = store.gap(gap_id) else { continue };
            if gap.pre_gap_sog.map_or(true, |sog| sog <= 15.0) {
                continue;
            }
            gap.start_point_id
                .and_then(|id| store.ais_point(id))
                .and_then(|p| provider.wind_kn_at(p.lat, p.lon, p.timestamp))
        };
        if let Some(wind_kn) = observation {
            store.set_gap_weather(gap_id, wind_kn);
            annotated += 1;
        }
    }
    store.commit("weather_enrichment");

    info!(annotated, "Weather enrichment complete");
    counts.insert("gaps_annotated".to_string(), annotated);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AisClass, GapEvent, GapStatus};
    use chrono::{Duration, TimeZone};

    fn ts(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::hours(h)
    }

    fn gap_with_pre_sog(store: &mut Store, vessel: i64, pre_sog: f64) -> i64 {
        let point = store.add_ais_point(vessel, ts(0), 55.0, 20.0, Some(pre_sog), None, None, None, None, AisClass::A);
        let id = store.alloc_gap_id();
        store.add_gap(GapEvent {
            gap_event_id: id,
            vessel_id: vessel,
            original_vessel_id: Some(vessel),
            gap_start: ts(0),
            gap_end: ts(5),
            duration_minutes: 300,
            start_point_id: Some(point),
            end_point_id: None,
            corridor_id: None,
            dark_zone_id: None,
            in_dark_zone: false,
            impossible_speed_flag: false,
            velocity_plausibility_ratio: 0.4,
            max_plausible_distance_nm: 100.0,
            actual_gap_distance_nm: 40.0,
            pre_gap_sog: Some(pre_sog),
            risk_score: 0,
            risk_breakdown: None,
            status: GapStatus::New,
        });
        id
    }

    #[test]
    fn only_fast_movers_are_annotated() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        let fast = gap_with_pre_sog(&mut store, v, 22.0);
        let slow = gap_with_pre_sog(&mut store, v, 8.0);

        let mut settings = Settings::default();
        settings.features.weather_correlation_enabled = true;
        let provider = StaticWeather { wind_kn: 45.0 };
        let counts = run_weather_enrichment(&mut store, &settings, &provider);

        assert_eq!(counts["gaps_annotated"], 1);
        assert_eq!(store.gap_weather(fast), Some(45.0));
        assert_eq!(store.gap_weather(slow), None);
    }

    #[test]
    fn disabled_feature_annotates_nothing() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        gap_with_pre_sog(&mut store, v, 22.0);
        let provider = StaticWeather { wind_kn: 45.0 };
        let counts = run_weather_enrichment(&mut store, &Settings::default(), &provider);
        assert_eq!(counts.get("status_disabled"), Some(&1));
    }
}
