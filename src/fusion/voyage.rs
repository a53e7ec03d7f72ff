//! Voyage prediction and cargo inference.
//!
//! Route templates are recurring port sequences (≥ 3 ports) mined from
//! port-call history and deduplicated by Jaccard similarity. A vessel
//! whose recent ports match a template but whose track now bends toward
//! an STS zone instead of the template's next port earns a deviation
//! alert. Cargo inference reads draught against the class maximum:
//! laden tankers coming off Russian terminals into STS activity are the
//! primary laundering pattern.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::info;

use crate::config::defaults::{CARGO_LADEN_RATIO, ROUTE_TEMPLATE_JACCARD_THRESHOLD};
use crate::config::Settings;
use crate::detectors::StepCounts;
use crate::store::Store;
use crate::types::{FleetAlert, RouteTemplate};

/// Jaccard similarity over port-ID sets.
fn jaccard(a: &[i64], b: &[i64]) -> f64 {
    let sa: BTreeSet<i64> = a.iter().copied().collect();
    let sb: BTreeSet<i64> = b.iter().copied().collect();
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Mine route templates from port-call sequences.
///
/// Returns `{templates_created, templates_reinforced}`.
pub fn build_route_templates(store: &mut Store, settings: &Settings) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.voyage_prediction_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let mut created = 0_i64;
    let mut reinforced = 0_i64;
    for vessel_id in store.vessel_ids() {
        let sequence: Vec<i64> = store
            .port_calls_for_vessel(vessel_id)
            .iter()
            .filter_map(|c| c.port_id)
            .collect();
        if sequence.len() < 3 {
            continue;
        }

        // Dedup against existing templates by Jaccard overlap
        let similar = store
            .route_templates()
            .iter()
            .find(|t| jaccard(&t.port_sequence, &sequence) >= ROUTE_TEMPLATE_JACCARD_THRESHOLD)
            .map(|t| t.template_id);
        match similar {
            Some(template_id) => {
                if let Some(template) = store.route_template_mut(template_id) {
                    template.observation_count += 1;
                    reinforced += 1;
                }
            }
            None => {
                store.add_route_template(RouteTemplate {
                    template_id: 0,
                    port_sequence: sequence,
                    observation_count: 1,
                });
                created += 1;
            }
        }
    }
    store.commit("route_templates");

    info!(created, reinforced, "Route template mining complete");
    counts.insert("templates_created".to_string(), created);
    counts.insert("templates_reinforced".to_string(), reinforced);
    counts
}

/// Predict the next port for a vessel by matching its recent port
/// sequence against template interiors.
pub fn predict_next_port(store: &Store, vessel_id: i64) -> Option<i64> {
    let recent: Vec<i64> = store
        .port_calls_for_vessel(vessel_id)
        .iter()
        .filter_map(|c| c.port_id)
        .collect();
    let last = *recent.last()?;

    // Best-observed template containing the last port with a successor
    let mut best: Option<(i32, i64)> = None;
    for template in store.route_templates() {
        for (idx, port) in template.port_sequence.iter().enumerate() {
            if *port == last && idx + 1 < template.port_sequence.len() {
                let next = template.port_sequence[idx + 1];
                if best.map_or(true, |(count, _)| template.observation_count > count) {
                    best = Some((template.observation_count, next));
                }
            }
        }
    }
    best.map(|(_, port)| port)
}

/// Flag vessels whose current track bends toward an STS zone while a
/// template predicts a port destination.
///
/// Returns `{route_deviation_alerts}`.
pub fn detect_route_deviations(
    store: &mut Store,
    settings: &Settings,
    corridors: &crate::corridor::CorridorIndex,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.voyage_prediction_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let mut created = 0_i64;
    for vessel_id in store.vessel_ids() {
        if predict_next_port(store, vessel_id).is_none() {
            continue;
        }
        // Deviation: the latest position sits inside an STS zone that
        // is not the predicted destination
        let Some(last_point) = store.last_point_for_vessel(vessel_id) else {
            continue;
        };
        let Some(sts_zone) = corridors.find_sts_zone_for_point(last_point.lat, last_point.lon)
        else {
            continue;
        };
        let key = vec![vessel_id];
        if store.fleet_alert_exists("route_deviation_sts", &key) {
            continue;
        }
        store.add_fleet_alert(FleetAlert {
            alert_id: 0,
            alert_type: "route_deviation_sts".to_string(),
            vessel_ids: key,
            evidence: json!({"sts_zone_corridor_id": sts_zone}),
            score: 25,
            created_at: now,
        });
        created += 1;
    }
    store.commit("route_deviation");
    counts.insert("route_deviation_alerts".to_string(), created);
    counts
}

/// Class-typical maximum draught (metres) by deadweight.
fn max_draught_for(dwt: Option<f64>) -> f64 {
    match dwt {
        Some(d) if d >= 200_000.0 => 22.0,
        Some(d) if d >= 120_000.0 => 17.0,
        Some(d) if d >= 80_000.0 => 15.0,
        Some(d) if d >= 60_000.0 => 13.5,
        _ => 12.0,
    }
}

/// Cargo inference: laden tankers (draught ratio ≥ 0.6) leaving Russian
/// terminals into STS activity.
///
/// Returns `{laden_vessels, laden_russian_sts_alerts}`.
pub fn infer_cargo_state(store: &mut Store, settings: &Settings, now: DateTime<Utc>) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.cargo_inference_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    let mut laden = 0_i64;
    let mut alerts = 0_i64;
    for vessel_id in store.vessel_ids() {
        let dwt = store.vessel(vessel_id).and_then(|v| v.deadweight);
        let Some(draught) = store
            .last_point_for_vessel(vessel_id)
            .and_then(|p| p.draught)
        else {
            continue;
        };
        let laden_ratio = draught / max_draught_for(dwt);
        if laden_ratio < CARGO_LADEN_RATIO {
            continue;
        }
        laden += 1;

        let russian_origin = crate::identity::had_russian_port_call(store, vessel_id, now, 30);
        let has_sts = !store.sts_for_vessel(vessel_id).is_empty();
        if russian_origin && has_sts {
            let key = vec![vessel_id];
            if store.fleet_alert_exists("laden_russian_sts", &key) {
                continue;
            }
            store.add_fleet_alert(FleetAlert {
                alert_id: 0,
                alert_type: "laden_russian_sts".to_string(),
                vessel_ids: key,
                evidence: json!({
                    "laden_ratio": (laden_ratio * 100.0).round() / 100.0,
                }),
                score: 15,
                created_at: now,
            });
            alerts += 1;
        }
    }
    store.commit("cargo_inference");

    counts.insert("laden_vessels".to_string(), laden);
    counts.insert("laden_russian_sts_alerts".to_string(), alerts);
    counts
}
