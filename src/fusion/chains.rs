//! Identity-laundering chain detection.
//!
//! Merge chains: connected components over the merge-candidate graph
//! (edges with confidence ≥ 50). Components of three or more vessels
//! are multi-hop identity laundering candidates; chain confidence is
//! the weakest edge.
//!
//! STS relay chains: temporal-ordered simple paths through the STS
//! multigraph — cargo moving A→B→C across distinct transfers.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::info;

use crate::config::Settings;
use crate::detectors::StepCounts;
use crate::store::Store;
use crate::types::{FleetAlert, MergeCandidateStatus, MergeChain};

/// Minimum edge confidence admitted to the merge graph.
const CHAIN_MIN_EDGE_CONFIDENCE: i32 = 50;

/// Minimum component size worth surfacing.
const CHAIN_MIN_SIZE: usize = 3;

fn confidence_band(confidence: i32) -> &'static str {
    if confidence >= 75 {
        "HIGH"
    } else if confidence >= 50 {
        "MEDIUM"
    } else {
        "LOW"
    }
}

/// Extract connected components of the merge-candidate graph.
///
/// Returns `{chains_created}`.
pub fn detect_merge_chains(store: &mut Store, settings: &Settings) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.merge_chains_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    // Adjacency over qualifying edges, keyed by vessel ID
    let mut adjacency: BTreeMap<i64, Vec<(i64, i32)>> = BTreeMap::new();
    for candidate_id in store.merge_candidate_ids() {
        let Some(candidate) = store.merge_candidate(candidate_id) else { continue };
        if candidate.status == MergeCandidateStatus::Rejected {
            continue;
        }
        if candidate.confidence_score < CHAIN_MIN_EDGE_CONFIDENCE {
            continue;
        }
        let (a, b, conf) = (
            candidate.vessel_a_id,
            candidate.vessel_b_id,
            candidate.confidence_score,
        );
        adjacency.entry(a).or_default().push((b, conf));
        adjacency.entry(b).or_default().push((a, conf));
    }

    // BFS component extraction in ascending vessel-ID order
    let mut visited: BTreeSet<i64> = BTreeSet::new();
    let mut created = 0_i64;
    let roots: Vec<i64> = adjacency.keys().copied().collect();
    for root in roots {
        if visited.contains(&root) {
            continue;
        }
        let mut component: BTreeSet<i64> = BTreeSet::new();
        let mut min_confidence = i32::MAX;
        let mut queue = VecDeque::from([root]);
        visited.insert(root);
        while let Some(node) = queue.pop_front() {
            component.insert(node);
            for (neighbor, confidence) in adjacency.get(&node).into_iter().flatten() {
                min_confidence = min_confidence.min(*confidence);
                if visited.insert(*neighbor) {
                    queue.push_back(*neighbor);
                }
            }
        }
        if component.len() < CHAIN_MIN_SIZE {
            continue;
        }

        let vessel_ids: Vec<i64> = component.into_iter().collect();
        if store.merge_chain_exists(&vessel_ids) {
            continue;
        }
        let contains_scrapped = vessel_ids
            .iter()
            .any(|id| store.vessel(*id).is_some_and(|v| v.imo_scrapped));
        store.add_merge_chain(MergeChain {
            chain_id: 0,
            vessel_ids,
            confidence: min_confidence,
            band: confidence_band(min_confidence).to_string(),
            contains_scrapped_imo: contains_scrapped,
        });
        created += 1;
    }
    store.commit("merge_chain_detection");

    info!(chains = created, "Merge chain detection complete");
    counts.insert("chains_created".to_string(), created);
    counts
}

/// Reconstruct multi-hop STS relay chains (≥ 3 vessels, 2 hops) in
/// temporal order and emit fleet alerts.
///
/// Returns `{relay_chains_created}`.
pub fn detect_sts_relay_chains(
    store: &mut Store,
    settings: &Settings,
    now: DateTime<Utc>,
) -> StepCounts {
    let mut counts = StepCounts::new();
    if !settings.features.sts_relay_chains_enabled {
        counts.insert("status_disabled".to_string(), 1);
        return counts;
    }

    // Edge list: (from, to, start_time) both directions
    struct Edge {
        to: i64,
        start: DateTime<Utc>,
    }
    let mut edges: BTreeMap<i64, Vec<Edge>> = BTreeMap::new();
    for sts_id in store.sts_ids() {
        let Some(event) = store.sts(sts_id) else { continue };
        edges.entry(event.vessel_1_id).or_default().push(Edge {
            to: event.vessel_2_id,
            start: event.start_time,
        });
        edges.entry(event.vessel_2_id).or_default().push(Edge {
            to: event.vessel_1_id,
            start: event.start_time,
        });
    }

    // DFS for simple paths in strictly increasing transfer time.
    // Chains are capped at 6 vessels — beyond that the signal is the
    // same and the path count explodes.
    const MAX_CHAIN_VESSELS: usize = 6;
    let mut found: BTreeSet<Vec<i64>> = BTreeSet::new();
    let starts: Vec<i64> = edges.keys().copied().collect();
    for start in starts {
        let mut stack: Vec<(Vec<i64>, Option<DateTime<Utc>>)> = vec![(vec![start], None)];
        while let Some((path, last_time)) = stack.pop() {
            let head = path[path.len() - 1];
            for edge in edges.get(&head).into_iter().flatten() {
                if path.contains(&edge.to) {
                    continue;
                }
                if last_time.is_some_and(|t| edge.start <= t) {
                    continue;
                }
                let mut next = path.clone();
                next.push(edge.to);
                if next.len() >= CHAIN_MIN_SIZE {
                    found.insert(next.clone());
                }
                if next.len() < MAX_CHAIN_VESSELS {
                    stack.push((next, Some(edge.start)));
                }
            }
        }
    }

    // Keep only maximal paths: drop any chain that is a prefix of a
    // longer one starting at the same vessel.
    let maximal: Vec<Vec<i64>> = found
        .iter()
        .filter(|path| {
            !found
                .iter()
                .any(|other| other.len() > path.len() && other.starts_with(path))
        })
        .cloned()
        .collect();

    let mut created = 0_i64;
    for path in maximal {
        let hops = (path.len() - 1) as i64;
        let score = if path.len() >= 4 { 40 } else { 20 };
        if store.fleet_alert_exists("sts_relay_chain", &path) {
            continue;
        }
        let intermediaries: Vec<i64> = path[1..path.len() - 1].to_vec();
        store.add_fleet_alert(FleetAlert {
            alert_id: 0,
            alert_type: "sts_relay_chain".to_string(),
            vessel_ids: path,
            evidence: json!({
                "hops": hops,
                "intermediary_vessel_ids": intermediaries,
            }),
            score,
            created_at: now,
        });
        created += 1;
    }
    store.commit("sts_relay_chains");

    info!(chains = created, "STS relay chain detection complete");
    counts.insert("relay_chains_created".to_string(), created);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MergeCandidate, StsDetectionType, StsTransferEvent};
    use chrono::{Duration, TimeZone};

    fn ts(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::hours(h)
    }

    fn settings_on() -> Settings {
        let mut s = Settings::default();
        s.features.merge_chains_enabled = true;
        s.features.sts_relay_chains_enabled = true;
        s
    }

    fn candidate(store: &mut Store, a: i64, b: i64, confidence: i32) {
        store.add_merge_candidate(MergeCandidate {
            candidate_id: 0,
            vessel_a_id: a,
            vessel_b_id: b,
            vessel_a_last_lat: 0.0,
            vessel_a_last_lon: 0.0,
            vessel_a_last_time: ts(0),
            vessel_b_first_lat: 0.0,
            vessel_b_first_lon: 0.0,
            vessel_b_first_time: ts(1),
            distance_nm: 1.0,
            time_delta_hours: 1.0,
            confidence_score: confidence,
            match_reasons: Default::default(),
            status: MergeCandidateStatus::Pending,
            resolved_at: None,
            resolved_by: None,
        });
    }

    fn sts(store: &mut Store, a: i64, b: i64, start_h: i64) {
        store.add_sts(StsTransferEvent {
            sts_id: 0,
            vessel_1_id: a.min(b),
            vessel_2_id: a.max(b),
            detection_type: StsDetectionType::VisibleVisible,
            start_time: ts(start_h),
            end_time: ts(start_h + 2),
            duration_minutes: 120,
            mean_proximity_meters: Some(150.0),
            mean_lat: None,
            mean_lon: None,
            corridor_id: None,
            eta_minutes: None,
            risk_score_component: 25,
            source: "proximity".to_string(),
        });
    }

    #[test]
    fn three_vessel_component_forms_chain_with_min_confidence() {
        let mut store = Store::new();
        for i in 1..=4 {
            store.create_vessel(&format!("21100000{i}"));
        }
        candidate(&mut store, 1, 2, 80);
        candidate(&mut store, 2, 3, 60);
        // Below-threshold edge must not join the component
        candidate(&mut store, 3, 4, 40);

        let counts = detect_merge_chains(&mut store, &settings_on());
        assert_eq!(counts["chains_created"], 1);
        let chains = store.merge_chains();
        assert_eq!(chains[0].vessel_ids, vec![1, 2, 3]);
        assert_eq!(chains[0].confidence, 60);
        assert_eq!(chains[0].band, "MEDIUM");
    }

    #[test]
    fn pair_only_graph_produces_no_chain() {
        let mut store = Store::new();
        store.create_vessel("211000001");
        store.create_vessel("211000002");
        candidate(&mut store, 1, 2, 90);
        let counts = detect_merge_chains(&mut store, &settings_on());
        assert_eq!(counts["chains_created"], 0);
    }

    #[test]
    fn chain_detection_dedups_on_rerun() {
        let mut store = Store::new();
        for i in 1..=3 {
            store.create_vessel(&format!("21100000{i}"));
        }
        candidate(&mut store, 1, 2, 80);
        candidate(&mut store, 2, 3, 80);
        detect_merge_chains(&mut store, &settings_on());
        let counts = detect_merge_chains(&mut store, &settings_on());
        assert_eq!(counts["chains_created"], 0);
        assert_eq!(store.merge_chains().len(), 1);
    }

    #[test]
    fn scrapped_imo_marks_the_chain() {
        let mut store = Store::new();
        for i in 1..=3 {
            let v = store.create_vessel(&format!("21100000{i}"));
            if i == 2 {
                store.vessel_mut(v).expect("vessel exists").imo_scrapped = true;
            }
        }
        candidate(&mut store, 1, 2, 80);
        candidate(&mut store, 2, 3, 80);
        detect_merge_chains(&mut store, &settings_on());
        assert!(store.merge_chains()[0].contains_scrapped_imo);
    }

    #[test]
    fn temporal_relay_chain_emits_alert() {
        let mut store = Store::new();
        for i in 1..=3 {
            store.create_vessel(&format!("21100000{i}"));
        }
        // 1→2 at h0, then 2→3 at h10: a valid relay
        sts(&mut store, 1, 2, 0);
        sts(&mut store, 2, 3, 10);

        let counts = detect_sts_relay_chains(&mut store, &settings_on(), ts(24));
        assert_eq!(counts["relay_chains_created"], 1);
        let alerts = store.fleet_alerts();
        assert_eq!(alerts[0].alert_type, "sts_relay_chain");
        assert_eq!(alerts[0].vessel_ids, vec![1, 2, 3]);
        assert_eq!(alerts[0].evidence["hops"], 2);
        assert_eq!(alerts[0].score, 20);
    }

    #[test]
    fn reversed_time_order_is_not_a_relay() {
        let mut store = Store::new();
        for i in 1..=3 {
            store.create_vessel(&format!("21100000{i}"));
        }
        // 2→3 happens before 1→2: cargo cannot flow 1→2→3
        sts(&mut store, 1, 2, 10);
        sts(&mut store, 2, 3, 0);

        let counts = detect_sts_relay_chains(&mut store, &settings_on(), ts(24));
        // The reverse path 3→2→1 IS valid in time order
        assert_eq!(counts["relay_chains_created"], 1);
        let alerts = store.fleet_alerts();
        assert_eq!(alerts[0].vessel_ids, vec![3, 2, 1]);
    }

    #[test]
    fn four_vessel_relay_scores_forty() {
        let mut store = Store::new();
        for i in 1..=4 {
            store.create_vessel(&format!("21100000{i}"));
        }
        sts(&mut store, 1, 2, 0);
        sts(&mut store, 2, 3, 10);
        sts(&mut store, 3, 4, 20);

        detect_sts_relay_chains(&mut store, &settings_on(), ts(48));
        let best = store
            .fleet_alerts()
            .iter()
            .map(|a| a.score)
            .max()
            .expect("alerts exist");
        assert_eq!(best, 40);
    }
}
