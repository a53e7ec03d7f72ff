//! External detection-feed import (GFW v3 event payloads).
//!
//! Payload shape: `{"entries": [{id, type, start, end, position:{lat,
//! lon}, vessel:{ssvid}, encounter:{vessel:{ssvid}}, gap:{...}}]}`.
//! Events resolve to vessels by SSVID (= MMSI); unresolvable entries
//! are counted, not fatal. Imported records carry their `source` label
//! so analysts can distinguish proximity detections from feed imports.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::ais_csv::parse_ais_timestamp;
use crate::corridor::CorridorIndex;
use crate::detectors::StepCounts;
use crate::store::Store;
use crate::types::{
    DarkVesselDetection, GapEvent, GapStatus, PortCall, StsDetectionType, StsTransferEvent,
};

fn entries(payload: &Value) -> Vec<&Value> {
    payload
        .get("entries")
        .or_else(|| payload.get("events"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().collect())
        .unwrap_or_default()
}

fn event_time(event: &Value, key: &str) -> Option<DateTime<Utc>> {
    event.get(key).and_then(Value::as_str).and_then(parse_ais_timestamp)
}

fn event_position(event: &Value) -> Option<(f64, f64)> {
    let position = event.get("position")?;
    Some((
        position.get("lat").and_then(Value::as_f64)?,
        position.get("lon").and_then(Value::as_f64)?,
    ))
}

fn ssvid_vessel(store: &Store, event: &Value, path: &[&str]) -> Option<i64> {
    let mut node = event;
    for key in path {
        node = node.get(key)?;
    }
    let ssvid = node.get("ssvid").and_then(Value::as_str)?;
    store.vessel_by_mmsi(ssvid).map(|v| v.vessel_id)
}

/// Import GFW encounter events as STS transfer events.
///
/// Returns `{imported, skipped}`.
pub fn import_gfw_encounters(
    store: &mut Store,
    corridors: &CorridorIndex,
    payload: &Value,
) -> StepCounts {
    let mut imported = 0_i64;
    let mut skipped = 0_i64;

    for event in entries(payload) {
        if event.get("type").and_then(Value::as_str) != Some("encounter") {
            skipped += 1;
            continue;
        }
        let (Some(v1), Some(v2)) = (
            ssvid_vessel(store, event, &["vessel"]),
            ssvid_vessel(store, event, &["encounter", "vessel"]),
        ) else {
            warn!("GFW encounter references unknown SSVID — skipping");
            skipped += 1;
            continue;
        };
        if v1 == v2 {
            skipped += 1;
            continue;
        }
        let (Some(start), Some(end)) = (event_time(event, "start"), event_time(event, "end"))
        else {
            skipped += 1;
            continue;
        };
        if store.sts_overlap_exists(v1, v2, start, end) {
            skipped += 1;
            continue;
        }
        let position = event_position(event);
        let corridor_id =
            position.and_then(|(lat, lon)| corridors.find_sts_zone_for_point(lat, lon));
        store.add_sts(StsTransferEvent {
            sts_id: 0,
            vessel_1_id: v1.min(v2),
            vessel_2_id: v1.max(v2),
            detection_type: StsDetectionType::GfwEncounter,
            start_time: start,
            end_time: end,
            duration_minutes: (end - start).num_minutes(),
            mean_proximity_meters: None,
            mean_lat: position.map(|p| p.0),
            mean_lon: position.map(|p| p.1),
            corridor_id,
            eta_minutes: None,
            risk_score_component: 25,
            source: "gfw".to_string(),
        });
        imported += 1;
    }
    store.commit("gfw_encounters");

    info!(imported, skipped, "GFW encounter import complete");
    summary(imported, skipped)
}

/// Import GFW gap events. Dedup mirrors the local gap detector: an
/// existing gap starting within ±10 minutes wins.
///
/// Returns `{imported, skipped}`.
pub fn import_gfw_gaps(
    store: &mut Store,
    corridors: &CorridorIndex,
    payload: &Value,
) -> StepCounts {
    let mut imported = 0_i64;
    let mut skipped = 0_i64;

    for event in entries(payload) {
        if event.get("type").and_then(Value::as_str) != Some("gap") {
            skipped += 1;
            continue;
        }
        let Some(vessel_id) = ssvid_vessel(store, event, &["vessel"]) else {
            skipped += 1;
            continue;
        };
        let (Some(start), Some(end)) = (event_time(event, "start"), event_time(event, "end"))
        else {
            skipped += 1;
            continue;
        };
        if end <= start {
            skipped += 1;
            continue;
        }
        // Sub-threshold silences are reporting noise, not gaps
        let duration_minutes = (end - start).num_minutes();
        if (duration_minutes as f64) < crate::config::defaults::GAP_MIN_HOURS * 60.0 {
            skipped += 1;
            continue;
        }
        if store.gap_exists_near_start(
            vessel_id,
            start,
            crate::config::defaults::GAP_DEDUP_WINDOW_MINUTES,
        ) {
            skipped += 1;
            continue;
        }

        let gap_node = event.get("gap").cloned().unwrap_or(Value::Null);
        let off = gap_node.get("offPosition");
        let off_lat = off.and_then(|p| p.get("lat")).and_then(Value::as_f64);
        let off_lon = off.and_then(|p| p.get("lon")).and_then(Value::as_f64);
        let distance_km = gap_node.get("distanceKm").and_then(Value::as_f64);
        let implied_speed = gap_node.get("impliedSpeedKnots").and_then(Value::as_f64);

        let corridor_id = match (off_lat, off_lon) {
            (Some(lat), Some(lon)) => corridors.find_corridor_for_point(lat, lon),
            _ => None,
        };
        let dark_zone_id = match (off_lat, off_lon) {
            (Some(lat), Some(lon)) => corridors.find_dark_zone_for_point(lat, lon),
            _ => None,
        };

        let gap_id = store.alloc_gap_id();
        store.add_gap(GapEvent {
            gap_event_id: gap_id,
            vessel_id,
            original_vessel_id: Some(vessel_id),
            gap_start: start,
            gap_end: end,
            duration_minutes,
            start_point_id: None,
            end_point_id: None,
            corridor_id,
            dark_zone_id,
            in_dark_zone: dark_zone_id.is_some(),
            impossible_speed_flag: implied_speed.is_some_and(|s| s > 30.0),
            velocity_plausibility_ratio: 0.0,
            max_plausible_distance_nm: 0.0,
            actual_gap_distance_nm: distance_km.map_or(0.0, |km| km / 1.852),
            pre_gap_sog: None,
            risk_score: 0,
            risk_breakdown: None,
            status: GapStatus::New,
        });
        imported += 1;
    }
    store.commit("gfw_gaps");

    info!(imported, skipped, "GFW gap import complete");
    summary(imported, skipped)
}

/// Import GFW port visits as port calls (matched against the registry
/// by proximity to the visit position).
///
/// Returns `{imported, skipped}`.
pub fn import_gfw_port_visits(store: &mut Store, payload: &Value) -> StepCounts {
    let mut imported = 0_i64;
    let mut skipped = 0_i64;

    for event in entries(payload) {
        if event.get("type").and_then(Value::as_str) != Some("port_visit") {
            skipped += 1;
            continue;
        }
        let Some(vessel_id) = ssvid_vessel(store, event, &["vessel"]) else {
            skipped += 1;
            continue;
        };
        let (Some(start), end) = (event_time(event, "start"), event_time(event, "end")) else {
            skipped += 1;
            continue;
        };
        let port_id = event_position(event).and_then(|(lat, lon)| {
            store
                .ports()
                .iter()
                .filter_map(|p| {
                    let (p_lat, p_lon) = crate::geo::parse_wkt_point(&p.geometry)?;
                    let dist = crate::geo::haversine_nm(lat, lon, p_lat, p_lon);
                    (dist <= 10.0).then_some((p.port_id, dist))
                })
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(id, _)| id)
        });
        store.add_port_call(PortCall {
            port_call_id: 0,
            vessel_id,
            port_id,
            arrival: start,
            departure: end,
            source: "gfw".to_string(),
        });
        imported += 1;
    }
    store.commit("gfw_port_visits");

    info!(imported, skipped, "GFW port visit import complete");
    summary(imported, skipped)
}

/// Import SAR detections as dark-vessel detections.
///
/// Returns `{imported, skipped}`.
pub fn import_sar_detections(
    store: &mut Store,
    corridors: &CorridorIndex,
    payload: &Value,
) -> StepCounts {
    let mut imported = 0_i64;
    let mut skipped = 0_i64;

    for event in entries(payload) {
        let Some((lat, lon)) = event_position(event) else {
            skipped += 1;
            continue;
        };
        let Some(detection_time) = event_time(event, "start").or_else(|| event_time(event, "timestamp"))
        else {
            skipped += 1;
            continue;
        };
        let matched_vessel = ssvid_vessel(store, event, &["vessel"]);
        store.add_dark_detection(DarkVesselDetection {
            detection_id: 0,
            detection_time,
            lat,
            lon,
            corridor_id: corridors.find_corridor_for_point(lat, lon),
            ais_match_result: if matched_vessel.is_some() {
                "matched".to_string()
            } else {
                "unmatched".to_string()
            },
            matched_vessel_id: matched_vessel,
            source: "gfw_sar".to_string(),
        });
        imported += 1;
    }
    store.commit("sar_detections");

    info!(imported, skipped, "SAR detection import complete");
    summary(imported, skipped)
}

fn summary(imported: i64, skipped: i64) -> StepCounts {
    let mut counts = StepCounts::new();
    counts.insert("imported".to_string(), imported);
    counts.insert("skipped".to_string(), skipped);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encounter_import_creates_canonical_sts() {
        let mut store = Store::new();
        let v1 = store.create_vessel("211000001");
        let v2 = store.create_vessel("572000002");
        let payload = json!({
            "entries": [{
                "id": "enc-1",
                "type": "encounter",
                "start": "2026-02-01T00:00:00Z",
                "end": "2026-02-01T03:00:00Z",
                "position": {"lat": 36.5, "lon": 22.5},
                "vessel": {"ssvid": "572000002"},
                "encounter": {"vessel": {"ssvid": "211000001"}}
            }]
        });
        let counts = import_gfw_encounters(&mut store, &CorridorIndex::default(), &payload);
        assert_eq!(counts["imported"], 1);
        let events = store.sts_for_vessel(v1);
        assert_eq!(events[0].detection_type, StsDetectionType::GfwEncounter);
        assert_eq!(events[0].vessel_1_id, v1.min(v2));
        assert_eq!(events[0].source, "gfw");
    }

    #[test]
    fn gap_import_dedups_against_local_detection() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        let payload = json!({
            "entries": [{
                "type": "gap",
                "start": "2026-02-01T00:00:00Z",
                "end": "2026-02-01T06:00:00Z",
                "vessel": {"ssvid": "211000001"},
                "gap": {"distanceKm": 55.6, "impliedSpeedKnots": 5.0}
            }]
        });
        let counts = import_gfw_gaps(&mut store, &CorridorIndex::default(), &payload);
        assert_eq!(counts["imported"], 1);
        assert_eq!(store.gaps_for_vessel(v).len(), 1);

        // Second import of the same silence dedups
        let counts = import_gfw_gaps(&mut store, &CorridorIndex::default(), &payload);
        assert_eq!(counts["imported"], 0);
        assert_eq!(counts["skipped"], 1);
    }

    #[test]
    fn unknown_ssvid_is_skipped() {
        let mut store = Store::new();
        let payload = json!({
            "entries": [{
                "type": "gap",
                "start": "2026-02-01T00:00:00Z",
                "end": "2026-02-01T06:00:00Z",
                "vessel": {"ssvid": "999999999"}
            }]
        });
        let counts = import_gfw_gaps(&mut store, &CorridorIndex::default(), &payload);
        assert_eq!(counts["skipped"], 1);
    }

    #[test]
    fn sar_detection_without_vessel_is_unmatched() {
        let mut store = Store::new();
        let payload = json!({
            "entries": [{
                "start": "2026-02-01T00:00:00Z",
                "position": {"lat": 44.5, "lon": 36.5}
            }]
        });
        let counts = import_sar_detections(&mut store, &CorridorIndex::default(), &payload);
        assert_eq!(counts["imported"], 1);
        assert_eq!(store.dark_detections()[0].ais_match_result, "unmatched");
    }
}
