//! Detection Integration Tests
//!
//! Drives the detectors through realistic ingest → detect flows:
//! corridor/port loading, AIS CSV batches, STS proximity scenarios and
//! the detection round-trip laws (re-run produces nothing new).

use chrono::{DateTime, Duration, TimeZone, Utc};
use darkfleet::config::Settings;
use darkfleet::corridor::CorridorIndex;
use darkfleet::detectors::{gap, sts};
use darkfleet::ingest::{ingest_ais_csv, load_corridors, load_ports};
use darkfleet::scoring::ScoringConfig;
use darkfleet::types::{AisClass, StsDetectionType};
use darkfleet::Store;

const CORRIDORS_JSON: &str = r#"[
    {
        "name": "Laconian Gulf STS anchorage",
        "corridor_type": "sts_zone",
        "risk_weight": 2.0,
        "geometry": "POLYGON((22.0 36.0, 23.0 36.0, 23.0 37.0, 22.0 37.0, 22.0 36.0))",
        "tags": ["sts"]
    },
    {
        "name": "Kerch approach jamming",
        "corridor_type": "dark_zone",
        "is_jamming_zone": true,
        "geometry": "POLYGON((36.0 44.0, 37.0 44.0, 37.0 45.0, 36.0 45.0, 36.0 44.0))"
    }
]"#;

const PORTS_JSON: &str = r#"[
    {
        "name": "Novorossiysk",
        "country": "RU",
        "geometry": "POINT(37.8 44.7)",
        "major_port": true,
        "is_russian_oil_terminal": true
    },
    {
        "name": "Rotterdam",
        "country": "NL",
        "geometry": "POINT(4.1 51.95)",
        "major_port": true,
        "is_eu": true
    }
]"#;

fn ts(mins: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
        + Duration::minutes(mins)
}

fn seeded_store() -> (Store, CorridorIndex) {
    let mut store = Store::new();
    load_corridors(&mut store, CORRIDORS_JSON).expect("corridors load");
    load_ports(&mut store, PORTS_JSON).expect("ports load");
    let list: Vec<darkfleet::types::Corridor> =
        store.corridors().into_iter().cloned().collect();
    let index = CorridorIndex::build(&list);
    (store, index)
}

fn tanker(store: &mut Store, mmsi: &str) -> i64 {
    let v = store.create_vessel(mmsi);
    {
        let vessel = store.vessel_mut(v).expect("vessel exists");
        vessel.vessel_type = Some("crude oil tanker".to_string());
        vessel.deadweight = Some(100_000.0);
    }
    v
}

/// Ingested CSV rows feed gap detection; corridor correlation tags the
/// gap with the STS zone.
#[test]
fn csv_ingest_through_gap_detection() {
    let (mut store, corridors) = seeded_store();
    let csv = "\
mmsi,timestamp,lat,lon,sog,cog
211000001,2026-02-01T00:00:00Z,36.5,22.5,10.0,90.0
211000001,2026-02-01T05:00:00Z,36.6,22.7,10.0,90.0
";
    let summary = ingest_ais_csv(&mut store, csv);
    assert_eq!(summary.accepted, 2);

    let settings = Settings::default();
    let counts = gap::run_gap_detection(&mut store, &settings, &corridors);
    assert_eq!(counts["gaps_detected"], 1);

    let gap = store.gap(1).expect("gap exists");
    assert_eq!(gap.duration_minutes, 300);
    let corridor = gap
        .corridor_id
        .and_then(|id| store.corridor(id))
        .expect("gap correlated to a corridor");
    assert_eq!(corridor.name, "Laconian Gulf STS anchorage");
}

/// Round-trip law: gap detection over an unchanged stream, run twice,
/// creates nothing on the second pass.
#[test]
fn gap_detection_rerun_is_no_op() {
    let (mut store, corridors) = seeded_store();
    let v = tanker(&mut store, "211000001");
    store.add_ais_point(v, ts(0), 55.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
    store.add_ais_point(v, ts(300), 55.4, 20.5, Some(10.0), None, None, None, None, AisClass::A);

    let settings = Settings::default();
    let first = gap::run_gap_detection(&mut store, &settings, &corridors);
    let second = gap::run_gap_detection(&mut store, &settings, &corridors);
    assert_eq!(first["gaps_detected"], 1);
    assert_eq!(second["gaps_detected"], 0);
    assert_eq!(store.gap_count(), 1);
}

/// Boundary: exactly 2 h triggers (inclusive); just under does not.
#[test]
fn gap_boundary_is_inclusive_at_two_hours() {
    let settings = Settings::default();
    for (minutes, expected) in [(120_i64, 1_i64), (119, 0)] {
        let (mut store, corridors) = seeded_store();
        let v = tanker(&mut store, "211000001");
        store.add_ais_point(v, ts(0), 55.0, 20.0, Some(10.0), None, None, None, None, AisClass::A);
        store.add_ais_point(v, ts(minutes), 55.2, 20.2, Some(10.0), None, None, None, None, AisClass::A);
        let counts = gap::run_gap_detection(&mut store, &settings, &corridors);
        assert_eq!(counts["gaps_detected"], expected, "Δ = {minutes} min");
    }
}

/// Seed scenario: two tankers at 5-minute cadence, side by side, slow,
/// parallel course, three hours inside the Laconian Gulf zone.
#[test]
fn sts_pair_in_laconian_gulf() {
    let (mut store, corridors) = seeded_store();
    let v1 = tanker(&mut store, "211000001");
    let v2 = tanker(&mut store, "572000002");
    for i in 0..36 {
        let t = ts(i * 5);
        store.add_ais_point(v1, t, 36.5, 22.5, Some(0.4), Some(90.0), None, None, None, AisClass::A);
        store.add_ais_point(v2, t, 36.50005, 22.50005, Some(0.4), Some(90.0), None, None, None, AisClass::A);
    }

    let settings = Settings::default();
    let scoring = ScoringConfig::default();
    let counts = sts::detect_sts_events(&mut store, &settings, &corridors, &scoring);
    assert_eq!(counts["sts_events_created"], 1);

    let events = store.sts_for_vessel(v1);
    let event = events[0];
    assert_eq!(event.detection_type, StsDetectionType::VisibleVisible);
    assert_eq!(event.risk_score_component, 35, "STS-zone events score 35");
    assert!(event.duration_minutes >= 120);
    assert!(event.vessel_1_id < event.vessel_2_id);
    assert!(event.start_time <= event.end_time);
}

/// A berthed pair at a major port is not an STS transfer.
#[test]
fn berthed_pair_near_port_is_suppressed() {
    let (mut store, corridors) = seeded_store();
    let v1 = tanker(&mut store, "211000001");
    let v2 = tanker(&mut store, "572000002");
    // Alongside at Novorossiysk (44.7, 37.8)
    for i in 0..36 {
        let t = ts(i * 5);
        store.add_ais_point(v1, t, 44.7, 37.8, Some(0.2), Some(90.0), None, None, None, AisClass::A);
        store.add_ais_point(v2, t, 44.70005, 37.80005, Some(0.2), Some(90.0), None, None, None, AisClass::A);
    }
    let settings = Settings::default();
    let scoring = ScoringConfig::default();
    let counts = sts::detect_sts_events(&mut store, &settings, &corridors, &scoring);
    assert_eq!(counts["sts_events_created"], 0);
}

/// Non-tanker traffic is invisible to the STS detector.
#[test]
fn non_tankers_are_filtered_from_sts() {
    let (mut store, corridors) = seeded_store();
    let v1 = store.create_vessel("211000001");
    let v2 = store.create_vessel("572000002");
    for v in [v1, v2] {
        store.vessel_mut(v).expect("vessel exists").vessel_type =
            Some("passenger ferry".to_string());
    }
    for i in 0..36 {
        let t = ts(i * 5);
        store.add_ais_point(v1, t, 36.5, 22.5, Some(0.4), Some(90.0), None, None, None, AisClass::A);
        store.add_ais_point(v2, t, 36.50005, 22.50005, Some(0.4), Some(90.0), None, None, None, AisClass::A);
    }
    let settings = Settings::default();
    let scoring = ScoringConfig::default();
    let counts = sts::detect_sts_events(&mut store, &settings, &corridors, &scoring);
    assert_eq!(counts["sts_events_created"], 0);
}

/// Dark-zone gaps are tagged via the jamming corridor list.
#[test]
fn jamming_zone_gap_is_marked_dark() {
    let (mut store, corridors) = seeded_store();
    let v = tanker(&mut store, "273000001");
    store.add_ais_point(v, ts(0), 44.5, 36.5, Some(8.0), None, None, None, None, AisClass::A);
    store.add_ais_point(v, ts(240), 44.6, 36.6, Some(8.0), None, None, None, None, AisClass::A);

    let settings = Settings::default();
    gap::run_gap_detection(&mut store, &settings, &corridors);
    let gap = store.gap(1).expect("gap exists");
    assert!(gap.in_dark_zone);
    assert!(gap.dark_zone_id.is_some());
}
