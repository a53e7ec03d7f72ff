//! Corridor and port registry loading.
//!
//! Definitions arrive as JSON documents (arrays of objects) produced by
//! the geo-data collaborator. Loaded once at startup; entries with
//! unparseable geometry or unknown corridor types are skipped with a
//! warning and counted.

use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::detectors::StepCounts;
use crate::geo::{parse_wkt_bbox, parse_wkt_point};
use crate::store::Store;
use crate::types::{Corridor, CorridorType, Port};

/// Raw corridor definition as supplied by the loader document.
#[derive(Debug, Deserialize)]
pub struct CorridorDefinition {
    pub name: String,
    pub corridor_type: String,
    #[serde(default = "default_risk_weight")]
    pub risk_weight: f64,
    #[serde(default)]
    pub is_jamming_zone: bool,
    #[serde(default)]
    pub description: Option<String>,
    pub geometry: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_risk_weight() -> f64 {
    1.0
}

/// Raw port definition.
#[derive(Debug, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    pub geometry: String,
    #[serde(default)]
    pub major_port: bool,
    #[serde(default)]
    pub is_russian_oil_terminal: bool,
    #[serde(default)]
    pub is_eu: bool,
}

/// Load corridor definitions from a JSON array document.
///
/// Returns `{corridors_loaded, skipped}`.
pub fn load_corridors(store: &mut Store, json: &str) -> Result<StepCounts, super::IngestError> {
    let definitions: Vec<CorridorDefinition> = serde_json::from_str(json)
        .map_err(|e| super::IngestError::Malformed(format!("corridor document: {e}")))?;

    let mut loaded = 0_i64;
    let mut skipped = 0_i64;
    for def in definitions {
        let Some(corridor_type) = CorridorType::parse(&def.corridor_type) else {
            warn!(name = %def.name, raw_type = %def.corridor_type, "Unknown corridor type — skipping");
            skipped += 1;
            continue;
        };
        if parse_wkt_bbox(&def.geometry).is_none() {
            warn!(name = %def.name, "Corridor geometry yields no bounding box — skipping");
            skipped += 1;
            continue;
        }
        let tags: BTreeSet<String> = def.tags.into_iter().collect();
        store.add_corridor(Corridor {
            corridor_id: 0,
            name: def.name,
            corridor_type,
            risk_weight: def.risk_weight,
            is_jamming_zone: def.is_jamming_zone,
            description: def.description,
            geometry: def.geometry,
            tags,
        });
        loaded += 1;
    }
    store.commit("corridor_load");

    info!(loaded, skipped, "Corridor definitions loaded");
    let mut counts = StepCounts::new();
    counts.insert("corridors_loaded".to_string(), loaded);
    counts.insert("skipped".to_string(), skipped);
    Ok(counts)
}

/// Load the port registry from a JSON array document.
///
/// Returns `{ports_loaded, skipped}`.
pub fn load_ports(store: &mut Store, json: &str) -> Result<StepCounts, super::IngestError> {
    let definitions: Vec<PortDefinition> = serde_json::from_str(json)
        .map_err(|e| super::IngestError::Malformed(format!("port document: {e}")))?;

    let mut loaded = 0_i64;
    let mut skipped = 0_i64;
    for def in definitions {
        if parse_wkt_point(&def.geometry).is_none() {
            warn!(name = %def.name, "Port geometry is not a parseable point — skipping");
            skipped += 1;
            continue;
        }
        store.add_port(Port {
            port_id: 0,
            name: def.name,
            country: def.country,
            geometry: def.geometry,
            major_port: def.major_port,
            is_russian_oil_terminal: def.is_russian_oil_terminal,
            is_eu: def.is_eu,
        });
        loaded += 1;
    }
    store.commit("port_load");

    info!(loaded, skipped, "Port registry loaded");
    let mut counts = StepCounts::new();
    counts.insert("ports_loaded".to_string(), loaded);
    counts.insert("skipped".to_string(), skipped);
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_corridors_and_skips_unknown_types() {
        let mut store = Store::new();
        let json = r#"[
            {
                "name": "Laconian Gulf STS anchorage",
                "corridor_type": "sts_zone",
                "risk_weight": 2.0,
                "geometry": "POLYGON((22.0 36.0, 23.0 36.0, 23.0 37.0, 22.0 37.0, 22.0 36.0))",
                "tags": ["sts", "mediterranean"]
            },
            {
                "name": "Bad",
                "corridor_type": "wormhole",
                "geometry": "POLYGON((0 0, 1 1, 0 0))"
            }
        ]"#;
        let counts = load_corridors(&mut store, json).expect("document parses");
        assert_eq!(counts["corridors_loaded"], 1);
        assert_eq!(counts["skipped"], 1);
        let corridor = store.corridors()[0];
        assert_eq!(corridor.corridor_type, CorridorType::StsZone);
        assert!(corridor.has_tag("sts"));
    }

    #[test]
    fn loads_ports() {
        let mut store = Store::new();
        let json = r#"[
            {
                "name": "Novorossiysk",
                "country": "RU",
                "geometry": "POINT(37.8 44.7)",
                "major_port": true,
                "is_russian_oil_terminal": true
            }
        ]"#;
        let counts = load_ports(&mut store, json).expect("document parses");
        assert_eq!(counts["ports_loaded"], 1);
        assert_eq!(store.russian_oil_terminals().len(), 1);
    }

    #[test]
    fn malformed_document_errors() {
        let mut store = Store::new();
        assert!(load_corridors(&mut store, "not json").is_err());
    }
}
