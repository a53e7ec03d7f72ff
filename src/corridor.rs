//! Corridor correlation — bbox matching of positions to named zones.
//!
//! The index is built once per run from corridor WKT. Lookups are
//! first-match over bounding boxes with a 0.05° tolerance; STS zones are
//! queried before export routes so gap correlation prefers the higher-
//! signal zone when boxes overlap.

use crate::geo::{parse_wkt_bbox, Bbox};
use crate::types::{Corridor, CorridorId, CorridorType};
use tracing::warn;

/// Containment tolerance in degrees, shared by every corridor lookup.
pub const BBOX_TOLERANCE_DEG: f64 = 0.05;

/// In-memory (corridor, bbox) lists partitioned by lookup purpose.
#[derive(Debug, Default)]
pub struct CorridorIndex {
    /// All corridors with parseable geometry, STS zones first.
    all: Vec<(CorridorId, CorridorType, Bbox)>,
    /// STS zones only (Phase B stationary-tanker lookup).
    sts_zones: Vec<(CorridorId, Bbox)>,
    /// Anchorage-holding corridors (anchor-spoof exclusion).
    anchorages: Vec<(CorridorId, Bbox)>,
    /// Jamming-zone corridors (dark-zone lookup).
    jamming: Vec<(CorridorId, Bbox)>,
}

impl CorridorIndex {
    /// Build the index from corridor records. Corridors whose geometry
    /// yields no bbox are skipped with a warning.
    pub fn build(corridors: &[Corridor]) -> Self {
        let mut index = Self::default();

        // STS zones first so overlapping boxes resolve toward them.
        let ordered = corridors
            .iter()
            .filter(|c| c.corridor_type == CorridorType::StsZone)
            .chain(
                corridors
                    .iter()
                    .filter(|c| c.corridor_type != CorridorType::StsZone),
            );

        for corridor in ordered {
            let Some(bbox) = parse_wkt_bbox(&corridor.geometry) else {
                warn!(
                    corridor = %corridor.name,
                    "Corridor geometry has no parseable coordinates — skipping"
                );
                continue;
            };
            index
                .all
                .push((corridor.corridor_id, corridor.corridor_type, bbox));
            if corridor.corridor_type == CorridorType::StsZone {
                index.sts_zones.push((corridor.corridor_id, bbox));
            }
            if corridor.corridor_type == CorridorType::AnchorageHolding {
                index.anchorages.push((corridor.corridor_id, bbox));
            }
            if corridor.is_jamming_zone {
                index.jamming.push((corridor.corridor_id, bbox));
            }
        }
        index
    }

    /// First corridor whose bbox contains the point.
    pub fn find_corridor_for_point(&self, lat: f64, lon: f64) -> Option<CorridorId> {
        self.all
            .iter()
            .find(|(_, _, bbox)| bbox.contains(lat, lon, BBOX_TOLERANCE_DEG))
            .map(|(id, _, _)| *id)
    }

    /// First STS-zone corridor containing the point.
    pub fn find_sts_zone_for_point(&self, lat: f64, lon: f64) -> Option<CorridorId> {
        self.sts_zones
            .iter()
            .find(|(_, bbox)| bbox.contains(lat, lon, BBOX_TOLERANCE_DEG))
            .map(|(id, _)| *id)
    }

    /// First jamming-zone corridor containing the point.
    pub fn find_dark_zone_for_point(&self, lat: f64, lon: f64) -> Option<CorridorId> {
        self.jamming
            .iter()
            .find(|(_, bbox)| bbox.contains(lat, lon, BBOX_TOLERANCE_DEG))
            .map(|(id, _)| *id)
    }

    /// True when the point lies inside any anchorage-holding corridor.
    pub fn in_anchorage(&self, lat: f64, lon: f64) -> bool {
        self.anchorages
            .iter()
            .any(|(_, bbox)| bbox.contains(lat, lon, BBOX_TOLERANCE_DEG))
    }

    /// Number of indexed corridors.
    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// STS-zone count (Phase B preflight).
    pub fn sts_zone_count(&self) -> usize {
        self.sts_zones.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Corridor;
    use std::collections::BTreeSet;

    fn corridor(id: i64, ct: CorridorType, jamming: bool, wkt: &str) -> Corridor {
        Corridor {
            corridor_id: id,
            name: format!("corridor-{id}"),
            corridor_type: ct,
            risk_weight: 1.0,
            is_jamming_zone: jamming,
            description: None,
            geometry: wkt.to_string(),
            tags: BTreeSet::new(),
        }
    }

    const LACONIAN: &str = "POLYGON((22.0 36.0, 23.0 36.0, 23.0 37.0, 22.0 37.0, 22.0 36.0))";
    const BALTIC: &str = "POLYGON((19.0 54.0, 21.0 54.0, 21.0 56.0, 19.0 56.0, 19.0 54.0))";

    #[test]
    fn sts_zone_wins_over_overlapping_export_route() {
        // Same box registered as both export route and STS zone
        let corridors = vec![
            corridor(1, CorridorType::ExportRoute, false, LACONIAN),
            corridor(2, CorridorType::StsZone, false, LACONIAN),
        ];
        let index = CorridorIndex::build(&corridors);
        assert_eq!(index.find_corridor_for_point(36.5, 22.5), Some(2));
    }

    #[test]
    fn dark_zone_lookup_uses_jamming_list() {
        let corridors = vec![
            corridor(1, CorridorType::StsZone, false, LACONIAN),
            corridor(2, CorridorType::DarkZone, true, BALTIC),
        ];
        let index = CorridorIndex::build(&corridors);
        assert_eq!(index.find_dark_zone_for_point(55.0, 20.0), Some(2));
        assert_eq!(index.find_dark_zone_for_point(36.5, 22.5), None);
    }

    #[test]
    fn tolerance_extends_containment() {
        let corridors = vec![corridor(1, CorridorType::StsZone, false, LACONIAN)];
        let index = CorridorIndex::build(&corridors);
        // 0.04° outside the box — inside the 0.05° tolerance
        assert_eq!(index.find_corridor_for_point(37.04, 22.5), Some(1));
        assert_eq!(index.find_corridor_for_point(37.06, 22.5), None);
    }

    #[test]
    fn unparseable_geometry_is_skipped() {
        let corridors = vec![corridor(1, CorridorType::StsZone, false, "POLYGON EMPTY")];
        let index = CorridorIndex::build(&corridors);
        assert!(index.is_empty());
    }
}
