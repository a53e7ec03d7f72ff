//! Corridor GeoJSON projection for map overlays.

use serde_json::{json, Value};

use crate::store::Store;

/// Render every corridor with parseable geometry as a GeoJSON
/// FeatureCollection. Polygons come from the stored WKT ring; the
/// properties carry the metadata the map styles on.
pub fn corridors_geojson(store: &Store) -> Value {
    let features: Vec<Value> = store
        .corridors()
        .iter()
        .filter_map(|corridor| {
            let ring = wkt_ring(&corridor.geometry)?;
            Some(json!({
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [ring],
                },
                "properties": {
                    "corridor_id": corridor.corridor_id,
                    "name": corridor.name,
                    "corridor_type": corridor.corridor_type,
                    "risk_weight": corridor.risk_weight,
                    "is_jamming_zone": corridor.is_jamming_zone,
                    "tags": corridor.tags,
                },
            }))
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

/// Extract the coordinate ring from a WKT polygon as [lon, lat] pairs,
/// closing the ring if the source left it open.
fn wkt_ring(wkt: &str) -> Option<Vec<[f64; 2]>> {
    let re = regex::Regex::new(r"(-?\d+(?:\.\d+)?)\s+(-?\d+(?:\.\d+)?)").ok()?;
    let mut ring: Vec<[f64; 2]> = re
        .captures_iter(wkt)
        .filter_map(|cap| {
            let lon: f64 = cap[1].parse().ok()?;
            let lat: f64 = cap[2].parse().ok()?;
            Some([lon, lat])
        })
        .collect();
    if ring.len() < 3 {
        return None;
    }
    if ring.first() != ring.last() {
        let first = ring[0];
        ring.push(first);
    }
    Some(ring)
}
