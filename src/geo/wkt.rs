//! WKT geometry parsing.
//!
//! Corridor and port geometries arrive as WKT text (`POLYGON((...))`,
//! `POINT(lon lat)`) or occasionally GeoJSON-ish blobs from upstream
//! loaders. Numeric-pair extraction over the raw string handles all of
//! them: any `lon lat` pair sequence yields a bounding box.

use regex::Regex;
use std::sync::OnceLock;

/// Axis-aligned bounding box in WGS-84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bbox {
    /// Containment check with a tolerance margin in degrees.
    pub fn contains(&self, lat: f64, lon: f64, tolerance: f64) -> bool {
        (self.min_lon - tolerance) <= lon
            && lon <= (self.max_lon + tolerance)
            && (self.min_lat - tolerance) <= lat
            && lat <= (self.max_lat + tolerance)
    }

    /// Geometric centre of the box.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

fn pair_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"(-?\d+(?:\.\d+)?)\s+(-?\d+(?:\.\d+)?)").expect("static regex is valid")
    })
}

/// Extract a bounding box from any WKT-like geometry string.
///
/// Pairs are read as `lon lat` (WKT axis order). Returns `None` when no
/// numeric pairs are present.
pub fn parse_wkt_bbox(geometry: &str) -> Option<Bbox> {
    let mut min_lon = f64::INFINITY;
    let mut min_lat = f64::INFINITY;
    let mut max_lon = f64::NEG_INFINITY;
    let mut max_lat = f64::NEG_INFINITY;
    let mut found = false;

    for cap in pair_regex().captures_iter(geometry) {
        let lon: f64 = cap[1].parse().ok()?;
        let lat: f64 = cap[2].parse().ok()?;
        min_lon = min_lon.min(lon);
        max_lon = max_lon.max(lon);
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
        found = true;
    }

    found.then_some(Bbox {
        min_lon,
        min_lat,
        max_lon,
        max_lat,
    })
}

/// Parse a WKT `POINT(lon lat)` into (lat, lon).
///
/// Tolerant of surrounding whitespace and extra text; the first numeric
/// pair wins.
pub fn parse_wkt_point(geometry: &str) -> Option<(f64, f64)> {
    let cap = pair_regex().captures(geometry)?;
    let lon: f64 = cap[1].parse().ok()?;
    let lat: f64 = cap[2].parse().ok()?;
    Some((lat, lon))
}
