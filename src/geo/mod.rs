//! Geographic utilities — great-circle math and geometry parsing.
//!
//! All distance math is spherical (haversine); positions are WGS-84
//! lat/lon degrees. Corridor polygons are matched via bounding boxes,
//! not exact point-in-polygon — the 0.05° tolerance on containment
//! absorbs the difference for the corridor shapes in use.

mod wkt;

pub use wkt::{parse_wkt_bbox, parse_wkt_point, Bbox};

use crate::config::defaults::{EARTH_RADIUS_NM, NM_TO_METERS};

/// Great-circle distance in nautical miles between two WGS-84 coordinates.
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_NM * c
}

/// Great-circle distance in metres between two WGS-84 coordinates.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_nm(lat1, lon1, lat2, lon2) * NM_TO_METERS
}

/// Initial bearing (degrees 0-360) from one point to another.
pub fn initial_bearing(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> f64 {
    let lat1 = from_lat.to_radians();
    let lat2 = to_lat.to_radians();
    let d_lon = (to_lon - from_lon).to_radians();

    let x = d_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    let bearing = x.atan2(y).to_degrees();
    (bearing + 360.0) % 360.0
}

/// Minimum angular difference between two headings, result in [0, 180].
pub fn heading_diff(h1: f64, h2: f64) -> f64 {
    let diff = (h1 - h2).abs() % 360.0;
    if diff <= 180.0 {
        diff
    } else {
        360.0 - diff
    }
}

/// Map coordinates to a 1-degree integer grid cell.
pub fn grid_cell(lat: f64, lon: f64) -> (i32, i32) {
    (lat.floor() as i32, lon.floor() as i32)
}

/// Render a confidence ellipse as a WKT POLYGON.
///
/// `semi_major_nm` along `heading_deg`, `semi_minor_nm` across it,
/// centred at (lat, lon). 32 perimeter samples; ring closed explicitly.
pub fn ellipse_wkt(
    lat: f64,
    lon: f64,
    semi_major_nm: f64,
    semi_minor_nm: f64,
    heading_deg: f64,
) -> String {
    const SAMPLES: usize = 32;
    let theta = heading_deg.to_radians();
    // Degrees per NM: 1/60 latitude; longitude shrinks with cos(lat)
    let lat_per_nm = 1.0 / 60.0;
    let lon_per_nm = 1.0 / (60.0 * lat.to_radians().cos().max(0.01));

    let mut coords = Vec::with_capacity(SAMPLES + 1);
    for i in 0..=SAMPLES {
        let t = 2.0 * std::f64::consts::PI * (i as f64) / (SAMPLES as f64);
        // Ellipse in local NM frame, rotated to heading
        let x = semi_major_nm * t.cos();
        let y = semi_minor_nm * t.sin();
        let north = x * theta.cos() - y * theta.sin();
        let east = x * theta.sin() + y * theta.cos();
        let p_lat = lat + north * lat_per_nm;
        let p_lon = lon + east * lon_per_nm;
        coords.push(format!("{p_lon:.6} {p_lat:.6}"));
    }
    format!("POLYGON(({}))", coords.join(", "))
}
