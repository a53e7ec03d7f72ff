//! Gap-interior position interpolation for movement envelopes.
//!
//! Method selection by gap duration:
//!   ≤ 2 h  — linear two-point track
//!   ≤ 6 h  — cubic Hermite spline seeded with endpoint SOG/COG
//!   > 6 h  — multi-scenario min/max-speed bounds
//!
//! All methods return (lat, lon, fraction) samples with fraction in
//! [0, 1] across the gap.

/// Sample count along an interpolated track.
const SAMPLES: usize = 12;

/// Straight-line interpolation between the gap endpoints.
pub fn interpolate_linear(
    start_lat: f64,
    start_lon: f64,
    end_lat: f64,
    end_lon: f64,
) -> Vec<(f64, f64, f64)> {
    (0..=SAMPLES)
        .map(|i| {
            let t = i as f64 / SAMPLES as f64;
            (
                start_lat + (end_lat - start_lat) * t,
                start_lon + (end_lon - start_lon) * t,
                t,
            )
        })
        .collect()
}

/// Cubic Hermite spline using endpoint course and speed as tangents.
///
/// Tangent magnitude is the distance the vessel would cover at its
/// endpoint SOG over the gap, expressed in degrees. Degenerate inputs
/// (zero speed) fall back to the linear chord direction.
#[allow(clippy::too_many_arguments)]
pub fn interpolate_hermite(
    start_lat: f64,
    start_lon: f64,
    end_lat: f64,
    end_lon: f64,
    start_sog: f64,
    start_cog: f64,
    end_sog: f64,
    end_cog: f64,
    duration_h: f64,
) -> Vec<(f64, f64, f64)> {
    // Convert a (sog, cog) pair into a lat/lon tangent in degrees over
    // the whole gap.
    let tangent = |sog: f64, cog: f64, at_lat: f64| -> (f64, f64) {
        let dist_nm = sog.max(0.0) * duration_h;
        let rad = cog.to_radians();
        let d_lat = dist_nm * rad.cos() / 60.0;
        let d_lon = dist_nm * rad.sin() / (60.0 * at_lat.to_radians().cos().max(0.01));
        (d_lat, d_lon)
    };

    let chord = (end_lat - start_lat, end_lon - start_lon);
    let (m0_lat, m0_lon) = if start_sog > 0.1 {
        tangent(start_sog, start_cog, start_lat)
    } else {
        chord
    };
    let (m1_lat, m1_lon) = if end_sog > 0.1 {
        tangent(end_sog, end_cog, end_lat)
    } else {
        chord
    };

    (0..=SAMPLES)
        .map(|i| {
            let t = i as f64 / SAMPLES as f64;
            let t2 = t * t;
            let t3 = t2 * t;
            let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
            let h10 = t3 - 2.0 * t2 + t;
            let h01 = -2.0 * t3 + 3.0 * t2;
            let h11 = t3 - t2;
            (
                h00 * start_lat + h10 * m0_lat + h01 * end_lat + h11 * m1_lat,
                h00 * start_lon + h10 * m0_lon + h01 * end_lon + h11 * m1_lon,
                t,
            )
        })
        .collect()
}

/// Multi-scenario bounds for long gaps: the linear track plus slow
/// (half class speed) and fast (full class speed) excursion scenarios
/// along the departure course.
#[allow(clippy::too_many_arguments)]
pub fn interpolate_scenarios(
    start_lat: f64,
    start_lon: f64,
    end_lat: f64,
    end_lon: f64,
    start_sog: f64,
    start_cog: f64,
    max_speed_kn: f64,
    duration_h: f64,
) -> Vec<(f64, f64, f64)> {
    let mut samples = interpolate_linear(start_lat, start_lon, end_lat, end_lon);

    // Excursion scenarios: outbound legs at half and full class speed
    // along the pre-gap course, rejoining the end point.
    let rad = start_cog.to_radians();
    for speed in [max_speed_kn * 0.5, max_speed_kn] {
        let reach_nm = speed * duration_h / 2.0;
        let apex_lat = start_lat + reach_nm * rad.cos() / 60.0;
        let apex_lon =
            start_lon + reach_nm * rad.sin() / (60.0 * start_lat.to_radians().cos().max(0.01));
        samples.extend(interpolate_linear(start_lat, start_lon, apex_lat, apex_lon));
        samples.extend(interpolate_linear(apex_lat, apex_lon, end_lat, end_lon));
    }
    let _ = start_sog; // departure speed folds into the class bound

    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_hits_both_endpoints() {
        let track = interpolate_linear(55.0, 20.0, 56.0, 21.0);
        let first = track.first().expect("non-empty");
        let last = track.last().expect("non-empty");
        assert_eq!((first.0, first.1, first.2), (55.0, 20.0, 0.0));
        assert_eq!((last.0, last.1, last.2), (56.0, 21.0, 1.0));
    }

    #[test]
    fn hermite_hits_both_endpoints() {
        let track = interpolate_hermite(55.0, 20.0, 56.0, 21.0, 12.0, 45.0, 10.0, 90.0, 4.0);
        let first = track.first().expect("non-empty");
        let last = track.last().expect("non-empty");
        assert!((first.0 - 55.0).abs() < 1e-9 && (first.1 - 20.0).abs() < 1e-9);
        assert!((last.0 - 56.0).abs() < 1e-9 && (last.1 - 21.0).abs() < 1e-9);
    }

    #[test]
    fn hermite_with_zero_speed_degrades_to_chord() {
        let hermite = interpolate_hermite(55.0, 20.0, 56.0, 21.0, 0.0, 0.0, 0.0, 0.0, 4.0);
        let linear = interpolate_linear(55.0, 20.0, 56.0, 21.0);
        // Chord tangents keep the spline close to the straight line
        for (h, l) in hermite.iter().zip(linear.iter()) {
            assert!((h.0 - l.0).abs() < 0.5);
            assert!((h.1 - l.1).abs() < 0.5);
        }
    }

    #[test]
    fn scenarios_include_linear_track() {
        let track = interpolate_scenarios(55.0, 20.0, 56.0, 21.0, 10.0, 0.0, 18.0, 10.0);
        // Linear samples plus two excursion scenarios of two legs each
        assert!(track.len() > 13 * 3);
    }
}
