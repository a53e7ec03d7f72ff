//! System-wide default constants.
//!
//! Centralises magic numbers shared across detector modules.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Units
// ============================================================================

/// Metres per nautical mile.
pub const NM_TO_METERS: f64 = 1852.0;

/// Mean Earth radius in nautical miles (WGS-84 derived).
pub const EARTH_RADIUS_NM: f64 = 3440.065;

// ============================================================================
// Gap Detection
// ============================================================================

/// Minimum silence duration that constitutes an AIS gap (hours, inclusive).
pub const GAP_MIN_HOURS: f64 = 2.0;

/// Intervals below this are Class-B reporting artifacts, not gaps (seconds).
pub const CLASS_B_NOISE_FILTER_SECONDS: f64 = 60.0;

/// Dedup window around an existing gap start (minutes).
///
/// Absorbs timestamp jitter between locally-detected gaps and external
/// (GFW) gap imports of the same silence.
pub const GAP_DEDUP_WINDOW_MINUTES: i64 = 10;

/// Plausibility ratio above which a reappearance is physically impossible.
///
/// 1.1 rather than 1.0: AIS timestamps have 1-second resolution and
/// great-circle vs. actual sailing path differences produce ratios up to
/// ~1.05 on legitimate voyages.
pub const IMPOSSIBLE_SPEED_RATIO: f64 = 1.1;

/// Envelope semi-major axis as a fraction of max plausible distance.
pub const ENVELOPE_SEMI_MAJOR_FRACTION: f64 = 0.7;

/// Envelope semi-minor axis as a fraction of max plausible distance.
pub const ENVELOPE_SEMI_MINOR_FRACTION: f64 = 0.3;

// ============================================================================
// Spoofing Detection
// ============================================================================

/// Implied speed above which consecutive points indicate MMSI reuse (knots).
pub const MMSI_REUSE_SPEED_KN: f64 = 30.0;

/// Port proximity radius used by spoofing typologies (nautical miles).
pub const PORT_PROXIMITY_NM: f64 = 5.0;

/// Minimum anchor-spoof run duration (hours).
pub const ANCHOR_SPOOF_MIN_HOURS: f64 = 72.0;

/// Circle-spoof forward window anchored on each point (hours).
pub const CIRCLE_SPOOF_WINDOW_HOURS: f64 = 6.0;

/// Minimum points inside a circle-spoof window.
pub const CIRCLE_SPOOF_MIN_POINTS: usize = 6;

/// Minimum slow-roll run duration (hours).
pub const SLOW_ROLL_MIN_HOURS: f64 = 12.0;

/// Stale-AIS minimum consecutive frozen points.
pub const STALE_AIS_MIN_CONSECUTIVE: usize = 10;

/// Stale-AIS minimum span (hours).
pub const STALE_AIS_MIN_SPAN_HOURS: f64 = 2.0;

/// Window for linking anomalies to temporally-adjacent gap events (hours).
pub const ANOMALY_GAP_LINK_WINDOW_HOURS: i64 = 2;

// ============================================================================
// STS Detection
// ============================================================================

/// Width of each STS time bucket (minutes).
pub const STS_BUCKET_MINUTES: i64 = 15;

/// Phase A "not moving" speed threshold (knots).
pub const STS_SOG_STATIONARY: f64 = 1.0;

/// Phase B "anchor-like" speed threshold (knots).
pub const STS_SOG_STATIONARY_B: f64 = 0.5;

/// Phase B approaching-speed band (knots).
pub const STS_SOG_APPROACHING_MIN: f64 = 0.5;
pub const STS_SOG_APPROACHING_MAX: f64 = 3.0;

/// Tolerance for parallel / anti-parallel heading checks (degrees).
pub const STS_COG_PARALLEL_DEG: f64 = 30.0;

/// Phase B intercept horizon (minutes).
pub const STS_ETA_MAX_MINUTES: i64 = 240;

/// Port exclusion radius for Phase A events (nautical miles).
pub const STS_PORT_EXCLUSION_NM: f64 = 3.0;

/// DWT threshold for the tanker filter when vessel_type is missing (tons).
pub const TANKER_MIN_DWT: f64 = 20_000.0;

/// Dark-dark candidate cap per corridor per run.
pub const DARK_STS_MAX_CANDIDATES_PER_CORRIDOR: usize = 100;

/// Dark-dark minimum temporal gap overlap (hours).
pub const DARK_STS_MIN_OVERLAP_HOURS: f64 = 4.0;

// ============================================================================
// Identity Resolution
// ============================================================================

/// Maximum merge-chain depth before canonical resolution errors out.
pub const MAX_MERGE_CHAIN_HOPS: usize = 20;

/// AIS point reassignment batch size during merge execution (rows).
pub const MERGE_AIS_BATCH_SIZE: usize = 50_000;

/// Hour-bucket granularity for the overlapping-transmission guard (seconds).
pub const OVERLAP_BUCKET_SECONDS: i64 = 3600;

/// Nearby-vessel count above which anchorage density penalties apply.
pub const ANCHORAGE_DENSITY_THRESHOLD: usize = 5;

// ============================================================================
// Fusion
// ============================================================================

/// Convoy window spacing (minutes) and minimum consecutive windows (16 = 4h).
pub const CONVOY_BUCKET_MINUTES: i64 = 15;
pub const CONVOY_MIN_WINDOWS: usize = 16;

/// Convoy pair distance ceiling (nautical miles).
pub const CONVOY_MAX_DISTANCE_NM: f64 = 5.0;

/// Convoy co-movement heading tolerance (degrees).
pub const CONVOY_HEADING_TOLERANCE_DEG: f64 = 15.0;

/// Floating-storage loiter threshold (hours).
pub const FLOATING_STORAGE_MIN_HOURS: f64 = 720.0;

/// Fingerprint extraction minimums.
pub const FINGERPRINT_MIN_POINTS: usize = 300;
pub const FINGERPRINT_MIN_SPAN_HOURS: f64 = 24.0;
pub const FINGERPRINT_WINDOW_HOURS: f64 = 6.0;

/// Windows required before a full covariance matrix is estimated.
pub const FINGERPRINT_FULL_COV_MIN_WINDOWS: usize = 10;

/// Diagonal loading added to covariance matrices before inversion.
pub const FINGERPRINT_DIAGONAL_LOADING: f64 = 1e-3;

/// Fingerprint ranking candidate cap per query.
pub const FINGERPRINT_CANDIDATE_CAP: usize = 500;

/// Route-template dedup threshold (Jaccard similarity).
pub const ROUTE_TEMPLATE_JACCARD_THRESHOLD: f64 = 0.5;

/// Draught ratio at or above which a tanker is considered laden.
pub const CARGO_LADEN_RATIO: f64 = 0.6;
