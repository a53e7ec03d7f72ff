//! AIS CSV batch ingestion.
//!
//! Column headers are case-insensitive; unknown columns are ignored.
//! Rows with a missing/invalid MMSI or out-of-range lat/lon are
//! rejected and counted. Duplicate (mmsi, timestamp) rows are skipped.
//! Timestamps accept ISO-8601 (with or without zone suffix, normalized
//! to UTC) or unix epoch seconds.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::csv_split;
use crate::store::Store;
use crate::types::AisClass;

/// Batch import outcome.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
}

/// Column positions resolved from the header row.
#[derive(Debug, Default)]
struct ColumnMap {
    mmsi: Option<usize>,
    timestamp: Option<usize>,
    lat: Option<usize>,
    lon: Option<usize>,
    sog: Option<usize>,
    cog: Option<usize>,
    heading: Option<usize>,
    nav_status: Option<usize>,
    draught: Option<usize>,
    ais_class: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[String]) -> Self {
        let mut map = Self::default();
        for (idx, raw) in header.iter().enumerate() {
            let name = raw.trim().to_ascii_lowercase();
            match name.as_str() {
                "mmsi" | "vessel_mmsi" => map.mmsi = Some(idx),
                "timestamp" | "timestamp_utc" | "time" | "basedatetime" => {
                    map.timestamp = Some(idx);
                }
                "lat" | "latitude" => map.lat = Some(idx),
                "lon" | "lng" | "longitude" => map.lon = Some(idx),
                "sog" | "speed" | "speed_over_ground" => map.sog = Some(idx),
                "cog" | "course" | "course_over_ground" => map.cog = Some(idx),
                "heading" => map.heading = Some(idx),
                "nav_status" | "navstatus" | "status" => map.nav_status = Some(idx),
                "draught" | "draft" => map.draught = Some(idx),
                "ais_class" | "class" => map.ais_class = Some(idx),
                _ => {} // unknown columns ignored
            }
        }
        map
    }

    fn usable(&self) -> bool {
        self.mmsi.is_some() && self.timestamp.is_some() && self.lat.is_some() && self.lon.is_some()
    }
}

fn field<'a>(fields: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    let value = fields.get(idx?)?.trim();
    (!value.is_empty()).then_some(value)
}

fn parse_f64(fields: &[String], idx: Option<usize>) -> Option<f64> {
    field(fields, idx)?.parse().ok()
}

/// Parse an AIS timestamp: ISO-8601 (zone-suffixed or naive, normalized
/// to UTC) or epoch seconds.
pub fn parse_ais_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(epoch) = trimmed.parse::<i64>() {
        return Utc.timestamp_opt(epoch, 0).single();
    }
    None
}

fn valid_mmsi(raw: &str) -> bool {
    raw.len() == 9 && raw.bytes().all(|b| b.is_ascii_digit())
}

/// Ingest an AIS CSV document (header row + records).
///
/// Creates vessels on first MMSI reception, stamping `mmsi_first_seen`
/// from the earliest accepted record. Absorbed identities accept no new
/// points: records for a merged MMSI are rejected.
pub fn ingest_ais_csv(store: &mut Store, contents: &str) -> IngestSummary {
    let mut summary = IngestSummary::default();
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return summary;
    };
    let columns = ColumnMap::from_header(&csv_split(header_line));
    if !columns.usable() {
        warn!("AIS CSV header missing required columns (mmsi, timestamp, lat, lon)");
        return summary;
    }

    // MMSI → vessel cache for the batch
    let mut vessel_cache: BTreeMap<String, i64> = BTreeMap::new();

    for line in lines {
        let fields = csv_split(line);

        let Some(mmsi) = field(&fields, columns.mmsi) else {
            summary.rejected += 1;
            continue;
        };
        if !valid_mmsi(mmsi) {
            summary.rejected += 1;
            continue;
        }
        let Some(timestamp) = field(&fields, columns.timestamp).and_then(parse_ais_timestamp)
        else {
            summary.rejected += 1;
            continue;
        };
        let (Some(lat), Some(lon)) = (
            parse_f64(&fields, columns.lat),
            parse_f64(&fields, columns.lon),
        ) else {
            summary.rejected += 1;
            continue;
        };
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            summary.rejected += 1;
            continue;
        }
        let sog = parse_f64(&fields, columns.sog);
        if sog.is_some_and(|s| s < 0.0) {
            summary.rejected += 1;
            continue;
        }

        let vessel_id = match vessel_cache.get(mmsi) {
            Some(id) => *id,
            None => {
                let id = match store.vessel_by_mmsi(mmsi) {
                    Some(existing) if existing.is_canonical() => existing.vessel_id,
                    Some(_) => {
                        // Frozen identity: absorbed MMSIs accept no new points
                        summary.rejected += 1;
                        continue;
                    }
                    None => store.create_vessel(mmsi),
                };
                vessel_cache.insert(mmsi.to_string(), id);
                id
            }
        };

        if store.point_exists_at(vessel_id, timestamp) {
            summary.duplicates += 1;
            continue;
        }

        let ais_class = field(&fields, columns.ais_class)
            .map(AisClass::parse)
            .unwrap_or_default();
        let nav_status = field(&fields, columns.nav_status)
            .and_then(|v| v.parse::<u8>().ok())
            .filter(|v| *v <= 15);

        store.add_ais_point(
            vessel_id,
            timestamp,
            lat,
            lon,
            sog,
            parse_f64(&fields, columns.cog),
            parse_f64(&fields, columns.heading),
            parse_f64(&fields, columns.draught),
            nav_status,
            ais_class,
        );
        // First reception stamps the identity's first-seen time
        if let Some(vessel) = store.vessel_mut(vessel_id) {
            vessel.mmsi_first_seen = Some(match vessel.mmsi_first_seen {
                Some(existing) => existing.min(timestamp),
                None => timestamp,
            });
            if ais_class != AisClass::Unknown && vessel.ais_class == AisClass::Unknown {
                vessel.ais_class = ais_class;
            }
        }
        summary.accepted += 1;
    }
    store.commit("ais_ingest");

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        duplicates = summary.duplicates,
        "AIS CSV ingest complete"
    );
    summary
}
