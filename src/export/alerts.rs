//! Alert list projection.
//!
//! One row per gap event, enriched with vessel identity and corridor
//! context — the shape the dashboard table and CSV export consume.

use serde::Serialize;

use crate::scoring::score_band;
use crate::store::Store;

/// One exported alert row.
#[derive(Debug, Clone, Serialize)]
pub struct AlertRow {
    pub gap_event_id: i64,
    pub vessel_mmsi: String,
    pub vessel_name: Option<String>,
    pub flag: Option<String>,
    pub dwt: Option<f64>,
    pub gap_start_utc: String,
    pub gap_end_utc: String,
    /// Two-decimal hours.
    pub duration_hours: f64,
    pub corridor_name: Option<String>,
    pub in_dark_zone: bool,
    pub risk_score: i32,
    pub risk_band: &'static str,
    pub status: crate::types::GapStatus,
}

/// Project all gap events into alert rows, highest score first; ties
/// break on ascending gap ID for stable output.
pub fn export_alerts(store: &Store) -> Vec<AlertRow> {
    let mut rows: Vec<AlertRow> = store
        .gap_ids()
        .iter()
        .filter_map(|id| {
            let gap = store.gap(*id)?;
            let vessel = store.vessel(gap.vessel_id);
            Some(AlertRow {
                gap_event_id: gap.gap_event_id,
                vessel_mmsi: vessel.map(|v| v.mmsi.clone()).unwrap_or_default(),
                vessel_name: vessel.and_then(|v| v.name.clone()),
                flag: vessel.and_then(|v| v.flag.clone()),
                dwt: vessel.and_then(|v| v.deadweight),
                gap_start_utc: gap.gap_start.to_rfc3339(),
                gap_end_utc: gap.gap_end.to_rfc3339(),
                duration_hours: (gap.duration_hours() * 100.0).round() / 100.0,
                corridor_name: gap
                    .corridor_id
                    .and_then(|cid| store.corridor(cid))
                    .map(|c| c.name.clone()),
                in_dark_zone: gap.in_dark_zone,
                risk_score: gap.risk_score,
                risk_band: score_band(gap.risk_score),
                status: gap.status,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then(a.gap_event_id.cmp(&b.gap_event_id))
    });
    rows
}

/// Serialize alert rows as a JSON array.
pub fn alerts_json(store: &Store) -> serde_json::Value {
    serde_json::to_value(export_alerts(store)).unwrap_or_default()
}

/// Render alert rows as CSV (header + one line per alert). Names are
/// quoted; embedded quotes double per RFC 4180.
pub fn alerts_csv(store: &Store) -> String {
    let quote = |value: &str| format!("\"{}\"", value.replace('"', "\"\""));
    let mut out = String::from(
        "gap_event_id,vessel_mmsi,vessel_name,flag,dwt,gap_start_utc,gap_end_utc,\
         duration_hours,corridor_name,in_dark_zone,risk_score,risk_band,status\n",
    );
    for row in export_alerts(store) {
        let status = serde_json::to_value(row.status)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{:.2},{},{},{},{},{}\n",
            row.gap_event_id,
            row.vessel_mmsi,
            quote(row.vessel_name.as_deref().unwrap_or("")),
            row.flag.as_deref().unwrap_or(""),
            row.dwt.map(|d| format!("{d:.0}")).unwrap_or_default(),
            row.gap_start_utc,
            row.gap_end_utc,
            row.duration_hours,
            quote(row.corridor_name.as_deref().unwrap_or("")),
            row.in_dark_zone,
            row.risk_score,
            row.risk_band,
            status,
        ));
    }
    out
}
