//! Evidence card generation.
//!
//! An evidence card bundles everything an analyst needs to assess one
//! gap alert: vessel summary, gap detail, movement envelope (confidence
//! ellipse as GeoJSON), linked anomalies, watchlist matches, satellite
//! recommendation and the scoring breakdown. Cards persist in the store
//! so merges can annotate them with identity provenance.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::scoring::score_band;
use crate::store::Store;
use crate::types::EvidenceCard;

/// Build (and persist) the evidence card for a gap event.
///
/// Returns the card ID, or None when the gap does not exist.
pub fn build_evidence_card(store: &mut Store, gap_event_id: i64, now: DateTime<Utc>) -> Option<i64> {
    let payload = evidence_payload(store, gap_event_id)?;
    let card_id = store.add_evidence_card(EvidenceCard {
        card_id: 0,
        gap_event_id,
        original_vessel_id: None,
        original_mmsi: None,
        payload,
        created_at: now,
    });
    store.commit("evidence_card");
    Some(card_id)
}

/// Assemble the JSON payload for a gap's evidence card.
pub fn evidence_payload(store: &Store, gap_event_id: i64) -> Option<Value> {
    let gap = store.gap(gap_event_id)?;
    let vessel = store.vessel(gap.vessel_id);

    let envelope = store.envelope_for_gap(gap_event_id).map(|e| {
        json!({
            "method": e.method,
            "semi_major_nm": e.semi_major_nm,
            "semi_minor_nm": e.semi_minor_nm,
            "heading_degrees": e.heading_degrees,
            "confidence_ellipse": e.confidence_ellipse.as_deref().map(wkt_polygon_to_geojson),
        })
    });

    let anomalies: Vec<Value> = store
        .anomalies_for_vessel(gap.vessel_id)
        .iter()
        .filter(|a| a.gap_event_id == Some(gap_event_id))
        .map(|a| {
            json!({
                "type": a.anomaly_type,
                "start_time_utc": a.start_time,
                "end_time_utc": a.end_time,
                "risk_score_component": a.risk_score_component,
                "evidence": a.evidence,
            })
        })
        .collect();

    let watchlist: Vec<Value> = store
        .watchlist_for_vessel(gap.vessel_id)
        .iter()
        .filter(|w| w.is_active)
        .map(|w| {
            json!({
                "source": w.source,
                "reason": w.reason,
                "match_type": w.match_type,
                "match_confidence": w.match_confidence,
            })
        })
        .collect();

    let satellite: Vec<Value> = store
        .satellite_candidates()
        .iter()
        .filter(|c| c.vessel_1_id == gap.vessel_id || c.vessel_2_id == gap.vessel_id)
        .map(|c| {
            json!({
                "window_start_utc": c.window_start,
                "window_end_utc": c.window_end,
                "confidence_level": c.confidence_level,
                "mean_lat": c.mean_lat,
                "mean_lon": c.mean_lon,
            })
        })
        .collect();

    Some(json!({
        "gap_event_id": gap.gap_event_id,
        "vessel": vessel.map(|v| json!({
            "mmsi": v.mmsi,
            "imo": v.imo,
            "name": v.name,
            "flag": v.flag,
            "vessel_type": v.vessel_type,
            "deadweight": v.deadweight,
            "year_built": v.year_built,
            "flag_risk": v.flag_risk,
        })),
        "gap": {
            "gap_start_utc": gap.gap_start,
            "gap_end_utc": gap.gap_end,
            "duration_minutes": gap.duration_minutes,
            "impossible_speed_flag": gap.impossible_speed_flag,
            "velocity_plausibility_ratio": gap.velocity_plausibility_ratio,
            "corridor": gap.corridor_id.and_then(|id| store.corridor(id)).map(|c| &c.name),
            "in_dark_zone": gap.in_dark_zone,
        },
        "movement_envelope": envelope,
        "linked_anomalies": anomalies,
        "watchlist_matches": watchlist,
        "satellite_recommendations": satellite,
        "risk_score": gap.risk_score,
        "risk_band": score_band(gap.risk_score),
        "risk_breakdown": gap.risk_breakdown.as_ref().map(crate::scoring::ScoreBreakdown::to_map),
    }))
}

/// Render the evidence card as analyst-readable Markdown.
pub fn evidence_markdown(store: &Store, gap_event_id: i64) -> Option<String> {
    let gap = store.gap(gap_event_id)?;
    let vessel = store.vessel(gap.vessel_id);
    let mut out = String::new();

    let title = vessel
        .and_then(|v| v.name.clone())
        .unwrap_or_else(|| format!("vessel {}", gap.vessel_id));
    out.push_str(&format!("# Evidence card — {title}\n\n"));

    if let Some(v) = vessel {
        out.push_str("## Vessel\n\n");
        out.push_str(&format!("- MMSI: {}\n", v.mmsi));
        if let Some(imo) = &v.imo {
            out.push_str(&format!("- IMO: {imo}\n"));
        }
        if let Some(flag) = &v.flag {
            out.push_str(&format!("- Flag: {flag}\n"));
        }
        if let Some(dwt) = v.deadweight {
            out.push_str(&format!("- Deadweight: {dwt:.0} t\n"));
        }
        if let Some(year) = v.year_built {
            out.push_str(&format!("- Year built: {year}\n"));
        }
        out.push('\n');
    }

    out.push_str("## Gap\n\n");
    out.push_str(&format!(
        "- Silence: {} → {} ({:.1} h)\n",
        gap.gap_start.to_rfc3339(),
        gap.gap_end.to_rfc3339(),
        gap.duration_hours()
    ));
    if let Some(corridor) = gap.corridor_id.and_then(|id| store.corridor(id)) {
        out.push_str(&format!("- Corridor: {}\n", corridor.name));
    }
    if gap.impossible_speed_flag {
        out.push_str(&format!(
            "- Impossible reappearance: {:.0} NM against a {:.0} NM envelope\n",
            gap.actual_gap_distance_nm, gap.max_plausible_distance_nm
        ));
    }
    out.push_str(&format!(
        "- Risk score: **{}** ({})\n\n",
        gap.risk_score,
        score_band(gap.risk_score)
    ));

    if let Some(breakdown) = &gap.risk_breakdown {
        out.push_str("## Scoring breakdown\n\n");
        for (kind, points) in breakdown.entries() {
            out.push_str(&format!("- `{}`: {points:+}\n", kind.key()));
        }
        if let Some(meta) = &breakdown.meta {
            out.push_str(&format!(
                "\nCorridor ×{:.2} ({}), size ×{:.2} ({}) → final {}\n",
                meta.corridor_multiplier,
                meta.corridor_type,
                meta.vessel_size_multiplier,
                meta.vessel_size_class,
                meta.final_score
            ));
        }
        out.push('\n');
    }

    let linked: Vec<_> = store
        .anomalies_for_vessel(gap.vessel_id)
        .into_iter()
        .filter(|a| a.gap_event_id == Some(gap_event_id))
        .collect();
    if !linked.is_empty() {
        out.push_str("## Linked anomalies\n\n");
        for anomaly in linked {
            out.push_str(&format!(
                "- {} ({} → {}), component {}\n",
                anomaly.anomaly_type.as_str(),
                anomaly.start_time.to_rfc3339(),
                anomaly.end_time.to_rfc3339(),
                anomaly.risk_score_component
            ));
        }
        out.push('\n');
    }

    Some(out)
}

/// Convert a WKT POLYGON ring into a GeoJSON Polygon geometry.
fn wkt_polygon_to_geojson(wkt: &str) -> Value {
    let ring: Vec<Value> = crate::geo::parse_wkt_bbox(wkt)
        .map(|_| {
            // Re-parse the raw pairs to preserve the actual ring shape
            let re = regex::Regex::new(r"(-?\d+(?:\.\d+)?)\s+(-?\d+(?:\.\d+)?)");
            #[allow(clippy::expect_used)]
            let re = re.expect("static regex is valid");
            re.captures_iter(wkt)
                .filter_map(|cap| {
                    let lon: f64 = cap[1].parse().ok()?;
                    let lat: f64 = cap[2].parse().ok()?;
                    Some(json!([lon, lat]))
                })
                .collect()
        })
        .unwrap_or_default();
    json!({
        "type": "Polygon",
        "coordinates": [ring],
    })
}
