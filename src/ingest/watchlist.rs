//! Sanctions watchlist loaders.
//!
//! Supported sources:
//!
//!   OFAC SDN CSV   — US Treasury list; headered or headerless official
//!                    format, vessel rows only
//!   KSE CSV        — Kyiv School of Economics shadow-fleet tracker
//!   OpenSanctions  — NDJSON entity stream, `schema == "Vessel"` only
//!   FleetLeaks     — JSON array of vessel objects
//!   Ukraine GUR    — CSV with name/imo/flag columns
//!
//! Matching strategy, in priority order for every loader:
//!   1. MMSI exact match (9-digit string)
//!   2. IMO exact match
//!   3. Fuzzy name match — ≥ 92 % without a flag hint, ≥ 85 % (config)
//!      with a flag pre-filter. Names are normalized via Unicode→ASCII
//!      transliteration, casefold and punctuation strip.
//!
//! Re-importing a source re-activates existing rows instead of
//! duplicating them.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::csv_split;
use crate::config::Settings;
use crate::detectors::StepCounts;
use crate::store::Store;
use crate::types::WatchlistEntry;

/// Fuzzy threshold when no flag pre-filter is available.
const NAME_ONLY_THRESHOLD: u32 = 92;

/// Compact Cyrillic → Latin transliteration for vessel names. Covers
/// the characters the sanctions corpus actually contains; anything else
/// non-ASCII is dropped after the fold.
fn transliterate(ch: char) -> Option<&'static str> {
    Some(match ch {
        'а' | 'А' => "A",
        'б' | 'Б' => "B",
        'в' | 'В' => "V",
        'г' | 'Г' => "G",
        'д' | 'Д' => "D",
        'е' | 'Е' | 'э' | 'Э' => "E",
        'ё' | 'Ё' => "E",
        'ж' | 'Ж' => "ZH",
        'з' | 'З' => "Z",
        'и' | 'И' | 'й' | 'Й' => "I",
        'к' | 'К' => "K",
        'л' | 'Л' => "L",
        'м' | 'М' => "M",
        'н' | 'Н' => "N",
        'о' | 'О' => "O",
        'п' | 'П' => "P",
        'р' | 'Р' => "R",
        'с' | 'С' => "S",
        'т' | 'Т' => "T",
        'у' | 'У' => "U",
        'ф' | 'Ф' => "F",
        'х' | 'Х' => "KH",
        'ц' | 'Ц' => "TS",
        'ч' | 'Ч' => "CH",
        'ш' | 'Ш' => "SH",
        'щ' | 'Щ' => "SHCH",
        'ъ' | 'Ъ' | 'ь' | 'Ь' => "",
        'ы' | 'Ы' => "Y",
        'ю' | 'Ю' => "YU",
        'я' | 'Я' => "YA",
        _ => return None,
    })
}

/// Normalize a vessel name for fuzzy matching: transliterate, uppercase,
/// strip punctuation, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if let Some(mapped) = transliterate(ch) {
            out.push_str(mapped);
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else if ch.is_whitespace() {
            out.push(' ');
        } else if ch.is_alphabetic() {
            // Accented Latin: fold to the base character where trivial
            for folded in ch.to_uppercase() {
                if folded.is_ascii_alphanumeric() {
                    out.push(folded);
                }
            }
        }
        // Punctuation drops entirely
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity ratio in [0, 100] over normalized names.
pub fn name_similarity(a: &str, b: &str) -> u32 {
    (strsim::normalized_levenshtein(&normalize_name(a), &normalize_name(b)) * 100.0).round() as u32
}

/// Resolved match: (vessel_id, match_type, confidence).
type Resolution = (i64, &'static str, i32);

fn is_valid_mmsi(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.len() == 9 && trimmed.bytes().all(|b| b.is_ascii_digit())
}

/// Resolve a watchlist row to a vessel: MMSI, then IMO, then fuzzy name.
pub fn resolve_vessel(
    store: &Store,
    settings: &Settings,
    mmsi: Option<&str>,
    imo: Option<&str>,
    name: Option<&str>,
    flag: Option<&str>,
) -> Option<Resolution> {
    if let Some(mmsi) = mmsi.filter(|m| is_valid_mmsi(m)) {
        if let Some(vessel) = store.vessel_by_mmsi(mmsi.trim()) {
            return Some((vessel.vessel_id, "exact_mmsi", 100));
        }
    }

    if let Some(imo) = imo.map(str::trim).filter(|i| !i.is_empty()) {
        for vessel_id in store.vessel_ids() {
            let Some(vessel) = store.vessel(vessel_id) else { continue };
            if vessel.imo.as_deref() == Some(imo) {
                return Some((vessel_id, "exact_imo", 100));
            }
        }
    }

    let name = name.map(str::trim).filter(|n| !n.is_empty())?;
    // Name-only matches (no MMSI/IMO backup) demand a higher bar
    let threshold = if flag.is_some() {
        settings.ingest.fuzzy_match_threshold
    } else {
        NAME_ONLY_THRESHOLD
    };

    let mut best: Option<(i64, u32)> = None;
    for vessel_id in store.vessel_ids() {
        let Some(vessel) = store.vessel(vessel_id) else { continue };
        if let Some(flag_filter) = flag {
            if !vessel
                .flag
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case(flag_filter.trim()))
            {
                continue;
            }
        }
        let Some(vessel_name) = vessel.name.as_deref() else { continue };
        let score = name_similarity(name, vessel_name);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((vessel_id, score));
        }
    }

    let (vessel_id, score) = best?;
    if score >= threshold {
        if score < 95 {
            warn!(name, score, "Low-confidence watchlist name match");
        }
        Some((vessel_id, "fuzzy_name", score as i32))
    } else {
        None
    }
}

/// Insert or re-activate a watchlist row for a resolved vessel.
fn upsert_entry(
    store: &mut Store,
    vessel_id: i64,
    source: &str,
    reason: Option<String>,
    date_listed: Option<DateTime<Utc>>,
    source_url: Option<String>,
    match_type: &str,
    match_confidence: i32,
) {
    match store.watchlist_entry_for(vessel_id, source) {
        Some(entry_id) => {
            if let Some(entry) = store.watchlist_entry_mut(entry_id) {
                entry.is_active = true;
                entry.match_confidence = match_confidence;
                entry.match_type = match_type.to_string();
            }
        }
        None => {
            store.add_watchlist_entry(WatchlistEntry {
                entry_id: 0,
                vessel_id,
                source: source.to_string(),
                reason,
                date_listed,
                source_url,
                is_active: true,
                match_confidence,
                match_type: match_type.to_string(),
            });
        }
    }
}

/// Official OFAC SDN CSV column order (headerless sdn.csv).
const OFAC_FIELDS: &[&str] = &[
    "ent_num", "SDN_NAME", "SDN_TYPE", "Program", "Title", "Call_Sign", "Vess_type", "Tonnage",
    "GRT", "Vess_flag", "Vess_owner", "REMARKS",
];

/// Load an OFAC SDN CSV. Only `SDN_TYPE == "Vessel"` rows are
/// processed; both the headerless official format and headered exports
/// are accepted.
///
/// Returns `{matched, unmatched, skipped}`.
pub fn load_ofac_sdn(store: &mut Store, settings: &Settings, contents: &str) -> StepCounts {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty()).peekable();
    let has_header = lines
        .peek()
        .is_some_and(|l| l.contains("SDN_TYPE") || l.contains("ent_num"));

    let header: Vec<String> = if has_header {
        lines
            .next()
            .map(|l| csv_split(l).iter().map(|f| f.trim().to_string()).collect())
            .unwrap_or_default()
    } else {
        OFAC_FIELDS.iter().map(|s| (*s).to_string()).collect()
    };
    let col = |name: &str| header.iter().position(|h| h == name);
    let (Some(type_idx), Some(name_idx)) = (col("SDN_TYPE"), col("SDN_NAME")) else {
        warn!("OFAC SDN CSV missing SDN_TYPE/SDN_NAME columns");
        return StepCounts::new();
    };
    let flag_idx = col("Vess_flag");
    let remarks_idx = col("REMARKS");

    let mut matched = 0_i64;
    let mut unmatched = 0_i64;
    let mut skipped = 0_i64;
    for line in lines {
        let fields = csv_split(line);
        let sdn_type = fields.get(type_idx).map(|s| s.trim()).unwrap_or_default();
        if sdn_type != "Vessel" {
            skipped += 1;
            continue;
        }
        let name = fields.get(name_idx).map(|s| s.trim()).unwrap_or_default();
        let flag = flag_idx
            .and_then(|i| fields.get(i))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && *s != "-0-");
        // IMO numbers hide inside REMARKS free text
        let remarks = remarks_idx.and_then(|i| fields.get(i)).cloned().unwrap_or_default();
        let imo = extract_imo(&remarks);

        match resolve_vessel(store, settings, None, imo.as_deref(), Some(name), flag) {
            Some((vessel_id, match_type, confidence)) => {
                upsert_entry(
                    store,
                    vessel_id,
                    "OFAC_SDN",
                    Some(remarks),
                    None,
                    None,
                    match_type,
                    confidence,
                );
                matched += 1;
            }
            None => {
                warn!(name, "OFAC SDN vessel not resolved");
                unmatched += 1;
            }
        }
    }
    store.commit("watchlist.ofac");

    info!(matched, unmatched, skipped, "OFAC SDN load complete");
    summary(matched, unmatched, skipped)
}

/// Pull a 7-digit IMO out of free text ("IMO 9074729").
fn extract_imo(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    let idx = upper.find("IMO")?;
    let digits: String = upper[idx + 3..]
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    (digits.len() == 7).then_some(digits)
}

/// Load a KSE shadow-fleet CSV (`name,imo,mmsi,flag` with header).
///
/// Returns `{matched, unmatched, skipped}`.
pub fn load_kse_list(store: &mut Store, settings: &Settings, contents: &str) -> StepCounts {
    load_simple_csv(store, settings, contents, "KSE_SHADOW")
}

/// Load a Ukraine GUR CSV (same shape as KSE).
///
/// Returns `{matched, unmatched, skipped}`.
pub fn load_gur_list(store: &mut Store, settings: &Settings, contents: &str) -> StepCounts {
    load_simple_csv(store, settings, contents, "UA_GUR")
}

fn load_simple_csv(
    store: &mut Store,
    settings: &Settings,
    contents: &str,
    source: &str,
) -> StepCounts {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return StepCounts::new();
    };
    let header: Vec<String> = csv_split(header_line)
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let col = |names: &[&str]| {
        header
            .iter()
            .position(|h| names.contains(&h.as_str()))
    };
    let name_idx = col(&["name", "vessel_name", "ship_name"]);
    let imo_idx = col(&["imo", "imo_number"]);
    let mmsi_idx = col(&["mmsi"]);
    let flag_idx = col(&["flag", "flag_state"]);

    let mut matched = 0_i64;
    let mut unmatched = 0_i64;
    let skipped = 0_i64;
    for line in lines {
        let fields = csv_split(line);
        let get = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| fields.get(i))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let name = get(name_idx);
        let imo = get(imo_idx);
        let mmsi = get(mmsi_idx);
        let flag = get(flag_idx);

        match resolve_vessel(
            store,
            settings,
            mmsi.as_deref(),
            imo.as_deref(),
            name.as_deref(),
            flag.as_deref(),
        ) {
            Some((vessel_id, match_type, confidence)) => {
                upsert_entry(store, vessel_id, source, None, None, None, match_type, confidence);
                matched += 1;
            }
            None => unmatched += 1,
        }
    }
    store.commit("watchlist.csv");

    info!(source, matched, unmatched, "Watchlist CSV load complete");
    summary(matched, unmatched, skipped)
}

/// Load an OpenSanctions NDJSON stream; only `schema == "Vessel"`
/// entities are considered.
///
/// Returns `{matched, unmatched, skipped}`.
pub fn load_opensanctions(store: &mut Store, settings: &Settings, contents: &str) -> StepCounts {
    let mut matched = 0_i64;
    let mut unmatched = 0_i64;
    let mut skipped = 0_i64;

    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(entity) = serde_json::from_str::<Value>(line) else {
            skipped += 1;
            continue;
        };
        if entity.get("schema").and_then(Value::as_str) != Some("Vessel") {
            skipped += 1;
            continue;
        }
        let props = entity.get("properties").cloned().unwrap_or(Value::Null);
        let first_str = |key: &str| -> Option<String> {
            props
                .get(key)
                .and_then(Value::as_array)
                .and_then(|arr| arr.first())
                .and_then(Value::as_str)
                .map(String::from)
        };
        let name = entity
            .get("caption")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| first_str("name"));
        let imo = first_str("imoNumber");
        let mmsi = first_str("mmsi");
        let flag = first_str("flag");

        match resolve_vessel(
            store,
            settings,
            mmsi.as_deref(),
            imo.as_deref(),
            name.as_deref(),
            flag.as_deref(),
        ) {
            Some((vessel_id, match_type, confidence)) => {
                upsert_entry(
                    store,
                    vessel_id,
                    "OPENSANCTIONS",
                    None,
                    None,
                    entity.get("id").and_then(Value::as_str).map(String::from),
                    match_type,
                    confidence,
                );
                matched += 1;
            }
            None => unmatched += 1,
        }
    }
    store.commit("watchlist.opensanctions");

    info!(matched, unmatched, skipped, "OpenSanctions load complete");
    summary(matched, unmatched, skipped)
}

/// Load a FleetLeaks JSON array of `{name, imo, mmsi, flag}` objects.
///
/// Returns `{matched, unmatched, skipped}`.
pub fn load_fleetleaks(store: &mut Store, settings: &Settings, contents: &str) -> StepCounts {
    let Ok(Value::Array(rows)) = serde_json::from_str::<Value>(contents) else {
        warn!("FleetLeaks payload is not a JSON array");
        return StepCounts::new();
    };
    let mut matched = 0_i64;
    let mut unmatched = 0_i64;
    for row in rows {
        let get = |key: &str| row.get(key).and_then(Value::as_str).map(String::from);
        match resolve_vessel(
            store,
            settings,
            get("mmsi").as_deref(),
            get("imo").as_deref(),
            get("name").as_deref(),
            get("flag").as_deref(),
        ) {
            Some((vessel_id, match_type, confidence)) => {
                upsert_entry(
                    store, vessel_id, "FLEETLEAKS", None, None, None, match_type, confidence,
                );
                matched += 1;
            }
            None => unmatched += 1,
        }
    }
    store.commit("watchlist.fleetleaks");

    info!(matched, unmatched, "FleetLeaks load complete");
    summary(matched, unmatched, 0)
}

fn summary(matched: i64, unmatched: i64, skipped: i64) -> StepCounts {
    let mut counts = StepCounts::new();
    counts.insert("matched".to_string(), matched);
    counts.insert("unmatched".to_string(), unmatched);
    counts.insert("skipped".to_string(), skipped);
    counts
}
