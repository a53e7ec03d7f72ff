//! In-memory entity store.
//!
//! The detection core operates against this store through narrow,
//! per-entity query methods — detectors never walk raw maps. A SQL
//! backend would implement the same method surface; choosing one is an
//! external concern. Iteration orders are deterministic throughout
//! (BTreeMap keys, explicitly sorted secondary indexes) so that every
//! detection run over identical inputs produces identical output.
//!
//! Commit boundaries are logical: `commit()` marks the points where a
//! transactional backend would flush. The pipeline calls it at the end
//! of every step; merge execution calls it once per operation (or defers
//! to the caller via its `commit` flag).

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::types::*;

/// Monotonic ID allocators, one per entity kind.
#[derive(Debug, Default)]
struct IdCounters {
    vessel: i64,
    ais_point: i64,
    gap_event: i64,
    envelope: i64,
    anomaly: i64,
    sts: i64,
    loiter: i64,
    candidate: i64,
    merge_op: i64,
    history: i64,
    watchlist: i64,
    port_call: i64,
    owner: i64,
    port: i64,
    corridor: i64,
    detection: i64,
    satellite: i64,
    convoy: i64,
    alert: i64,
    chain: i64,
    template: i64,
    audit: i64,
    card: i64,
}

impl IdCounters {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

/// The in-memory store. See module docs.
#[derive(Debug, Default)]
pub struct Store {
    ids: IdCounters,

    vessels: BTreeMap<i64, Vessel>,
    mmsi_index: BTreeMap<String, i64>,

    ais_points: BTreeMap<i64, AisPoint>,
    /// vessel_id → point IDs sorted by (timestamp, point_id).
    points_by_vessel: BTreeMap<i64, Vec<i64>>,

    gap_events: BTreeMap<i64, GapEvent>,
    envelopes: BTreeMap<i64, MovementEnvelope>,
    anomalies: BTreeMap<i64, SpoofingAnomaly>,
    sts_events: BTreeMap<i64, StsTransferEvent>,
    loitering: BTreeMap<i64, LoiteringEvent>,
    merge_candidates: BTreeMap<i64, MergeCandidate>,
    merge_operations: BTreeMap<i64, MergeOperation>,
    vessel_history: BTreeMap<i64, VesselHistory>,
    watchlist: BTreeMap<i64, WatchlistEntry>,
    port_calls: BTreeMap<i64, PortCall>,
    vessel_owners: BTreeMap<i64, VesselOwner>,
    ports: BTreeMap<i64, Port>,
    corridors: BTreeMap<i64, Corridor>,
    dark_detections: BTreeMap<i64, DarkVesselDetection>,
    satellite_candidates: BTreeMap<i64, SatelliteTaskingCandidate>,
    convoys: BTreeMap<i64, ConvoyEvent>,
    fleet_alerts: BTreeMap<i64, FleetAlert>,
    merge_chains: BTreeMap<i64, MergeChain>,
    route_templates: BTreeMap<i64, RouteTemplate>,
    gap_rate_baselines: BTreeMap<i64, GapRateBaseline>,
    evidence_cards: BTreeMap<i64, EvidenceCard>,
    audit_log: Vec<AuditRecord>,

    /// Wind speed (kn) observed at each gap's pre-gap position, written
    /// by the weather enrichment step, consumed by scoring.
    weather_wind_by_gap: BTreeMap<i64, f64>,

    commits: u64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a transactional boundary.
    pub fn commit(&mut self, label: &str) {
        self.commits += 1;
        debug!(label, commits = self.commits, "store commit boundary");
    }

    pub fn commit_count(&self) -> u64 {
        self.commits
    }
}

// ============================================================================
// Vessels
// ============================================================================

impl Store {
    /// Create a vessel under a new ID for the given MMSI.
    pub fn create_vessel(&mut self, mmsi: &str) -> i64 {
        let id = IdCounters::next(&mut self.ids.vessel);
        let vessel = Vessel::new(id, mmsi);
        self.mmsi_index.insert(mmsi.to_string(), id);
        self.vessels.insert(id, vessel);
        id
    }

    /// Insert a fully-formed vessel (test fixtures, imports). The ID
    /// counter advances past the inserted ID.
    pub fn add_vessel(&mut self, vessel: Vessel) {
        self.ids.vessel = self.ids.vessel.max(vessel.vessel_id);
        self.mmsi_index.insert(vessel.mmsi.clone(), vessel.vessel_id);
        self.vessels.insert(vessel.vessel_id, vessel);
    }

    pub fn vessel(&self, id: i64) -> Option<&Vessel> {
        self.vessels.get(&id)
    }

    pub fn vessel_mut(&mut self, id: i64) -> Option<&mut Vessel> {
        self.vessels.get_mut(&id)
    }

    /// Latest vessel registered under an MMSI.
    pub fn vessel_by_mmsi(&self, mmsi: &str) -> Option<&Vessel> {
        self.mmsi_index.get(mmsi).and_then(|id| self.vessels.get(id))
    }

    /// All vessel IDs in ascending order.
    pub fn vessel_ids(&self) -> Vec<i64> {
        self.vessels.keys().copied().collect()
    }

    /// IDs of canonical (non-absorbed) vessels, ascending.
    pub fn canonical_vessel_ids(&self) -> Vec<i64> {
        self.vessels
            .values()
            .filter(|v| v.is_canonical())
            .map(|v| v.vessel_id)
            .collect()
    }

    pub fn vessel_count(&self) -> usize {
        self.vessels.len()
    }
}

// ============================================================================
// AIS points
// ============================================================================

impl Store {
    /// Ingest a position report. Maintains the per-vessel time index.
    #[allow(clippy::too_many_arguments)]
    pub fn add_ais_point(
        &mut self,
        vessel_id: i64,
        timestamp: DateTime<Utc>,
        lat: f64,
        lon: f64,
        sog: Option<f64>,
        cog: Option<f64>,
        heading: Option<f64>,
        draught: Option<f64>,
        nav_status: Option<u8>,
        ais_class: AisClass,
    ) -> i64 {
        let id = IdCounters::next(&mut self.ids.ais_point);
        let point = AisPoint {
            point_id: id,
            vessel_id,
            timestamp,
            lat,
            lon,
            sog,
            cog,
            heading,
            draught,
            nav_status,
            ais_class,
        };
        self.index_point(&point);
        self.ais_points.insert(id, point);
        id
    }

    fn index_point(&mut self, point: &AisPoint) {
        let idx = self.points_by_vessel.entry(point.vessel_id).or_default();
        // Usually appended in time order; binary search covers backfills.
        let pos = idx
            .binary_search_by(|pid| {
                #[allow(clippy::expect_used)]
                let existing = self.ais_points.get(pid).expect("index points to live point");
                (existing.timestamp, existing.point_id).cmp(&(point.timestamp, point.point_id))
            })
            .unwrap_or_else(|e| e);
        idx.insert(pos, point.point_id);
    }

    pub fn ais_point(&self, id: i64) -> Option<&AisPoint> {
        self.ais_points.get(&id)
    }

    /// All points for a vessel in ascending timestamp order.
    pub fn points_for_vessel(&self, vessel_id: i64) -> Vec<&AisPoint> {
        self.points_by_vessel
            .get(&vessel_id)
            .map(|ids| ids.iter().filter_map(|id| self.ais_points.get(id)).collect())
            .unwrap_or_default()
    }

    /// Points for a vessel inside [from, to], ascending.
    pub fn points_for_vessel_between(
        &self,
        vessel_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<&AisPoint> {
        self.points_for_vessel(vessel_id)
            .into_iter()
            .filter(|p| p.timestamp >= from && p.timestamp <= to)
            .collect()
    }

    pub fn first_point_for_vessel(&self, vessel_id: i64) -> Option<&AisPoint> {
        self.points_by_vessel
            .get(&vessel_id)
            .and_then(|ids| ids.first())
            .and_then(|id| self.ais_points.get(id))
    }

    pub fn last_point_for_vessel(&self, vessel_id: i64) -> Option<&AisPoint> {
        self.points_by_vessel
            .get(&vessel_id)
            .and_then(|ids| ids.last())
            .and_then(|id| self.ais_points.get(id))
    }

    /// Count of points for a vessel strictly after a timestamp.
    pub fn count_points_after(&self, vessel_id: i64, after: DateTime<Utc>) -> usize {
        self.points_for_vessel(vessel_id)
            .iter()
            .filter(|p| p.timestamp > after)
            .count()
    }

    /// True when any point for the vessel is not Class A.
    pub fn has_non_class_a_point(&self, vessel_id: i64) -> bool {
        self.points_for_vessel(vessel_id)
            .iter()
            .any(|p| p.ais_class != AisClass::A)
    }

    /// True when the vessel has at least one point.
    pub fn has_points(&self, vessel_id: i64) -> bool {
        self.points_by_vessel
            .get(&vessel_id)
            .is_some_and(|ids| !ids.is_empty())
    }

    /// Duplicate guard for ingest: any point at exactly this timestamp.
    pub fn point_exists_at(&self, vessel_id: i64, timestamp: DateTime<Utc>) -> bool {
        self.points_for_vessel(vessel_id)
            .iter()
            .any(|p| p.timestamp == timestamp)
    }

    /// Count distinct vessels transmitting inside a degree-box around a
    /// position within ±`hours` of `ts` (anchorage-density filter).
    pub fn count_vessels_near(
        &self,
        lat: f64,
        lon: f64,
        ts: DateTime<Utc>,
        radius_nm: f64,
        hours: i64,
    ) -> usize {
        let deg = radius_nm / 60.0;
        let from = ts - Duration::hours(hours);
        let to = ts + Duration::hours(hours);
        let mut seen: BTreeSet<i64> = BTreeSet::new();
        for point in self.ais_points.values() {
            if point.timestamp < from || point.timestamp > to {
                continue;
            }
            if (point.lat - lat).abs() <= deg && (point.lon - lon).abs() <= deg {
                seen.insert(point.vessel_id);
            }
        }
        seen.len()
    }

    /// Hour-bucket sets for the overlapping-transmission guard.
    pub fn transmission_buckets(&self, vessel_id: i64, granularity_seconds: i64) -> BTreeSet<i64> {
        self.points_for_vessel(vessel_id)
            .iter()
            .map(|p| p.timestamp.timestamp() / granularity_seconds)
            .collect()
    }

    /// Reassign a batch of AIS points (ascending IDs) to a new vessel.
    /// Returns the IDs moved. Used only by merge execution.
    pub fn reassign_ais_points_batch(
        &mut self,
        from_vessel: i64,
        to_vessel: i64,
        batch_size: usize,
    ) -> Vec<i64> {
        let batch: Vec<i64> = self
            .points_by_vessel
            .get(&from_vessel)
            .map(|ids| {
                let mut sorted = ids.clone();
                sorted.sort_unstable();
                sorted.into_iter().take(batch_size).collect()
            })
            .unwrap_or_default();

        for id in &batch {
            if let Some(point) = self.ais_points.get_mut(id) {
                point.vessel_id = to_vessel;
            }
            if let Some(ids) = self.points_by_vessel.get_mut(&from_vessel) {
                ids.retain(|pid| pid != id);
            }
            if let Some(point) = self.ais_points.get(id).cloned() {
                self.index_point(&point);
            }
        }
        batch
    }
}

// ============================================================================
// Gap events & envelopes
// ============================================================================

impl Store {
    pub fn alloc_gap_id(&mut self) -> i64 {
        IdCounters::next(&mut self.ids.gap_event)
    }

    pub fn add_gap(&mut self, gap: GapEvent) {
        self.ids.gap_event = self.ids.gap_event.max(gap.gap_event_id);
        self.gap_events.insert(gap.gap_event_id, gap);
    }

    pub fn gap(&self, id: i64) -> Option<&GapEvent> {
        self.gap_events.get(&id)
    }

    pub fn gap_mut(&mut self, id: i64) -> Option<&mut GapEvent> {
        self.gap_events.get_mut(&id)
    }

    /// All gap IDs ascending — the deterministic scoring order.
    pub fn gap_ids(&self) -> Vec<i64> {
        self.gap_events.keys().copied().collect()
    }

    pub fn gap_count(&self) -> usize {
        self.gap_events.len()
    }

    pub fn gaps_for_vessel(&self, vessel_id: i64) -> Vec<&GapEvent> {
        self.gap_events
            .values()
            .filter(|g| g.vessel_id == vessel_id)
            .collect()
    }

    pub fn gap_ids_for_vessel(&self, vessel_id: i64) -> Vec<i64> {
        self.gap_events
            .values()
            .filter(|g| g.vessel_id == vessel_id)
            .map(|g| g.gap_event_id)
            .collect()
    }

    /// Dedup guard: an existing gap for the vessel whose start lies
    /// within ±`window_minutes` of `start`.
    pub fn gap_exists_near_start(
        &self,
        vessel_id: i64,
        start: DateTime<Utc>,
        window_minutes: i64,
    ) -> bool {
        let window = Duration::minutes(window_minutes);
        self.gap_events.values().any(|g| {
            g.vessel_id == vessel_id
                && g.gap_start >= start - window
                && g.gap_start <= start + window
        })
    }

    /// Count prior gaps in the `days` window before a reference gap,
    /// filtering on `original_vessel_id` when the reference carries one
    /// (provenance-aware — prevents post-merge frequency inflation).
    pub fn count_gaps_in_window(&self, reference: &GapEvent, days: i64) -> usize {
        let window_start = reference.gap_start - Duration::days(days);
        self.gap_events
            .values()
            .filter(|g| g.gap_event_id != reference.gap_event_id)
            .filter(|g| g.gap_start >= window_start && g.gap_start <= reference.gap_start)
            .filter(|g| match reference.original_vessel_id {
                Some(origin) => g.original_vessel_id == Some(origin),
                None => g.vessel_id == reference.vessel_id,
            })
            .count()
    }

    /// Gaps for a vessel overlapping [from, to] (used by STS dark-partner
    /// bonus and anomaly linking).
    pub fn gaps_overlapping(
        &self,
        vessel_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<&GapEvent> {
        self.gap_events
            .values()
            .filter(|g| g.vessel_id == vessel_id && g.gap_start <= to && g.gap_end >= from)
            .collect()
    }

    pub fn add_envelope(&mut self, mut envelope: MovementEnvelope) -> i64 {
        let id = IdCounters::next(&mut self.ids.envelope);
        envelope.envelope_id = id;
        self.envelopes.insert(id, envelope);
        id
    }

    pub fn envelope_for_gap(&self, gap_event_id: i64) -> Option<&MovementEnvelope> {
        self.envelopes
            .values()
            .find(|e| e.gap_event_id == gap_event_id)
    }
}

// ============================================================================
// Spoofing anomalies
// ============================================================================

impl Store {
    pub fn add_anomaly(&mut self, mut anomaly: SpoofingAnomaly) -> i64 {
        let id = IdCounters::next(&mut self.ids.anomaly);
        anomaly.anomaly_id = id;
        self.anomalies.insert(id, anomaly);
        id
    }

    /// Per-typology dedup: same vessel + type + start time.
    pub fn anomaly_exists(
        &self,
        vessel_id: i64,
        anomaly_type: SpoofingType,
        start: DateTime<Utc>,
    ) -> bool {
        self.anomalies.values().any(|a| {
            a.vessel_id == vessel_id && a.anomaly_type == anomaly_type && a.start_time == start
        })
    }

    pub fn anomaly(&self, id: i64) -> Option<&SpoofingAnomaly> {
        self.anomalies.get(&id)
    }

    pub fn anomaly_mut(&mut self, id: i64) -> Option<&mut SpoofingAnomaly> {
        self.anomalies.get_mut(&id)
    }

    pub fn anomaly_ids(&self) -> Vec<i64> {
        self.anomalies.keys().copied().collect()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.len()
    }

    pub fn anomalies_for_vessel(&self, vessel_id: i64) -> Vec<&SpoofingAnomaly> {
        self.anomalies
            .values()
            .filter(|a| a.vessel_id == vessel_id)
            .collect()
    }

    pub fn anomalies_of_type(&self, anomaly_type: SpoofingType) -> Vec<&SpoofingAnomaly> {
        self.anomalies
            .values()
            .filter(|a| a.anomaly_type == anomaly_type)
            .collect()
    }

    /// IDs of anomalies not yet linked to a gap event.
    pub fn unlinked_anomaly_ids(&self) -> Vec<i64> {
        self.anomalies
            .values()
            .filter(|a| a.gap_event_id.is_none())
            .map(|a| a.anomaly_id)
            .collect()
    }

    pub fn clear_anomalies(&mut self) {
        self.anomalies.clear();
    }
}

// ============================================================================
// STS transfer events
// ============================================================================

impl Store {
    pub fn add_sts(&mut self, mut event: StsTransferEvent) -> i64 {
        debug_assert!(
            event.vessel_1_id < event.vessel_2_id,
            "STS canonical ordering violated"
        );
        let id = IdCounters::next(&mut self.ids.sts);
        event.sts_id = id;
        self.sts_events.insert(id, event);
        id
    }

    pub fn sts(&self, id: i64) -> Option<&StsTransferEvent> {
        self.sts_events.get(&id)
    }

    pub fn sts_mut(&mut self, id: i64) -> Option<&mut StsTransferEvent> {
        self.sts_events.get_mut(&id)
    }

    pub fn remove_sts(&mut self, id: i64) -> Option<StsTransferEvent> {
        self.sts_events.remove(&id)
    }

    pub fn sts_ids(&self) -> Vec<i64> {
        self.sts_events.keys().copied().collect()
    }

    pub fn sts_count(&self) -> usize {
        self.sts_events.len()
    }

    pub fn sts_for_vessel(&self, vessel_id: i64) -> Vec<&StsTransferEvent> {
        self.sts_events
            .values()
            .filter(|e| e.vessel_1_id == vessel_id || e.vessel_2_id == vessel_id)
            .collect()
    }

    pub fn sts_ids_involving(&self, vessel_id: i64) -> Vec<i64> {
        self.sts_events
            .values()
            .filter(|e| e.vessel_1_id == vessel_id || e.vessel_2_id == vessel_id)
            .map(|e| e.sts_id)
            .collect()
    }

    /// Overlap dedup: an event for the unordered pair whose time range
    /// intersects [start, end].
    pub fn sts_overlap_exists(
        &self,
        vessel_a: i64,
        vessel_b: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> bool {
        let (v1, v2) = (vessel_a.min(vessel_b), vessel_a.max(vessel_b));
        self.sts_events.values().any(|e| {
            e.vessel_1_id == v1 && e.vessel_2_id == v2 && e.start_time <= end && e.end_time >= start
        })
    }

    /// An event with the same canonical pair and start time, excluding
    /// `except_id` (merge duplicate resolution).
    pub fn sts_duplicate_of(
        &self,
        except_id: i64,
        v1: i64,
        v2: i64,
        start: DateTime<Utc>,
    ) -> Option<i64> {
        let (a, b) = (v1.min(v2), v1.max(v2));
        self.sts_events
            .values()
            .find(|e| {
                e.sts_id != except_id
                    && e.vessel_1_id == a
                    && e.vessel_2_id == b
                    && e.start_time == start
            })
            .map(|e| e.sts_id)
    }

    pub fn clear_sts_events(&mut self) {
        self.sts_events.clear();
    }
}

// ============================================================================
// Loitering events
// ============================================================================

impl Store {
    pub fn add_loiter(&mut self, mut event: LoiteringEvent) -> i64 {
        let id = IdCounters::next(&mut self.ids.loiter);
        event.loiter_id = id;
        self.loitering.insert(id, event);
        id
    }

    pub fn loiter(&self, id: i64) -> Option<&LoiteringEvent> {
        self.loitering.get(&id)
    }

    pub fn loiter_mut(&mut self, id: i64) -> Option<&mut LoiteringEvent> {
        self.loitering.get_mut(&id)
    }

    pub fn loiter_ids(&self) -> Vec<i64> {
        self.loitering.keys().copied().collect()
    }

    pub fn loiters_for_vessel(&self, vessel_id: i64) -> Vec<&LoiteringEvent> {
        self.loitering
            .values()
            .filter(|l| l.vessel_id == vessel_id)
            .collect()
    }

    pub fn loiter_exists(&self, vessel_id: i64, start: DateTime<Utc>) -> bool {
        self.loitering
            .values()
            .any(|l| l.vessel_id == vessel_id && l.start_time == start)
    }

    pub fn clear_loitering(&mut self) {
        self.loitering.clear();
    }
}

// ============================================================================
// Merge candidates, operations, chains
// ============================================================================

impl Store {
    pub fn add_merge_candidate(&mut self, mut candidate: MergeCandidate) -> i64 {
        let id = IdCounters::next(&mut self.ids.candidate);
        candidate.candidate_id = id;
        self.merge_candidates.insert(id, candidate);
        id
    }

    pub fn merge_candidate(&self, id: i64) -> Option<&MergeCandidate> {
        self.merge_candidates.get(&id)
    }

    pub fn merge_candidate_mut(&mut self, id: i64) -> Option<&mut MergeCandidate> {
        self.merge_candidates.get_mut(&id)
    }

    pub fn merge_candidate_ids(&self) -> Vec<i64> {
        self.merge_candidates.keys().copied().collect()
    }

    /// Existing candidate for the unordered pair, regardless of status.
    pub fn merge_candidate_for_pair(&self, a: i64, b: i64) -> Option<&MergeCandidate> {
        let key = (a.min(b), a.max(b));
        self.merge_candidates.values().find(|c| c.pair_key() == key)
    }

    pub fn add_merge_operation(&mut self, mut op: MergeOperation) -> i64 {
        let id = IdCounters::next(&mut self.ids.merge_op);
        op.merge_op_id = id;
        self.merge_operations.insert(id, op);
        id
    }

    pub fn merge_operation(&self, id: i64) -> Option<&MergeOperation> {
        self.merge_operations.get(&id)
    }

    pub fn merge_operation_mut(&mut self, id: i64) -> Option<&mut MergeOperation> {
        self.merge_operations.get_mut(&id)
    }

    pub fn merge_operation_ids(&self) -> Vec<i64> {
        self.merge_operations.keys().copied().collect()
    }

    pub fn add_merge_chain(&mut self, mut chain: MergeChain) -> i64 {
        let id = IdCounters::next(&mut self.ids.chain);
        chain.chain_id = id;
        self.merge_chains.insert(id, chain);
        id
    }

    pub fn merge_chains(&self) -> Vec<&MergeChain> {
        self.merge_chains.values().collect()
    }

    pub fn merge_chain_exists(&self, sorted_vessel_ids: &[i64]) -> bool {
        self.merge_chains
            .values()
            .any(|c| c.vessel_ids == sorted_vessel_ids)
    }

    pub fn chains_containing(&self, vessel_id: i64) -> Vec<&MergeChain> {
        self.merge_chains
            .values()
            .filter(|c| c.vessel_ids.contains(&vessel_id))
            .collect()
    }
}

// ============================================================================
// Vessel history, watchlist, ownership, port calls
// ============================================================================

impl Store {
    pub fn add_history(&mut self, mut entry: VesselHistory) -> i64 {
        let id = IdCounters::next(&mut self.ids.history);
        entry.history_id = id;
        self.vessel_history.insert(id, entry);
        id
    }

    pub fn history_for_vessel(&self, vessel_id: i64) -> Vec<&VesselHistory> {
        self.vessel_history
            .values()
            .filter(|h| h.vessel_id == vessel_id)
            .collect()
    }

    pub fn history_ids_for_vessel(&self, vessel_id: i64) -> Vec<i64> {
        self.vessel_history
            .values()
            .filter(|h| h.vessel_id == vessel_id)
            .map(|h| h.history_id)
            .collect()
    }

    pub fn history_mut(&mut self, id: i64) -> Option<&mut VesselHistory> {
        self.vessel_history.get_mut(&id)
    }

    pub fn history_entry(&self, id: i64) -> Option<&VesselHistory> {
        self.vessel_history.get(&id)
    }

    pub fn remove_history(&mut self, id: i64) -> Option<VesselHistory> {
        self.vessel_history.remove(&id)
    }

    /// Exact-duplicate check for merge history reassignment.
    pub fn history_duplicate_exists(&self, vessel_id: i64, entry: &VesselHistory) -> bool {
        self.vessel_history.values().any(|h| {
            h.vessel_id == vessel_id
                && h.field_changed == entry.field_changed
                && h.old_value == entry.old_value
                && h.new_value == entry.new_value
                && h.observed_at == entry.observed_at
        })
    }

    pub fn add_watchlist_entry(&mut self, mut entry: WatchlistEntry) -> i64 {
        let id = IdCounters::next(&mut self.ids.watchlist);
        entry.entry_id = id;
        self.watchlist.insert(id, entry);
        id
    }

    pub fn watchlist_for_vessel(&self, vessel_id: i64) -> Vec<&WatchlistEntry> {
        self.watchlist
            .values()
            .filter(|w| w.vessel_id == vessel_id)
            .collect()
    }

    pub fn watchlist_entry_ids_for_vessel(&self, vessel_id: i64) -> Vec<i64> {
        self.watchlist
            .values()
            .filter(|w| w.vessel_id == vessel_id)
            .map(|w| w.entry_id)
            .collect()
    }

    pub fn watchlist_entry(&self, id: i64) -> Option<&WatchlistEntry> {
        self.watchlist.get(&id)
    }

    pub fn watchlist_entry_mut(&mut self, id: i64) -> Option<&mut WatchlistEntry> {
        self.watchlist.get_mut(&id)
    }

    pub fn remove_watchlist_entry(&mut self, id: i64) -> Option<WatchlistEntry> {
        self.watchlist.remove(&id)
    }

    /// (vessel, source) uniqueness lookup.
    pub fn watchlist_entry_for(&self, vessel_id: i64, source: &str) -> Option<i64> {
        self.watchlist
            .values()
            .find(|w| w.vessel_id == vessel_id && w.source == source)
            .map(|w| w.entry_id)
    }

    pub fn add_vessel_owner(&mut self, mut owner: VesselOwner) -> i64 {
        let id = IdCounters::next(&mut self.ids.owner);
        owner.owner_id = id;
        self.vessel_owners.insert(id, owner);
        id
    }

    pub fn owner_for_vessel(&self, vessel_id: i64) -> Option<&VesselOwner> {
        self.vessel_owners
            .values()
            .find(|o| o.vessel_id == vessel_id)
    }

    pub fn owner_ids_for_vessel(&self, vessel_id: i64) -> Vec<i64> {
        self.vessel_owners
            .values()
            .filter(|o| o.vessel_id == vessel_id)
            .map(|o| o.owner_id)
            .collect()
    }

    pub fn vessel_owner_mut(&mut self, id: i64) -> Option<&mut VesselOwner> {
        self.vessel_owners.get_mut(&id)
    }

    pub fn add_port_call(&mut self, mut call: PortCall) -> i64 {
        let id = IdCounters::next(&mut self.ids.port_call);
        call.port_call_id = id;
        self.port_calls.insert(id, call);
        id
    }

    pub fn port_calls_for_vessel(&self, vessel_id: i64) -> Vec<&PortCall> {
        let mut calls: Vec<&PortCall> = self
            .port_calls
            .values()
            .filter(|c| c.vessel_id == vessel_id)
            .collect();
        calls.sort_by_key(|c| c.arrival);
        calls
    }

    pub fn port_call_ids_for_vessel(&self, vessel_id: i64) -> Vec<i64> {
        self.port_calls
            .values()
            .filter(|c| c.vessel_id == vessel_id)
            .map(|c| c.port_call_id)
            .collect()
    }

    pub fn port_call_mut(&mut self, id: i64) -> Option<&mut PortCall> {
        self.port_calls.get_mut(&id)
    }
}

// ============================================================================
// Ports & corridors
// ============================================================================

impl Store {
    pub fn add_port(&mut self, mut port: Port) -> i64 {
        let id = IdCounters::next(&mut self.ids.port);
        port.port_id = id;
        self.ports.insert(id, port);
        id
    }

    pub fn port(&self, id: i64) -> Option<&Port> {
        self.ports.get(&id)
    }

    pub fn ports(&self) -> Vec<&Port> {
        self.ports.values().collect()
    }

    pub fn major_ports(&self) -> Vec<&Port> {
        self.ports.values().filter(|p| p.major_port).collect()
    }

    pub fn russian_oil_terminals(&self) -> Vec<&Port> {
        self.ports
            .values()
            .filter(|p| p.is_russian_oil_terminal)
            .collect()
    }

    pub fn add_corridor(&mut self, mut corridor: Corridor) -> i64 {
        let id = IdCounters::next(&mut self.ids.corridor);
        corridor.corridor_id = id;
        self.corridors.insert(id, corridor);
        id
    }

    pub fn corridor(&self, id: i64) -> Option<&Corridor> {
        self.corridors.get(&id)
    }

    pub fn corridors(&self) -> Vec<&Corridor> {
        self.corridors.values().collect()
    }

    pub fn corridor_count(&self) -> usize {
        self.corridors.len()
    }
}

// ============================================================================
// External detections, satellite tasking, fusion records
// ============================================================================

impl Store {
    pub fn add_dark_detection(&mut self, mut detection: DarkVesselDetection) -> i64 {
        let id = IdCounters::next(&mut self.ids.detection);
        detection.detection_id = id;
        self.dark_detections.insert(id, detection);
        id
    }

    pub fn dark_detections(&self) -> Vec<&DarkVesselDetection> {
        self.dark_detections.values().collect()
    }

    pub fn dark_detection_ids_matched_to(&self, vessel_id: i64) -> Vec<i64> {
        self.dark_detections
            .values()
            .filter(|d| d.matched_vessel_id == Some(vessel_id))
            .map(|d| d.detection_id)
            .collect()
    }

    pub fn dark_detection_mut(&mut self, id: i64) -> Option<&mut DarkVesselDetection> {
        self.dark_detections.get_mut(&id)
    }

    pub fn add_satellite_candidate(&mut self, mut candidate: SatelliteTaskingCandidate) -> i64 {
        let id = IdCounters::next(&mut self.ids.satellite);
        candidate.candidate_id = id;
        self.satellite_candidates.insert(id, candidate);
        id
    }

    pub fn satellite_candidates(&self) -> Vec<&SatelliteTaskingCandidate> {
        self.satellite_candidates.values().collect()
    }

    pub fn add_convoy(&mut self, mut convoy: ConvoyEvent) -> i64 {
        debug_assert!(convoy.vessel_1_id < convoy.vessel_2_id);
        let id = IdCounters::next(&mut self.ids.convoy);
        convoy.convoy_id = id;
        self.convoys.insert(id, convoy);
        id
    }

    pub fn convoys_for_vessel(&self, vessel_id: i64) -> Vec<&ConvoyEvent> {
        self.convoys
            .values()
            .filter(|c| c.vessel_1_id == vessel_id || c.vessel_2_id == vessel_id)
            .collect()
    }

    pub fn convoy_exists(&self, v1: i64, v2: i64, start: DateTime<Utc>) -> bool {
        let (a, b) = (v1.min(v2), v1.max(v2));
        self.convoys
            .values()
            .any(|c| c.vessel_1_id == a && c.vessel_2_id == b && c.start_time == start)
    }

    pub fn add_fleet_alert(&mut self, mut alert: FleetAlert) -> i64 {
        let id = IdCounters::next(&mut self.ids.alert);
        alert.alert_id = id;
        self.fleet_alerts.insert(id, alert);
        id
    }

    pub fn fleet_alerts(&self) -> Vec<&FleetAlert> {
        self.fleet_alerts.values().collect()
    }

    pub fn fleet_alerts_for_vessel(&self, vessel_id: i64) -> Vec<&FleetAlert> {
        self.fleet_alerts
            .values()
            .filter(|a| a.vessel_ids.contains(&vessel_id))
            .collect()
    }

    pub fn fleet_alert_exists(&self, alert_type: &str, vessel_ids: &[i64]) -> bool {
        self.fleet_alerts
            .values()
            .any(|a| a.alert_type == alert_type && a.vessel_ids == vessel_ids)
    }

    pub fn add_route_template(&mut self, mut template: RouteTemplate) -> i64 {
        let id = IdCounters::next(&mut self.ids.template);
        template.template_id = id;
        self.route_templates.insert(id, template);
        id
    }

    pub fn route_templates(&self) -> Vec<&RouteTemplate> {
        self.route_templates.values().collect()
    }

    pub fn route_template_mut(&mut self, id: i64) -> Option<&mut RouteTemplate> {
        self.route_templates.get_mut(&id)
    }

    pub fn set_gap_rate_baseline(&mut self, baseline: GapRateBaseline) {
        self.gap_rate_baselines
            .insert(baseline.corridor_id, baseline);
    }

    pub fn gap_rate_baseline(&self, corridor_id: i64) -> Option<&GapRateBaseline> {
        self.gap_rate_baselines.get(&corridor_id)
    }

    pub fn gap_rate_baseline_count(&self) -> usize {
        self.gap_rate_baselines.len()
    }

    pub fn set_gap_weather(&mut self, gap_event_id: i64, wind_kn: f64) {
        self.weather_wind_by_gap.insert(gap_event_id, wind_kn);
    }

    pub fn gap_weather(&self, gap_event_id: i64) -> Option<f64> {
        self.weather_wind_by_gap.get(&gap_event_id).copied()
    }
}

// ============================================================================
// Evidence cards & audit log
// ============================================================================

impl Store {
    pub fn add_evidence_card(&mut self, mut card: EvidenceCard) -> i64 {
        let id = IdCounters::next(&mut self.ids.card);
        card.card_id = id;
        self.evidence_cards.insert(id, card);
        id
    }

    pub fn evidence_card(&self, id: i64) -> Option<&EvidenceCard> {
        self.evidence_cards.get(&id)
    }

    pub fn evidence_card_mut(&mut self, id: i64) -> Option<&mut EvidenceCard> {
        self.evidence_cards.get_mut(&id)
    }

    pub fn evidence_cards_for_gaps(&self, gap_ids: &[i64]) -> Vec<i64> {
        self.evidence_cards
            .values()
            .filter(|c| gap_ids.contains(&c.gap_event_id))
            .map(|c| c.card_id)
            .collect()
    }

    /// Append an audit record. The audit trail is append-only by
    /// construction — there is no removal method.
    pub fn append_audit(&mut self, mut record: AuditRecord) -> i64 {
        let id = IdCounters::next(&mut self.ids.audit);
        record.audit_id = id;
        self.audit_log.push(record);
        id
    }

    pub fn audit_log(&self) -> &[AuditRecord] {
        &self.audit_log
    }
}
