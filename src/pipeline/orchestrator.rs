//! The ordered step runner.

use tracing::info;

use super::{PipelineContext, PipelineError, RunReport};
use crate::corridor::CorridorIndex;
use crate::detectors;
use crate::fusion;
use crate::identity;
use crate::scoring;
use crate::storage::{RunLock, StorageError};
use crate::store::Store;

/// Acquire the run lock for `data_dir`, execute the pipeline, and
/// release the lock on return.
///
/// This is the entry point callers should use; `run_pipeline` itself
/// assumes the lock is already held. The lock is stamped with this
/// run's scoring-config hash and reference time so a competing caller
/// sees what it is waiting on.
pub fn run_pipeline_guarded(
    store: &mut Store,
    ctx: &PipelineContext,
    data_dir: &std::path::Path,
) -> Result<RunReport, PipelineError> {
    let _lock = RunLock::acquire(data_dir, &ctx.scoring.hash(), ctx.now).map_err(|e| match e {
        StorageError::RunInProgress { .. } => PipelineError::AlreadyRunning(e.to_string()),
        other => PipelineError::Storage(other),
    })?;
    Ok(run_pipeline(store, ctx))
}

/// Execute the full detection pipeline against the store.
///
/// Step order is strict; each step commits before the next starts.
/// Detection steps are internally idempotent, so an interrupted run can
/// be re-executed without duplicating records. The caller must hold the
/// run lock for the duration — use `run_pipeline_guarded` unless a lock
/// is already in hand.
pub fn run_pipeline(store: &mut Store, ctx: &PipelineContext) -> RunReport {
    let mut report = RunReport::new(ctx.now);
    report.config_hash = ctx.scoring.hash();

    let corridor_list: Vec<crate::types::Corridor> =
        store.corridors().into_iter().cloned().collect();
    let corridors = CorridorIndex::build(&corridor_list);
    info!(
        corridors = corridors.len(),
        vessels = store.vessel_count(),
        "Pipeline run starting"
    );

    // 1. Gap detection
    report.record(
        "gap_detection",
        detectors::gap::run_gap_detection(store, ctx.settings, &corridors),
    );

    // 2. Spoofing detection (+ gated stale-AIS pass)
    report.record(
        "spoofing_detection",
        detectors::spoofing::run_spoofing_detection(store, ctx.settings, &corridors, ctx.now),
    );
    report.record(
        "stale_ais_detection",
        detectors::spoofing::detect_stale_ais_data(store, ctx.settings, ctx.now),
    );

    // 3. STS detection: Phase A/B, then the gap-rate baseline feeding
    //    Phase C (dark-dark)
    report.record(
        "sts_detection",
        detectors::sts::detect_sts_events(store, ctx.settings, &corridors, ctx.scoring),
    );
    report.record(
        "gap_rate_baseline",
        detectors::dark_sts::compute_gap_rate_baseline(store, ctx.settings, ctx.now),
    );
    report.record(
        "dark_sts_detection",
        detectors::dark_sts::detect_dark_dark_sts(store, ctx.settings, ctx.scoring),
    );

    // 4. Loitering
    report.record(
        "loitering_detection",
        detectors::loitering::run_loitering_detection(store, ctx.settings, &corridors),
    );

    // 5. Laid-up classification
    report.record(
        "laid_up_classification",
        detectors::laid_up::run_laid_up_classification(store, ctx.settings, &corridors, ctx.now),
    );

    // 6. Track integrity: cross-receiver, handshake, cloning
    report.record(
        "track_integrity",
        detectors::track_integrity::run_track_integrity_detection(store, ctx.settings, ctx.now),
    );

    // 7. Compliance detectors
    report.record(
        "route_laundering",
        detectors::compliance::run_route_laundering_detection(store, ctx.settings, ctx.now),
    );
    report.record(
        "pi_cycling",
        detectors::compliance::run_pi_cycling_detection(store, ctx.settings, ctx.now),
    );
    report.record(
        "sparse_transmission",
        detectors::compliance::run_sparse_transmission_detection(store, ctx.settings, ctx.now),
    );
    report.record(
        "type_consistency",
        detectors::compliance::run_type_consistency_detection(store, ctx.settings, ctx.now),
    );
    report.record(
        "flag_hopping",
        detectors::compliance::run_flag_hopping_detection(store, ctx.settings, ctx.now),
    );
    report.record(
        "fake_port_calls",
        detectors::compliance::run_fake_port_call_detection(store, ctx.settings, ctx.now),
    );

    // 8. Fusion enrichment
    report.record(
        "convoy_detection",
        fusion::convoy::detect_convoys(store, ctx.settings),
    );
    report.record(
        "floating_storage",
        fusion::convoy::detect_floating_storage(store, ctx.settings, ctx.now),
    );
    report.record(
        "arctic_routing",
        fusion::convoy::detect_arctic_no_ice_class(store, ctx.settings, ctx.now),
    );
    report.record(
        "fingerprint_extraction",
        fusion::fingerprint::run_fingerprint_extraction(store, ctx.settings),
    );
    report.record(
        "route_templates",
        fusion::voyage::build_route_templates(store, ctx.settings),
    );
    report.record(
        "route_deviations",
        fusion::voyage::detect_route_deviations(store, ctx.settings, &corridors, ctx.now),
    );
    report.record(
        "cargo_inference",
        fusion::voyage::infer_cargo_state(store, ctx.settings, ctx.now),
    );
    report.record(
        "weather_enrichment",
        fusion::weather::run_weather_enrichment(store, ctx.settings, ctx.weather),
    );
    report.record(
        "sts_relay_chains",
        fusion::chains::detect_sts_relay_chains(store, ctx.settings, ctx.now),
    );

    // 9. Merge candidate detection
    report.record(
        "merge_candidates",
        identity::detect_merge_candidates(store, ctx.settings, ctx.scoring, ctx.now),
    );

    // 10. Extended merge pass (fingerprint-aware)
    report.record(
        "extended_merge_pass",
        identity::run_extended_merge_pass(store, ctx.settings, ctx.scoring, ctx.now),
    );

    // 11. Merge chain detection
    report.record(
        "merge_chains",
        fusion::chains::detect_merge_chains(store, ctx.settings),
    );

    // 11b. IMO fraud sweep
    report.record(
        "imo_fraud",
        detectors::compliance::run_imo_fraud_detection(store, ctx.now),
    );

    // 11d. Post-merge IMO fraud recheck
    report.record(
        "imo_fraud_merge_recheck",
        identity::recheck_merges_for_imo_fraud(store, ctx.now, ctx.now),
    );

    // 12. Risk scoring — sequential, ascending gap ID
    report.record(
        "risk_scoring",
        scoring::score_all(store, ctx.scoring, ctx.now),
    );

    // 13. Confidence classification
    report.record("confidence_classification", scoring::classify_confidence(store));

    report.finished_at = Some(ctx.now);
    info!(steps = report.steps.len(), "Pipeline run complete");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::scoring::ScoringConfig;
    use crate::types::AisClass;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("valid date")
            + Duration::hours(h)
    }

    #[test]
    fn empty_store_runs_all_steps() {
        let mut store = Store::new();
        let settings = Settings::default();
        let scoring = ScoringConfig::default();
        let ctx = PipelineContext::new(&settings, &scoring, ts(0));
        let report = run_pipeline(&mut store, &ctx);

        assert!(report.finished_at.is_some());
        assert!(!report.config_hash.is_empty());
        // Strict step order preserved in the report
        let names: Vec<&str> = report.steps.iter().map(|s| s.name.as_str()).collect();
        let gap_idx = names.iter().position(|n| *n == "gap_detection").expect("step present");
        let scoring_idx = names.iter().position(|n| *n == "risk_scoring").expect("step present");
        let merge_idx = names.iter().position(|n| *n == "merge_candidates").expect("step present");
        assert!(gap_idx < merge_idx && merge_idx < scoring_idx);
    }

    #[test]
    fn pipeline_scores_detected_gaps() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.deadweight = Some(100_000.0);
            vessel.vessel_type = Some("crude oil tanker".to_string());
        }
        store.add_ais_point(v, ts(0), 55.0, 20.0, Some(10.0), Some(90.0), None, None, None, AisClass::A);
        store.add_ais_point(v, ts(5), 55.4, 20.6, Some(10.0), Some(90.0), None, None, None, AisClass::A);

        let settings = Settings::default();
        let scoring = ScoringConfig::default();
        let ctx = PipelineContext::new(&settings, &scoring, ts(6));
        let report = run_pipeline(&mut store, &ctx);

        assert_eq!(report.count("gap_detection", "gaps_detected"), Some(1));
        assert_eq!(report.count("risk_scoring", "scored"), Some(1));
        let gap = store.gap(1).expect("gap scored");
        assert!(gap.risk_score > 0);
        assert!(gap.risk_breakdown.is_some());
    }

    #[test]
    fn rerun_detects_nothing_new() {
        let mut store = Store::new();
        let v = store.create_vessel("211000001");
        if let Some(vessel) = store.vessel_mut(v) {
            vessel.deadweight = Some(100_000.0);
            vessel.vessel_type = Some("crude oil tanker".to_string());
        }
        store.add_ais_point(v, ts(0), 55.0, 20.0, Some(10.0), Some(90.0), None, None, None, AisClass::A);
        store.add_ais_point(v, ts(5), 55.4, 20.6, Some(10.0), Some(90.0), None, None, None, AisClass::A);

        let settings = Settings::default();
        let scoring = ScoringConfig::default();
        let ctx = PipelineContext::new(&settings, &scoring, ts(6));
        run_pipeline(&mut store, &ctx);
        let second = run_pipeline(&mut store, &ctx);
        assert_eq!(second.count("gap_detection", "gaps_detected"), Some(0));
        assert_eq!(second.count("spoofing_detection", "anomalies_detected"), Some(0));
    }
}
