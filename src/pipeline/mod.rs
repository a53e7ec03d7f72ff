//! Pipeline orchestration.
//!
//! A linear sequence of detection and enrichment steps, each gated by a
//! feature flag, executed in a strict order:
//!
//! ```text
//!  1. Gap detection
//!  2. Spoofing detection (incl. stale AIS)
//!  3. STS detection (Phase A/B, then gap-rate baseline + Phase C)
//!  4. Loitering
//!  5. Laid-up classification
//!  6. Track integrity (cross-receiver / handshake / cloning)
//!  7. Compliance (route laundering, P&I cycling, sparse
//!     transmission, type consistency, flag hopping, fake port calls)
//!  8. Fusion enrichment (convoy / fingerprint / voyage / cargo /
//!     weather / relay chains)
//!  9. Merge candidate detection
//! 10. Extended merge pass (fingerprint-aware)
//! 11. Merge chain detection
//! 11b. IMO fraud detection
//! 11d. Post-merge IMO fraud recheck
//! 12. Risk scoring (sequential, ascending gap ID)
//! 13. Confidence classification
//! ```
//!
//! State commits between steps; no step starts until the previous one
//! has committed. Concurrent runs are forbidden via the run lock.

mod context;
mod orchestrator;

pub use context::*;
pub use orchestrator::*;

use thiserror::Error;

/// Pipeline-level errors. Detection steps never raise — only the
/// orchestrator's own preconditions surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline run already in progress: {0}")]
    AlreadyRunning(String),

    #[error("storage failure: {0}")]
    Storage(#[from] crate::storage::StorageError),
}
