//! Vessel identity resolution — detect, score, execute and reverse
//! identity merges.
//!
//! Shadow fleet vessels swap transponder identities between port
//! visits. This module links "went dark" vessel A to "newly appeared"
//! vessel B using speed-feasibility matching, then merges all
//! foreign-key records under a single canonical vessel ID.

mod imo;
mod merge;
mod resolver;

pub use imo::*;
pub use merge::*;
pub use resolver::*;

use thiserror::Error;

/// Identity-subsystem errors.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("circular merge chain detected at vessel_id={0}")]
    CircularChain(i64),

    #[error("merge chain exceeds {max} hops from vessel_id={vessel_id}")]
    ChainTooDeep { vessel_id: i64, max: usize },

    #[error("vessel {0} not found")]
    VesselNotFound(i64),

    #[error("same vessel after canonical resolution")]
    SameVessel,

    #[error("vessel {0} is already absorbed")]
    AlreadyAbsorbed(i64),

    #[error("merge operation {0} not found")]
    OperationNotFound(i64),

    #[error("merge operation {0} already reversed")]
    AlreadyReversed(i64),
}

/// Walk the merge chain to the ultimate canonical vessel.
///
/// Bounded at 20 hops; cycles raise rather than loop (I1).
pub fn resolve_canonical(store: &crate::store::Store, vessel_id: i64) -> Result<i64, MergeError> {
    let max = crate::config::defaults::MAX_MERGE_CHAIN_HOPS;
    let mut seen = std::collections::BTreeSet::new();
    let mut current = vessel_id;
    for _ in 0..max {
        if !seen.insert(current) {
            return Err(MergeError::CircularChain(current));
        }
        match store.vessel(current).and_then(|v| v.merged_into) {
            None => return Ok(current),
            Some(next) => current = next,
        }
    }
    Err(MergeError::ChainTooDeep { vessel_id, max })
}
