//! Detection fusion — derived signals over the core detection output.
//!
//! Feature-gated passes that read gap/STS/merge records and emit
//! chain, convoy, fingerprint, voyage and weather enrichment consumed
//! by the scoring engine as additional breakdown keys.

pub mod chains;
pub mod convoy;
pub mod fingerprint;
pub mod voyage;
pub mod weather;
