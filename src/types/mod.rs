//! Core entity types.
//!
//! All IDs are `i64`, allocated by the store and unique within their
//! entity kind. All timestamps are UTC (`chrono::DateTime<Utc>`),
//! normalized at ingest.

mod ais;
mod corridor;
mod events;
mod merge;
mod vessel;

pub use ais::*;
pub use corridor::*;
pub use events::*;
pub use merge::*;
pub use vessel::*;

/// Identifier aliases — documentation only, the store enforces kinds.
pub type VesselId = i64;
pub type AisPointId = i64;
pub type GapEventId = i64;
pub type CorridorId = i64;
pub type PortId = i64;
