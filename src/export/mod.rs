//! Analyst-facing output projections.
//!
//! Alert rows, evidence cards and corridor overlays. All projections
//! are read-only over the store; evidence card creation is the one
//! write (cards persist for provenance tracking across merges).

mod alerts;
mod evidence;
mod geojson;

pub use alerts::*;
pub use evidence::*;
pub use geojson::*;
