//! Geographic zone types — corridors and ports.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{CorridorId, PortId};

/// Corridor classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorridorType {
    StsZone,
    ExportRoute,
    ImportRoute,
    AnchorageHolding,
    DarkZone,
    LegitimateTradeRoute,
}

impl CorridorType {
    /// Parse a loader-supplied type label.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sts_zone" => Some(Self::StsZone),
            "export_route" => Some(Self::ExportRoute),
            "import_route" => Some(Self::ImportRoute),
            "anchorage_holding" => Some(Self::AnchorageHolding),
            "dark_zone" => Some(Self::DarkZone),
            "legitimate_trade_route" => Some(Self::LegitimateTradeRoute),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StsZone => "sts_zone",
            Self::ExportRoute => "export_route",
            Self::ImportRoute => "import_route",
            Self::AnchorageHolding => "anchorage_holding",
            Self::DarkZone => "dark_zone",
            Self::LegitimateTradeRoute => "legitimate_trade_route",
        }
    }
}

/// Named polygonal region used for geo-correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corridor {
    pub corridor_id: CorridorId,
    pub name: String,
    pub corridor_type: CorridorType,
    /// Informational metadata only — scoring multipliers come from the
    /// scoring config, never from this field.
    pub risk_weight: f64,
    pub is_jamming_zone: bool,
    pub description: Option<String>,
    /// WKT polygon.
    pub geometry: String,
    pub tags: BTreeSet<String>,
}

impl Corridor {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Fixed port location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub port_id: PortId,
    pub name: String,
    pub country: Option<String>,
    /// WKT `POINT(lon lat)`.
    pub geometry: String,
    pub major_port: bool,
    pub is_russian_oil_terminal: bool,
    pub is_eu: bool,
}
