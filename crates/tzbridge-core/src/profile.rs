//! Device profiles produced by the classifier

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Category assigned to profiles no type entry matched
pub const UNCATEGORIZED: &str = "uncategorized";

/// Broad device family inferred from identification tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Cover,
    Thermostat,
    Plug,
    Dimmer,
    Light,
    Switch,
    Motion,
    Contact,
    Climate,
    WaterLeak,
    Smoke,
    Remote,
    Unknown,
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cover => "cover",
            Self::Thermostat => "thermostat",
            Self::Plug => "plug",
            Self::Dimmer => "dimmer",
            Self::Light => "light",
            Self::Switch => "switch",
            Self::Motion => "motion",
            Self::Contact => "contact",
            Self::Climate => "climate",
            Self::WaterLeak => "water_leak",
            Self::Smoke => "smoke",
            Self::Remote => "remote",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How a datapoint's raw payload is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Enum,
    Integer,
    Raw,
}

fn default_divisor() -> f64 {
    1.0
}

fn is_unit_divisor(divisor: &f64) -> bool {
    *divisor == 1.0
}

/// Maps one vendor datapoint to a capability.
///
/// `dp_id` is unique within a single profile's table only. The same number
/// means different things across unrelated device families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointMapping {
    pub dp_id: u8,
    /// Target capability; `None` marks a configuration-only slot
    #[serde(default)]
    pub capability: Option<String>,
    pub value_kind: ValueKind,
    /// Wire value is divided by this on decode and multiplied on encode
    #[serde(default = "default_divisor", skip_serializing_if = "is_unit_divisor")]
    pub divisor: f64,
    /// Name of a registered transform applied after scaling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_range: Option<[f64; 2]>,
}

impl DataPointMapping {
    pub fn new(dp_id: u8, capability: Option<&str>, value_kind: ValueKind) -> Self {
        Self {
            dp_id,
            capability: capability.map(str::to_string),
            value_kind,
            divisor: 1.0,
            transform: None,
            valid_range: None,
        }
    }

    pub fn with_divisor(mut self, divisor: f64) -> Self {
        self.divisor = divisor;
        self
    }

    pub fn with_transform(mut self, transform: &str) -> Self {
        self.transform = Some(transform.to_string());
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.valid_range = Some([min, max]);
        self
    }

    /// Declared range as `(min, max)`, if it is finite and ordered
    pub fn range(&self) -> Option<(f64, f64)> {
        match self.valid_range {
            Some([min, max]) if min.is_finite() && max.is_finite() && min <= max => {
                Some((min, max))
            }
            _ => None,
        }
    }
}

/// Structured classification result for one descriptor.
///
/// Profiles are derived data. A reclassification produces a new profile that
/// replaces the old one; profiles are never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub device_type: DeviceType,
    pub category: String,
    pub capabilities: BTreeSet<String>,
    pub clusters: BTreeSet<u16>,
    pub dp_table: Vec<DataPointMapping>,
    /// Heuristic evidence score in 0..=100
    pub confidence: u8,
    /// Catalog profile selected for this device, if any
    #[serde(default)]
    pub profile_name: Option<String>,
}

impl DeviceProfile {
    /// Find the mapping for a datapoint id in this profile's table
    pub fn mapping(&self, dp_id: u8) -> Option<&DataPointMapping> {
        self.dp_table.iter().find(|m| m.dp_id == dp_id)
    }

    /// First mapping in table order that targets `capability`
    pub fn mapping_for_capability(&self, capability: &str) -> Option<&DataPointMapping> {
        self.dp_table
            .iter()
            .find(|m| m.capability.as_deref() == Some(capability))
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_unknown(&self) -> bool {
        self.device_type == DeviceType::Unknown
    }

    /// Serialize for manifest tooling
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
