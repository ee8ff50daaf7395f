//! Device events and diagnostics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tzbridge_core::{CapabilityValue, DeviceType};

use crate::instance::InstanceId;

/// A capability took a new value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityChange {
    pub capability: String,
    pub value: CapabilityValue,
    pub at: DateTime<Utc>,
}

impl CapabilityChange {
    pub fn now(capability: &str, value: CapabilityValue) -> Self {
        Self {
            capability: capability.to_string(),
            value,
            at: Utc::now(),
        }
    }
}

/// Device event for state collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// Capability value changed, either reported or written
    CapabilityChanged {
        instance: InstanceId,
        change: CapabilityChange,
    },
    /// Capability added after pairing
    CapabilityAdded {
        instance: InstanceId,
        capability: String,
    },
    /// A new profile replaced the old one
    Reclassified {
        instance: InstanceId,
        device_type: DeviceType,
        profile_name: Option<String>,
    },
}

/// Per-instance counters for things that were dropped or adjusted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Datapoints decoded into a capability value
    pub decoded: u64,
    /// Datapoints with no capability mapped
    pub mapping_miss: u64,
    /// Records or frames that could not be parsed
    pub malformed: u64,
    /// Decoded values clamped into their valid range
    pub clamped: u64,
    /// Writes with no listener or no encoding
    pub dropped_writes: u64,
}
