//! tzbridge Codec - Wire encoding for both device dialects
//!
//! This crate provides:
//! - Frame building and parsing with explicit byte order and length checks
//! - The datapoint codec translating vendor datapoints to capability values
//! - Named value transforms used by datapoint mappings
//! - Standard cluster command encoding for capability writes

pub mod datapoint;
pub mod frame;
pub mod standard;
pub mod transform;

pub use datapoint::{CodecError, DataPointCodec, Decoded, RawValue};
pub use frame::{
    DpRecord, DpType, FrameError, OutboundFrame, VendorFrame, ZclHeader, VENDOR_CLUSTER,
};
pub use standard::{standard_command, StandardCommand};
pub use transform::{Transform, TransformRegistry};

/// Capabilities that may be added to a device after pairing
pub const CODEC_CAPABILITIES: &[&str] = &[
    "onoff",
    "dim",
    "measure_temperature",
    "measure_humidity",
    "measure_power",
    "measure_current",
    "measure_voltage",
    "measure_battery",
    "measure_luminance",
    "windowcoverings_set",
    "windowcoverings_state",
    "tilt",
    "target_temperature",
    "alarm_motion",
];

/// Capabilities whose values are normalized to `[0, 1]`
pub const PERCENTAGE_CAPABILITIES: &[&str] = &[
    "dim",
    "windowcoverings_set",
    "windowcoverings_tilt_set",
    "tilt",
    "volume_set",
];

/// Whether a capability's value is a normalized percentage
pub fn is_percentage(capability: &str) -> bool {
    PERCENTAGE_CAPABILITIES.contains(&capability)
}

/// Whether a capability may be added dynamically
pub fn is_codec_capability(capability: &str) -> bool {
    CODEC_CAPABILITIES.contains(&capability)
}
