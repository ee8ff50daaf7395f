//! tzbridge Device - Paired device instances
//!
//! This crate provides:
//! - The capability state manager with allow-list gated growth
//! - Device instances binding profile, dialect and codec together
//! - Inbound datapoint handling and outbound write dispatch
//! - Capability change events and per-instance diagnostics

pub mod capabilities;
pub mod events;
pub mod instance;

pub use capabilities::CapabilityStateManager;
pub use events::{CapabilityChange, DeviceEvent, Diagnostics};
pub use instance::{DeviceInstance, DispatchError, InstanceId, InstanceSnapshot};
