//! A paired device instance
//!
//! Binds one descriptor to its profile, dialect, codec and capability state.
//! Inbound datapoints are decoded and applied; outbound capability writes are
//! encoded for whichever dialect the device speaks.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use tzbridge_codec::frame::{vendor_cmd, FrameReader};
use tzbridge_codec::standard::has_standard_command;
use tzbridge_codec::{
    standard_command, CodecError, DataPointCodec, FrameError, OutboundFrame, RawValue,
    VendorFrame, ZclHeader,
};
use tzbridge_core::dialect::detect_with;
use tzbridge_core::{
    CapabilityValue, Classifier, DeviceDescriptor, DeviceProfile, Dialect, VendorConfig,
};

use crate::capabilities::CapabilityStateManager;
use crate::events::{CapabilityChange, DeviceEvent, Diagnostics};

const EVENT_CAPACITY: usize = 100;

/// Identifier of one device instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a capability write produced no frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("No write listener for capability {0}")]
    NoListener(String),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Serializable view of an instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot<'a> {
    pub id: &'a InstanceId,
    pub dialect: Dialect,
    pub profile: &'a DeviceProfile,
    pub values: Vec<(&'a str, &'a CapabilityValue)>,
    pub diagnostics: Diagnostics,
}

/// One paired device
#[derive(Debug)]
pub struct DeviceInstance {
    id: InstanceId,
    descriptor: DeviceDescriptor,
    profile: DeviceProfile,
    /// Detected once at pairing
    dialect: Dialect,
    codec: DataPointCodec,
    state: CapabilityStateManager,
    /// Capabilities accepting writes in the active dialect
    listeners: BTreeSet<String>,
    zcl_seq: u8,
    dp_seq: u16,
    diagnostics: Diagnostics,
    event_tx: broadcast::Sender<DeviceEvent>,
}

impl DeviceInstance {
    /// Pair a device: classify, detect its dialect and register listeners
    pub fn pair(descriptor: DeviceDescriptor, classifier: &Classifier) -> Self {
        let profile = classifier.classify(&descriptor);
        Self::with_profile(descriptor, profile, &classifier.catalog().vendor)
    }

    /// Build an instance from an already derived profile
    pub fn with_profile(
        descriptor: DeviceDescriptor,
        profile: DeviceProfile,
        vendor: &VendorConfig,
    ) -> Self {
        let dialect = detect_with(vendor, &descriptor);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let mut instance = Self {
            id: InstanceId::new(),
            codec: DataPointCodec::new(&profile),
            descriptor,
            profile,
            dialect,
            state: CapabilityStateManager::new(),
            listeners: BTreeSet::new(),
            zcl_seq: 0,
            dp_seq: 0,
            diagnostics: Diagnostics::default(),
            event_tx,
        };
        instance.state.ensure_profile_capabilities(&instance.profile);
        instance.register_listeners();

        info!(
            instance = %instance.id,
            manufacturer = %instance.descriptor.manufacturer_token,
            model = %instance.descriptor.model_token,
            dialect = %instance.dialect,
            device_type = %instance.profile.device_type,
            confidence = instance.profile.confidence,
            "Device paired"
        );
        instance
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn state(&self) -> &CapabilityStateManager {
        &self.state
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.state.has_capability(capability)
    }

    pub fn capability_value(&self, capability: &str) -> Option<&CapabilityValue> {
        self.state.capability_value(capability)
    }

    /// Whether writes to a capability are accepted in the active dialect
    pub fn listens_to(&self, capability: &str) -> bool {
        self.listeners.contains(capability)
    }

    /// Subscribe to events for this instance
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    /// Replace the profile, e.g. after a catalog update.
    ///
    /// The datapoint table comes from the new profile only; values already
    /// stored are kept.
    pub fn reclassify(&mut self, profile: DeviceProfile) {
        self.codec = DataPointCodec::new(&profile);
        self.profile = profile;
        self.state.begin_session();
        self.state.ensure_profile_capabilities(&self.profile);
        self.register_listeners();

        info!(
            instance = %self.id,
            device_type = %self.profile.device_type,
            profile = ?self.profile.profile_name,
            "Device reclassified"
        );
        self.publish(DeviceEvent::Reclassified {
            instance: self.id.clone(),
            device_type: self.profile.device_type,
            profile_name: self.profile.profile_name.clone(),
        });
    }

    fn register_listeners(&mut self) {
        let listeners: BTreeSet<String> = match self.dialect {
            Dialect::Vendor => self
                .state
                .capabilities()
                .filter(|c| self.codec.mapping_for_capability(c).is_some())
                .map(str::to_string)
                .collect(),
            Dialect::Standard => self
                .state
                .capabilities()
                .filter(|c| has_standard_command(c))
                .map(str::to_string)
                .collect(),
        };
        debug!(
            instance = %self.id,
            dialect = %self.dialect,
            listeners = ?listeners,
            "Registered write listeners"
        );
        self.listeners = listeners;
    }

    /// Apply one inbound datapoint. Returns the change it caused, if any.
    pub fn handle_datapoint(&mut self, dp_id: u8, raw: &RawValue) -> Option<CapabilityChange> {
        let decoded = match self.codec.try_decode(dp_id, raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                match e {
                    CodecError::MappingMiss(_) => self.diagnostics.mapping_miss += 1,
                    CodecError::MalformedFrame { .. } => self.diagnostics.malformed += 1,
                    _ => {}
                }
                debug!(instance = %self.id, dp_id = dp_id, error = %e, "Datapoint ignored");
                return None;
            }
        };

        self.diagnostics.decoded += 1;
        if decoded.unclamped.is_some() {
            self.diagnostics.clamped += 1;
        }
        self.apply(&decoded.capability, decoded.value)
    }

    /// Apply a whole manufacturer cluster frame holding datapoint records
    pub fn handle_vendor_frame(&mut self, bytes: &[u8]) -> Vec<CapabilityChange> {
        let frame = match parse_vendor_frame(bytes) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Vec::new(),
            Err(e) => {
                self.diagnostics.malformed += 1;
                debug!(instance = %self.id, error = %e, "Malformed vendor frame");
                return Vec::new();
            }
        };

        trace!(instance = %self.id, seq = frame.seq, records = frame.records.len(), "Vendor frame");
        frame
            .records
            .iter()
            .filter_map(|r| self.handle_datapoint(r.dp_id, &RawValue::from(r)))
            .collect()
    }

    /// Encode a capability write, dropping it when nothing can carry it.
    ///
    /// On success the local value is updated before the frame is sent.
    pub fn write_capability(
        &mut self,
        capability: &str,
        value: CapabilityValue,
    ) -> Option<OutboundFrame> {
        match self.try_write_capability(capability, value) {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.diagnostics.dropped_writes += 1;
                match e {
                    DispatchError::NoListener(_) => {
                        debug!(
                            instance = %self.id,
                            capability = %capability,
                            "Write dropped, no listener"
                        );
                    }
                    e => {
                        warn!(
                            instance = %self.id,
                            capability = %capability,
                            error = %e,
                            "Write dropped"
                        );
                    }
                }
                None
            }
        }
    }

    /// Encode a capability write, reporting why it was dropped
    pub fn try_write_capability(
        &mut self,
        capability: &str,
        value: CapabilityValue,
    ) -> Result<OutboundFrame, DispatchError> {
        if !self.listens_to(capability) {
            return Err(DispatchError::NoListener(capability.to_string()));
        }

        let frame = match self.dialect {
            Dialect::Vendor => {
                let record = self.codec.encode_record(capability, &value)?;
                let zcl_seq = self.next_zcl_seq();
                let dp_seq = self.next_dp_seq();
                OutboundFrame::vendor(zcl_seq, dp_seq, record)?
            }
            Dialect::Standard => {
                let command = standard_command(capability, &value)?;
                let zcl_seq = self.next_zcl_seq();
                command.to_frame(zcl_seq)?
            }
        };

        debug!(
            instance = %self.id,
            capability = %capability,
            cluster = frame.cluster,
            len = frame.bytes.len(),
            "Capability write encoded"
        );
        self.apply(capability, value);
        Ok(frame)
    }

    fn apply(&mut self, capability: &str, value: CapabilityValue) -> Option<CapabilityChange> {
        let was_present = self.state.has_capability(capability);
        if !self.state.set_capability_value(capability, value) {
            return None;
        }

        if !was_present {
            self.publish(DeviceEvent::CapabilityAdded {
                instance: self.id.clone(),
                capability: capability.to_string(),
            });
            self.register_listeners();
        }

        let stored = self.state.capability_value(capability)?.clone();
        let change = CapabilityChange::now(capability, stored);
        self.publish(DeviceEvent::CapabilityChanged {
            instance: self.id.clone(),
            change: change.clone(),
        });
        Some(change)
    }

    fn publish(&self, event: DeviceEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn next_zcl_seq(&mut self) -> u8 {
        let seq = self.zcl_seq;
        self.zcl_seq = self.zcl_seq.wrapping_add(1);
        seq
    }

    fn next_dp_seq(&mut self) -> u16 {
        let seq = self.dp_seq;
        self.dp_seq = self.dp_seq.wrapping_add(1);
        seq
    }

    pub fn snapshot(&self) -> InstanceSnapshot<'_> {
        InstanceSnapshot {
            id: &self.id,
            dialect: self.dialect,
            profile: &self.profile,
            values: self
                .state
                .capabilities()
                .filter_map(|c| self.state.capability_value(c).map(|v| (c, v)))
                .collect(),
            diagnostics: self.diagnostics,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.snapshot())
    }
}

/// Parse a manufacturer cluster frame. Commands other than data reports and
/// responses carry no datapoints and yield `None`.
fn parse_vendor_frame(bytes: &[u8]) -> Result<Option<VendorFrame>, FrameError> {
    let mut reader = FrameReader::new(bytes);
    let header = ZclHeader::read_from(&mut reader)?;
    match header.command_id {
        vendor_cmd::DATA_RESPONSE | vendor_cmd::DATA_REPORT => {
            Ok(Some(VendorFrame::parse(reader.rest())?))
        }
        other => {
            trace!(command = other, "Vendor frame without datapoints");
            Ok(None)
        }
    }
}
