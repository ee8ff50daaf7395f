//! Datapoint codec - vendor datapoints to capability values and back

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use tzbridge_core::{CapabilityValue, DataPointMapping, DeviceProfile, ValueKind};

use crate::frame::{DpRecord, DpType, FrameError};
use crate::is_percentage;
use crate::transform::TransformRegistry;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("No capability mapped to datapoint {0}")]
    MappingMiss(u8),
    #[error("Malformed datapoint {dp_id}: {reason}")]
    MalformedFrame { dp_id: u8, reason: String },
    #[error("Datapoint {0} produced no value")]
    EmptyValue(u8),
    #[error("Unknown transform: {0}")]
    UnknownTransform(String),
    #[error("No datapoint or command for capability {0}")]
    EncodeTargetMissing(String),
    #[error("Value {value} cannot be written to {capability}")]
    InvalidValue { capability: String, value: String },
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Raw datapoint value as handed over by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(i64),
    Bytes(Vec<u8>),
}

impl From<&DpRecord> for RawValue {
    fn from(record: &DpRecord) -> Self {
        Self::Bytes(record.data.clone())
    }
}

/// A decoded capability value
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub capability: String,
    pub value: CapabilityValue,
    /// Reading before it was clamped into the valid range, if clamping happened
    pub unclamped: Option<f64>,
}

/// Translates between one profile's datapoints and capability values
#[derive(Debug, Clone)]
pub struct DataPointCodec {
    table: Vec<DataPointMapping>,
    transforms: TransformRegistry,
}

impl DataPointCodec {
    /// Codec for a profile's table using the built-in transforms
    pub fn new(profile: &DeviceProfile) -> Self {
        Self::with_transforms(profile, TransformRegistry::builtin())
    }

    pub fn with_transforms(profile: &DeviceProfile, transforms: TransformRegistry) -> Self {
        Self {
            table: profile.dp_table.clone(),
            transforms,
        }
    }

    pub fn table(&self) -> &[DataPointMapping] {
        &self.table
    }

    /// Capabilities some datapoint in this table can produce
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.table.iter().filter_map(|m| m.capability.as_deref())
    }

    /// First mapping in table order targeting `capability`
    pub fn mapping_for_capability(&self, capability: &str) -> Option<&DataPointMapping> {
        self.table
            .iter()
            .find(|m| m.capability.as_deref() == Some(capability))
    }

    /// Decode a datapoint, returning `None` for anything that should not
    /// change a capability
    pub fn decode(&self, dp_id: u8, raw: &RawValue) -> Option<Decoded> {
        match self.try_decode(dp_id, raw) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(dp_id = dp_id, error = %e, "Datapoint ignored");
                None
            }
        }
    }

    /// Decode a datapoint, reporting why nothing was produced
    pub fn try_decode(&self, dp_id: u8, raw: &RawValue) -> Result<Decoded, CodecError> {
        let mapping = self
            .table
            .iter()
            .find(|m| m.dp_id == dp_id)
            .ok_or(CodecError::MappingMiss(dp_id))?;
        let capability = mapping
            .capability
            .as_deref()
            .ok_or(CodecError::MappingMiss(dp_id))?;

        let mut value = coerce(dp_id, mapping.value_kind, raw)?;

        if mapping.divisor != 1.0 && mapping.divisor != 0.0 {
            if let CapabilityValue::Number(n) = value {
                value = CapabilityValue::Number(n / mapping.divisor);
            }
        }

        if let Some(name) = &mapping.transform {
            let transform = self
                .transforms
                .get(name)
                .ok_or_else(|| CodecError::UnknownTransform(name.clone()))?;
            value = (transform.decode)(value).ok_or(CodecError::EmptyValue(dp_id))?;
        }

        let mut unclamped = None;
        if let (Some((min, max)), CapabilityValue::Number(n)) = (mapping.range(), &value) {
            let n = *n;
            if is_percentage(capability) && (n < min || n > max) {
                let clamped = n.clamp(min, max);
                warn!(
                    dp_id = dp_id,
                    capability = %capability,
                    value = n,
                    clamped = clamped,
                    "Decoded value outside valid range, clamping"
                );
                unclamped = Some(n);
                value = CapabilityValue::Number(clamped);
            }
        }

        Ok(Decoded {
            capability: capability.to_string(),
            value,
            unclamped,
        })
    }

    /// Decode every record of a vendor payload, skipping the ones that fail
    pub fn decode_records(&self, records: &[DpRecord]) -> Vec<Decoded> {
        records
            .iter()
            .filter_map(|r| self.decode(r.dp_id, &RawValue::from(r)))
            .collect()
    }

    /// Encode a capability write into a datapoint record
    pub fn encode_record(
        &self,
        capability: &str,
        value: &CapabilityValue,
    ) -> Result<DpRecord, CodecError> {
        let mapping = self
            .mapping_for_capability(capability)
            .ok_or_else(|| CodecError::EncodeTargetMissing(capability.to_string()))?;

        let invalid = || CodecError::InvalidValue {
            capability: capability.to_string(),
            value: value.to_string(),
        };

        let wire_value = match &mapping.transform {
            Some(name) => {
                let transform = self
                    .transforms
                    .get(name)
                    .ok_or_else(|| CodecError::UnknownTransform(name.clone()))?;
                let encode = transform.encode.ok_or_else(invalid)?;
                encode(value).ok_or_else(invalid)?
            }
            None => value.clone(),
        };

        let scaled = || -> Result<f64, CodecError> {
            let n = wire_value.as_f64().ok_or_else(invalid)? * mapping.divisor;
            if n.is_finite() {
                Ok(n)
            } else {
                Err(invalid())
            }
        };

        let record = match mapping.value_kind {
            ValueKind::Raw => {
                let text = wire_value.as_str().ok_or_else(invalid)?;
                let data = hex::decode(text).map_err(|_| invalid())?;
                DpRecord::new(mapping.dp_id, DpType::Raw, data)
            }
            ValueKind::Bool => {
                DpRecord::new(mapping.dp_id, DpType::Bool, vec![(scaled()? != 0.0) as u8])
            }
            // Enums are always a single byte on the way out
            ValueKind::Enum => {
                let n = scaled()?.round().clamp(0.0, u8::MAX as f64) as u8;
                DpRecord::new(mapping.dp_id, DpType::Enum, vec![n])
            }
            ValueKind::Integer => {
                let n = scaled()?.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
                DpRecord::new(mapping.dp_id, DpType::Value, n.to_be_bytes().to_vec())
            }
        };

        debug!(
            capability = %capability,
            dp_id = record.dp_id,
            data = %hex::encode(&record.data),
            "Encoded datapoint"
        );
        Ok(record)
    }

    /// Encode a capability write into datapoint record bytes
    pub fn encode(&self, capability: &str, value: &CapabilityValue) -> Result<Vec<u8>, CodecError> {
        Ok(self.encode_record(capability, value)?.to_bytes()?)
    }
}

/// Interpret a raw value according to the mapping's kind
fn coerce(dp_id: u8, kind: ValueKind, raw: &RawValue) -> Result<CapabilityValue, CodecError> {
    let malformed = |reason: &str| CodecError::MalformedFrame {
        dp_id,
        reason: reason.to_string(),
    };

    let value = match (kind, raw) {
        (ValueKind::Integer, RawValue::Bytes(bytes)) => {
            CapabilityValue::Number(be_integer(bytes).ok_or_else(|| {
                malformed("integer datapoints carry 1 to 8 bytes")
            })?)
        }
        (ValueKind::Bool, RawValue::Bytes(bytes)) => {
            let b = bytes.first().ok_or_else(|| malformed("empty bool datapoint"))?;
            CapabilityValue::Bool(*b != 0)
        }
        (ValueKind::Enum, RawValue::Bytes(bytes)) => {
            let b = bytes.first().ok_or_else(|| malformed("empty enum datapoint"))?;
            CapabilityValue::Number(*b as f64)
        }
        (ValueKind::Raw, RawValue::Bytes(bytes)) => CapabilityValue::Text(hex::encode(bytes)),

        (ValueKind::Bool, RawValue::Number(n)) => CapabilityValue::Bool(*n != 0),
        (ValueKind::Bool, RawValue::Bool(b)) => CapabilityValue::Bool(*b),
        (ValueKind::Raw, RawValue::Number(n)) => CapabilityValue::Text(n.to_string()),
        (ValueKind::Raw, RawValue::Bool(b)) => CapabilityValue::Text(b.to_string()),
        (ValueKind::Enum, RawValue::Number(n)) => {
            let b = u8::try_from(*n).map_err(|_| malformed("enum datapoints carry one byte"))?;
            CapabilityValue::Number(b as f64)
        }
        (_, RawValue::Number(n)) => CapabilityValue::Number(*n as f64),
        (_, RawValue::Bool(b)) => CapabilityValue::Number(if *b { 1.0 } else { 0.0 }),
    };
    Ok(value)
}

/// Big-endian integer of 1..=8 bytes; 4-byte values are signed 32-bit
fn be_integer(bytes: &[u8]) -> Option<f64> {
    match bytes.len() {
        0 => None,
        4 => Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64),
        n if n <= 8 => Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64) as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tzbridge_core::DeviceType;

    fn profile(table: Vec<DataPointMapping>) -> DeviceProfile {
        DeviceProfile {
            device_type: DeviceType::Cover,
            category: "windowcoverings".to_string(),
            capabilities: BTreeSet::new(),
            clusters: BTreeSet::new(),
            dp_table: table,
            confidence: 0,
            profile_name: None,
        }
    }

    fn curtain() -> DataPointCodec {
        DataPointCodec::new(&profile(vec![
            DataPointMapping::new(1, Some("windowcoverings_state"), ValueKind::Enum)
                .with_transform("motor_state"),
            DataPointMapping::new(2, Some("windowcoverings_set"), ValueKind::Integer)
                .with_divisor(100.0)
                .with_range(0.0, 1.0),
            DataPointMapping::new(5, None, ValueKind::Enum),
            DataPointMapping::new(7, Some("onoff"), ValueKind::Bool),
            DataPointMapping::new(9, Some("measure_power"), ValueKind::Integer),
            DataPointMapping::new(12, Some("mode"), ValueKind::Enum),
            DataPointMapping::new(15, Some("schedule"), ValueKind::Raw),
            DataPointMapping::new(20, Some("measure_temperature"), ValueKind::Integer)
                .with_divisor(10.0),
            DataPointMapping::new(101, Some("tilt"), ValueKind::Enum)
                .with_transform("opening_mode")
                .with_range(0.0, 1.0),
        ]))
    }

    fn value(decoded: Option<Decoded>) -> CapabilityValue {
        decoded.expect("datapoint should decode").value
    }

    #[test]
    fn test_position_divisor() {
        let d = curtain().decode(2, &RawValue::Number(55)).unwrap();
        assert_eq!(d.capability, "windowcoverings_set");
        assert_eq!(d.value, CapabilityValue::Number(0.55));
        assert!(d.unclamped.is_none());
    }

    #[test]
    fn test_position_out_of_range_is_clamped() {
        let d = curtain().decode(2, &RawValue::Number(150)).unwrap();
        assert_eq!(d.value, CapabilityValue::Number(1.0));
        assert_eq!(d.unclamped, Some(1.5));

        let d = curtain().decode(2, &RawValue::Number(-20)).unwrap();
        assert_eq!(d.value, CapabilityValue::Number(0.0));
    }

    #[test]
    fn test_non_percentage_is_not_clamped() {
        let codec = DataPointCodec::new(&profile(vec![DataPointMapping::new(
            3,
            Some("measure_power"),
            ValueKind::Integer,
        )
        .with_range(0.0, 10.0)]));
        let d = codec.decode(3, &RawValue::Number(500)).unwrap();
        assert_eq!(d.value, CapabilityValue::Number(500.0));
    }

    #[test]
    fn test_unusable_range_skips_clamp() {
        let codec = DataPointCodec::new(&profile(vec![
            DataPointMapping::new(2, Some("windowcoverings_set"), ValueKind::Integer)
                .with_divisor(100.0)
                .with_range(1.0, 0.0),
            DataPointMapping::new(3, Some("dim"), ValueKind::Integer)
                .with_divisor(100.0)
                .with_range(f64::NAN, 1.0),
        ]));
        let d = codec.decode(2, &RawValue::Number(150)).unwrap();
        assert_eq!(d.value, CapabilityValue::Number(1.5));
        assert_eq!(d.unclamped, None);
        let d = codec.decode(3, &RawValue::Number(150)).unwrap();
        assert_eq!(d.value, CapabilityValue::Number(1.5));
    }

    #[test]
    fn test_enum_numbers_fit_one_byte() {
        let codec = curtain();
        assert_eq!(value(codec.decode(12, &RawValue::Number(255))), CapabilityValue::Number(255.0));
        assert!(matches!(
            codec.try_decode(12, &RawValue::Number(258)),
            Err(CodecError::MalformedFrame { dp_id: 12, .. })
        ));
        assert!(matches!(
            codec.try_decode(12, &RawValue::Number(-1)),
            Err(CodecError::MalformedFrame { dp_id: 12, .. })
        ));
    }

    #[test]
    fn test_motor_state() {
        let codec = curtain();
        assert_eq!(value(codec.decode(1, &RawValue::Number(0))), "up".into());
        assert_eq!(value(codec.decode(1, &RawValue::Number(1))), "idle".into());
        assert_eq!(value(codec.decode(1, &RawValue::Number(2))), "down".into());
        assert_eq!(value(codec.decode(1, &RawValue::Number(9))), "idle".into());
        assert_eq!(value(codec.decode(1, &RawValue::Bytes(vec![2]))), "down".into());
    }

    #[test]
    fn test_opening_mode() {
        let codec = curtain();
        let d = codec.decode(101, &RawValue::Number(0)).unwrap();
        assert_eq!(d.capability, "tilt");
        assert_eq!(d.value, CapabilityValue::Number(0.5));
        assert_eq!(value(codec.decode(101, &RawValue::Number(1))), CapabilityValue::Number(1.0));
        // Undefined mode produces no value
        assert!(codec.decode(101, &RawValue::Number(4)).is_none());
    }

    #[test]
    fn test_mapping_miss() {
        let codec = curtain();
        assert_eq!(
            codec.try_decode(42, &RawValue::Number(1)).unwrap_err(),
            CodecError::MappingMiss(42)
        );
        // Configuration-only slot
        assert_eq!(
            codec.try_decode(5, &RawValue::Number(1)).unwrap_err(),
            CodecError::MappingMiss(5)
        );
    }

    #[test]
    fn test_malformed_bytes() {
        let codec = curtain();
        assert!(matches!(
            codec.try_decode(2, &RawValue::Bytes(vec![])),
            Err(CodecError::MalformedFrame { dp_id: 2, .. })
        ));
        assert!(matches!(
            codec.try_decode(2, &RawValue::Bytes(vec![0; 9])),
            Err(CodecError::MalformedFrame { .. })
        ));
        assert!(matches!(
            codec.try_decode(7, &RawValue::Bytes(vec![])),
            Err(CodecError::MalformedFrame { .. })
        ));
        // The codec is untouched by a bad frame
        assert_eq!(value(codec.decode(7, &RawValue::Bytes(vec![1]))), CapabilityValue::Bool(true));
    }

    #[test]
    fn test_integer_widths() {
        let codec = curtain();
        assert_eq!(
            value(codec.decode(9, &RawValue::Bytes(vec![0x01, 0x2C]))),
            CapabilityValue::Number(300.0)
        );
        assert_eq!(
            value(codec.decode(9, &RawValue::Bytes(vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x00]))),
            CapabilityValue::Number(16_777_216.0)
        );
        // Four byte values are signed
        assert_eq!(
            value(codec.decode(20, &RawValue::Bytes(vec![0xFF, 0xFF, 0xFF, 0xCE]))),
            CapabilityValue::Number(-5.0)
        );
    }

    #[test]
    fn test_raw_kind() {
        let codec = curtain();
        assert_eq!(
            value(codec.decode(15, &RawValue::Bytes(vec![0xDE, 0xAD]))),
            CapabilityValue::Text("dead".to_string())
        );
        assert_eq!(
            codec.encode("schedule", &"0a0b".into()).unwrap(),
            vec![15, 0x00, 0x00, 0x02, 0x0A, 0x0B]
        );
    }

    #[test]
    fn test_encode_layouts() {
        let codec = curtain();
        assert_eq!(
            codec.encode("onoff", &true.into()).unwrap(),
            vec![7, 0x01, 0x00, 0x01, 0x01]
        );
        assert_eq!(
            codec.encode("mode", &3.0.into()).unwrap(),
            vec![12, 0x04, 0x00, 0x01, 0x03]
        );
        assert_eq!(
            codec.encode("windowcoverings_set", &0.55.into()).unwrap(),
            vec![2, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x37]
        );
        assert_eq!(
            codec.encode("windowcoverings_state", &"down".into()).unwrap(),
            vec![1, 0x04, 0x00, 0x01, 0x02]
        );
    }

    #[test]
    fn test_encode_tilt_boundary() {
        let codec = curtain();
        let mode = |v: f64| codec.encode_record("tilt", &v.into()).unwrap().data[0];
        assert_eq!(mode(0.3), 0);
        assert_eq!(mode(0.49), 0);
        assert_eq!(mode(0.50), 1);
        assert_eq!(mode(0.8), 1);
        let record = codec.encode_record("tilt", &0.3.into()).unwrap();
        assert_eq!(record.dp_type, DpType::Enum);
        assert_eq!(record.dp_id, 101);
    }

    #[test]
    fn test_encode_errors() {
        let codec = curtain();
        assert_eq!(
            codec.encode("dim", &0.5.into()).unwrap_err(),
            CodecError::EncodeTargetMissing("dim".to_string())
        );
        assert!(matches!(
            codec.encode("windowcoverings_state", &"sideways".into()),
            Err(CodecError::InvalidValue { .. })
        ));
        assert!(matches!(
            codec.encode("measure_power", &"lots".into()),
            Err(CodecError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_round_trip_unscaled_mappings() {
        let codec = curtain();
        let round_trip = |capability: &str, v: CapabilityValue| {
            let record = codec.encode_record(capability, &v).unwrap();
            codec.decode(record.dp_id, &RawValue::from(&record)).unwrap().value
        };

        for v in [-40.0, 0.0, 1.0, 2500.0, 65_536.0] {
            assert_eq!(round_trip("measure_power", v.into()), CapabilityValue::Number(v));
        }
        for v in [0.0, 1.0, 3.0, 255.0] {
            assert_eq!(round_trip("mode", v.into()), CapabilityValue::Number(v));
        }
        for v in [true, false] {
            assert_eq!(round_trip("onoff", v.into()), CapabilityValue::Bool(v));
        }
    }

    #[test]
    fn test_transformed_mappings_do_not_round_trip() {
        // Known asymmetry: tilt 0.3 encodes to mode 0, which decodes to 0.5
        let codec = curtain();
        let record = codec.encode_record("tilt", &0.3.into()).unwrap();
        let back = codec.decode(record.dp_id, &RawValue::from(&record)).unwrap();
        assert_eq!(back.value, CapabilityValue::Number(0.5));
    }

    #[test]
    fn test_decode_records() {
        let codec = curtain();
        let records = vec![
            DpRecord::new(1, DpType::Enum, vec![0]),
            DpRecord::new(5, DpType::Enum, vec![1]),
            DpRecord::new(2, DpType::Value, vec![]),
            DpRecord::new(2, DpType::Value, vec![0, 0, 0, 40]),
        ];
        let decoded = codec.decode_records(&records);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].value, "up".into());
        assert_eq!(decoded[1].value, CapabilityValue::Number(0.4));
    }

    #[test]
    fn test_raw_value_json() {
        let raw: RawValue = serde_json::from_str("55").unwrap();
        assert_eq!(raw, RawValue::Number(55));
        let raw: RawValue = serde_json::from_str("[0, 1]").unwrap();
        assert_eq!(raw, RawValue::Bytes(vec![0, 1]));
        let raw: RawValue = serde_json::from_str("true").unwrap();
        assert_eq!(raw, RawValue::Bool(true));
    }

    #[test]
    fn test_unknown_transform_is_a_noop() {
        let codec = DataPointCodec::new(&profile(vec![DataPointMapping::new(
            1,
            Some("onoff"),
            ValueKind::Bool,
        )
        .with_transform("does_not_exist")]));
        assert_eq!(
            codec.try_decode(1, &RawValue::Bool(true)).unwrap_err(),
            CodecError::UnknownTransform("does_not_exist".to_string())
        );
    }
}
