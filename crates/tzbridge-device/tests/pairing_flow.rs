//! Pairing through inbound reports and outbound writes, end to end

use std::sync::Arc;

use anyhow::{Context, Result};
use tzbridge_codec::frame::{vendor_cmd, DpRecord, DpType, FC_CLUSTER_SPECIFIC};
use tzbridge_codec::{RawValue, VendorFrame, VENDOR_CLUSTER};
use tzbridge_core::{
    CapabilityValue, Catalog, CatalogError, Classifier, DeviceDescriptor, Dialect, ProfileCache,
};
use tzbridge_device::{DeviceEvent, DeviceInstance};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn report(seq: u8, records: Vec<DpRecord>) -> Result<Vec<u8>> {
    let mut bytes = vec![FC_CLUSTER_SPECIFIC, seq, vendor_cmd::DATA_REPORT];
    bytes.extend(VendorFrame { seq: seq as u16, records }.to_bytes()?);
    Ok(bytes)
}

#[test]
fn curtain_reports_and_writes() -> Result<()> {
    init_tracing();
    let descriptor = DeviceDescriptor::new("_TZE200_cowvfni3", "TS0601").with_power_source("mains");
    let mut device = DeviceInstance::pair(descriptor, &Classifier::default());
    let mut rx = device.subscribe();

    assert_eq!(device.dialect(), Dialect::Vendor);
    assert_eq!(device.profile().profile_name.as_deref(), Some("curtain_motor"));

    // Opening mode: 0 is the tilt side, 1 the lift side
    let tilt_side = report(1, vec![DpRecord::new(101, DpType::Enum, vec![0])])?;
    let changes = device.handle_vendor_frame(&tilt_side);
    assert_eq!(changes[0].value, CapabilityValue::Number(0.5));
    device.handle_vendor_frame(&report(2, vec![DpRecord::new(101, DpType::Enum, vec![1])])?);
    assert_eq!(device.capability_value("tilt"), Some(&CapabilityValue::Number(1.0)));

    // Position and motor state in one frame
    let changes = device.handle_vendor_frame(&report(
        3,
        vec![
            DpRecord::new(2, DpType::Value, 55i32.to_be_bytes().to_vec()),
            DpRecord::new(1, DpType::Enum, vec![0]),
        ],
    )?);
    assert_eq!(changes.len(), 2);
    assert_eq!(
        device.capability_value("windowcoverings_set"),
        Some(&CapabilityValue::Number(0.55))
    );
    assert_eq!(
        device.capability_value("windowcoverings_state"),
        Some(&CapabilityValue::from("up"))
    );

    let frame = device
        .write_capability("windowcoverings_state", "down".into())
        .context("motor command")?;
    assert_eq!(frame.cluster, VENDOR_CLUSTER);
    assert_eq!(&frame.bytes[5..], &[0x01, 0x04, 0x00, 0x01, 0x02]);

    let mut changed = 0;
    while let Ok(event) = rx.try_recv() {
        if let DeviceEvent::CapabilityChanged { .. } = event {
            changed += 1;
        }
    }
    assert_eq!(changed, 5);
    Ok(())
}

#[test]
fn hint_table_sensor() -> Result<()> {
    init_tracing();
    let descriptor = DeviceDescriptor::new("_TZE200_sample", "TS0601")
        .with_power_source("Battery")
        .with_hints("dp1: temperature\ndp2: humidity");
    let mut device = DeviceInstance::pair(descriptor, &Classifier::default());

    assert!(device.profile().confidence >= 50);
    assert!(device.has_capability("measure_battery"));

    device.handle_datapoint(1, &RawValue::Number(215));
    device.handle_datapoint(2, &RawValue::Bytes(vec![0x02, 0x0D]));
    assert_eq!(
        device.capability_value("measure_temperature"),
        Some(&CapabilityValue::Number(21.5))
    );
    assert_eq!(
        device.capability_value("measure_humidity"),
        Some(&CapabilityValue::Number(52.5))
    );

    let json: serde_json::Value = serde_json::from_str(&device.to_json()?)?;
    assert_eq!(json["profile"]["dp_table"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[test]
fn standard_plug_writes_commands() -> Result<()> {
    init_tracing();
    let descriptor = DeviceDescriptor::new("_TZ3000_gjnozsaz", "Smart Socket")
        .with_power_source("AC")
        .with_clusters(vec![0x0000, 0x0006, 0x0702]);
    let mut device = DeviceInstance::pair(descriptor, &Classifier::default());

    assert_eq!(device.dialect(), Dialect::Standard);
    assert!(device.has_capability("measure_power"));

    let on = device.write_capability("onoff", true.into()).context("on")?;
    let off = device.write_capability("onoff", false.into()).context("off")?;
    assert_eq!(on.bytes, vec![0x01, 0x00, 0x01]);
    assert_eq!(off.bytes, vec![0x01, 0x01, 0x00]);
    assert_eq!(device.capability_value("onoff"), Some(&CapabilityValue::Bool(false)));

    // No datapoints in the standard dialect
    assert!(device.handle_datapoint(1, &RawValue::Bool(true)).is_none());
    assert_eq!(device.diagnostics().mapping_miss, 1);
    Ok(())
}

#[test]
fn unexpected_capabilities_never_appear() -> Result<()> {
    init_tracing();
    let descriptor = DeviceDescriptor::new("_TZE200_ztc6ggyl", "TS0601");
    let mut device = DeviceInstance::pair(descriptor, &Classifier::default());

    // dp 9 is declared without a capability
    assert!(device.handle_datapoint(9, &RawValue::Number(3)).is_none());
    assert!(device.write_capability("self_destruct", true.into()).is_none());
    assert!(!device.has_capability("self_destruct"));
    assert_eq!(device.diagnostics().dropped_writes, 1);
    Ok(())
}

#[test]
fn shared_cache_across_pairings() -> Result<()> {
    init_tracing();
    let cache = Arc::new(ProfileCache::new(4));
    let classifier = Classifier::with_cache(Catalog::builtin(), Arc::clone(&cache));

    let descriptor = DeviceDescriptor::new("_TZE200_hue3yfsn", "TS0601");
    let first = DeviceInstance::pair(descriptor.clone(), &classifier);
    let second = DeviceInstance::pair(descriptor, &classifier);

    assert_eq!(cache.len(), 1);
    assert_ne!(first.id(), second.id());
    assert_eq!(first.profile(), second.profile());
    assert_eq!(first.profile().profile_name.as_deref(), Some("radiator_valve"));
    Ok(())
}

#[test]
fn catalog_with_inverted_range_is_refused() -> Result<()> {
    init_tracing();
    let toml = r#"
[[profile]]
name = "inverted_curtain"
models = ["TS0601"]
manufacturers = ["_TZE200_inverted"]
device_type = "cover"

[[profile.datapoint]]
dp_id = 2
capability = "windowcoverings_set"
value_kind = "integer"
divisor = 100
valid_range = [1.0, 0.0]
"#;
    assert!(matches!(
        Catalog::from_toml(toml),
        Err(CatalogError::InvalidRange { dp_id: 2, .. })
    ));

    // The same device against a sane catalog clamps instead
    let fixed = Catalog::from_toml(&toml.replace("[1.0, 0.0]", "[0.0, 1.0]"))?;
    let descriptor = DeviceDescriptor::new("_TZE200_inverted", "TS0601");
    let mut device = DeviceInstance::pair(descriptor, &Classifier::new(fixed));
    let change = device
        .handle_datapoint(2, &RawValue::Number(150))
        .context("position report")?;
    assert_eq!(change.value, CapabilityValue::Number(1.0));
    assert_eq!(device.diagnostics().clamped, 1);
    Ok(())
}
