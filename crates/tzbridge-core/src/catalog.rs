//! Device catalog - ordered type table and named datapoint profiles
//!
//! The catalog is static configuration: the keyword priority table used for
//! type inference, the default capability template and cluster list for each
//! type, and named profiles carrying datapoint tables for known vendor devices.
//!
//! Catalogs are normally built in (`Catalog::builtin`) but can be loaded from
//! TOML so new device families become data rather than code:
//!
//! ```toml
//! [vendor]
//! generic_model = "TS0601"
//! private_prefix = "_TZE"
//!
//! [[device_type]]
//! kind = "cover"
//! category = "windowcoverings"
//! keywords = ["curtain", "blind"]
//! capabilities = ["windowcoverings_set"]
//! clusters = [0x0102]
//!
//! [[profile]]
//! name = "curtain_motor"
//! models = ["TS0601"]
//! manufacturers = ["_TZE200_xuzcvlku"]
//! device_type = "cover"
//!
//! [[profile.datapoint]]
//! dp_id = 2
//! capability = "windowcoverings_set"
//! value_kind = "integer"
//! divisor = 100
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::descriptor::DeviceDescriptor;
use crate::profile::{DataPointMapping, DeviceType, ValueKind};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse catalog: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Profile {profile} maps datapoint {dp_id} more than once")]
    DuplicateDatapoint { profile: String, dp_id: u8 },
    #[error("Type table entry for {0} must not use the unknown type")]
    UnknownTypeEntry(String),
    #[error("Profile {profile} datapoint {dp_id} has divisor {divisor}")]
    InvalidDivisor { profile: String, dp_id: u8, divisor: f64 },
    #[error("Profile {profile} datapoint {dp_id} has an empty or non-finite valid range")]
    InvalidRange { profile: String, dp_id: u8 },
}

/// Vendor-specific identification constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    /// Catch-all model id shared by every datapoint device
    #[serde(default = "default_generic_model")]
    pub generic_model: String,
    /// Manufacturer token prefix reserved for datapoint devices
    #[serde(default = "default_private_prefix")]
    pub private_prefix: String,
}

fn default_generic_model() -> String {
    "TS0601".to_string()
}

fn default_private_prefix() -> String {
    "_TZE".to_string()
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            generic_model: default_generic_model(),
            private_prefix: default_private_prefix(),
        }
    }
}

impl VendorConfig {
    /// Whether a model token is the vendor's catch-all identifier
    pub fn is_generic_model(&self, model: &str) -> bool {
        model.trim().eq_ignore_ascii_case(&self.generic_model)
    }

    /// Whether a manufacturer token carries the private datapoint prefix
    pub fn has_private_prefix(&self, manufacturer: &str) -> bool {
        let prefix = self.private_prefix.to_ascii_lowercase();
        manufacturer.trim().to_ascii_lowercase().starts_with(&prefix)
    }
}

/// One row of the type priority table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeEntry {
    pub kind: DeviceType,
    /// Category reported to the host platform
    pub category: String,
    /// Case-insensitive substrings that select this type
    pub keywords: Vec<String>,
    /// Default capability template
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Clusters the type declares besides basic and identify
    #[serde(default)]
    pub clusters: Vec<u16>,
}

impl TypeEntry {
    /// Whether any keyword appears in one of the haystacks
    pub fn matches(&self, haystacks: &[&str]) -> bool {
        self.keywords.iter().any(|keyword| {
            let keyword = keyword.to_lowercase();
            haystacks.iter().any(|h| h.to_lowercase().contains(&keyword))
        })
    }
}

/// A named profile for a known device family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedProfile {
    pub name: String,
    /// Model tokens this profile applies to
    pub models: Vec<String>,
    /// Manufacturer tokens; empty means any manufacturer
    #[serde(default)]
    pub manufacturers: Vec<String>,
    /// Type to use when keyword inference finds nothing
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    /// Capabilities added on top of the type template
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, rename = "datapoint")]
    pub datapoints: Vec<DataPointMapping>,
}

impl NamedProfile {
    pub fn matches(&self, descriptor: &DeviceDescriptor) -> bool {
        let model = descriptor.model_token.trim();
        if !self.models.iter().any(|m| m.eq_ignore_ascii_case(model)) {
            return false;
        }
        if self.manufacturers.is_empty() {
            return true;
        }
        let manufacturer = descriptor.manufacturer_token.trim();
        self.manufacturers
            .iter()
            .any(|m| m.eq_ignore_ascii_case(manufacturer))
    }
}

/// The device catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub vendor: VendorConfig,
    /// Type priority table; declaration order is the tie-break policy
    #[serde(default)]
    pub device_type: Vec<TypeEntry>,
    /// Named profiles, searched in declaration order
    #[serde(default)]
    pub profile: Vec<NamedProfile>,
}

impl Catalog {
    /// Load a catalog from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a catalog from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check the constraints TOML cannot express
    pub fn validate(&self) -> Result<(), CatalogError> {
        for entry in &self.device_type {
            if entry.kind == DeviceType::Unknown {
                return Err(CatalogError::UnknownTypeEntry(entry.category.clone()));
            }
        }
        for profile in &self.profile {
            let mut seen = HashSet::new();
            for dp in &profile.datapoints {
                if !seen.insert(dp.dp_id) {
                    return Err(CatalogError::DuplicateDatapoint {
                        profile: profile.name.clone(),
                        dp_id: dp.dp_id,
                    });
                }
                if !dp.divisor.is_finite() || dp.divisor == 0.0 {
                    return Err(CatalogError::InvalidDivisor {
                        profile: profile.name.clone(),
                        dp_id: dp.dp_id,
                        divisor: dp.divisor,
                    });
                }
                if dp.valid_range.is_some() && dp.range().is_none() {
                    return Err(CatalogError::InvalidRange {
                        profile: profile.name.clone(),
                        dp_id: dp.dp_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// First type entry whose keywords hit the model or category
    pub fn find_type(&self, model: &str, category: Option<&str>) -> Option<&TypeEntry> {
        let haystacks: Vec<&str> = std::iter::once(model).chain(category).collect();
        self.device_type.iter().find(|entry| entry.matches(&haystacks))
    }

    /// Type table entry for a kind
    pub fn type_entry(&self, kind: DeviceType) -> Option<&TypeEntry> {
        self.device_type.iter().find(|entry| entry.kind == kind)
    }

    /// First named profile matching the descriptor
    pub fn find_profile(&self, descriptor: &DeviceDescriptor) -> Option<&NamedProfile> {
        self.profile.iter().find(|p| p.matches(descriptor))
    }

    /// The catalog shipped with tzbridge
    pub fn builtin() -> Self {
        Self {
            vendor: VendorConfig::default(),
            device_type: builtin_types(),
            profile: builtin_profiles(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn entry(
    kind: DeviceType,
    category: &str,
    keywords: &[&str],
    capabilities: &[&str],
    clusters: &[u16],
) -> TypeEntry {
    TypeEntry {
        kind,
        category: category.to_string(),
        keywords: strings(keywords),
        capabilities: strings(capabilities),
        clusters: clusters.to_vec(),
    }
}

fn builtin_types() -> Vec<TypeEntry> {
    use DeviceType::*;
    vec![
        entry(
            Cover,
            "windowcoverings",
            &["curtain", "blind", "shade", "roller", "cover"],
            &["windowcoverings_set", "windowcoverings_state"],
            &[0x0102],
        ),
        entry(
            Thermostat,
            "thermostat",
            &["thermostat", "trv", "radiator"],
            &["target_temperature", "measure_temperature"],
            &[0x0201, 0x0402],
        ),
        entry(
            Plug,
            "socket",
            &["plug", "socket", "outlet"],
            &["onoff"],
            &[0x0006, 0x0702, 0x0B04],
        ),
        entry(Dimmer, "light", &["dimmer"], &["onoff", "dim"], &[0x0006, 0x0008]),
        entry(
            Light,
            "light",
            &["bulb", "light", "lamp"],
            &["onoff", "dim"],
            &[0x0006, 0x0008, 0x0300],
        ),
        entry(Switch, "switch", &["switch", "relay", "gang"], &["onoff"], &[0x0006]),
        entry(
            Motion,
            "sensor",
            &["motion", "pir", "occupancy", "presence", "radar"],
            &["alarm_motion"],
            &[0x0406, 0x0500],
        ),
        entry(
            Contact,
            "sensor",
            &["contact", "door", "window"],
            &["alarm_contact"],
            &[0x0500],
        ),
        entry(
            WaterLeak,
            "sensor",
            &["leak", "flood", "water"],
            &["alarm_water"],
            &[0x0500],
        ),
        entry(Smoke, "sensor", &["smoke"], &["alarm_smoke"], &[0x0500]),
        entry(
            Climate,
            "sensor",
            &["temperature", "humidity", "climate", "thermometer"],
            &["measure_temperature", "measure_humidity"],
            &[0x0402, 0x0405],
        ),
        entry(Remote, "button", &["remote", "button", "scene"], &[], &[0x0006]),
    ]
}

fn builtin_profiles() -> Vec<NamedProfile> {
    vec![
        NamedProfile {
            name: "curtain_motor".to_string(),
            models: strings(&["TS0601"]),
            manufacturers: strings(&["_TZE200_xuzcvlku", "_TZE200_zah67ekd", "_TZE200_cowvfni3"]),
            device_type: Some(DeviceType::Cover),
            capabilities: strings(&["tilt"]),
            datapoints: vec![
                DataPointMapping::new(1, Some("windowcoverings_state"), ValueKind::Enum)
                    .with_transform("motor_state"),
                DataPointMapping::new(2, Some("windowcoverings_set"), ValueKind::Integer)
                    .with_divisor(100.0)
                    .with_range(0.0, 1.0),
                DataPointMapping::new(3, Some("windowcoverings_set"), ValueKind::Integer)
                    .with_divisor(100.0)
                    .with_range(0.0, 1.0),
                // Motor direction, exposed as a device setting
                DataPointMapping::new(5, None, ValueKind::Enum),
                DataPointMapping::new(101, Some("tilt"), ValueKind::Enum)
                    .with_transform("opening_mode")
                    .with_range(0.0, 1.0),
            ],
        },
        NamedProfile {
            name: "radiator_valve".to_string(),
            models: strings(&["TS0601"]),
            manufacturers: strings(&["_TZE200_ckud7u2l", "_TZE200_hue3yfsn"]),
            device_type: Some(DeviceType::Thermostat),
            capabilities: strings(&["measure_battery"]),
            datapoints: vec![
                DataPointMapping::new(2, Some("target_temperature"), ValueKind::Integer)
                    .with_divisor(10.0),
                DataPointMapping::new(3, Some("measure_temperature"), ValueKind::Integer)
                    .with_divisor(10.0),
                // Child lock
                DataPointMapping::new(7, None, ValueKind::Bool),
                DataPointMapping::new(21, Some("measure_battery"), ValueKind::Integer),
            ],
        },
        NamedProfile {
            name: "presence_radar".to_string(),
            models: strings(&["TS0601"]),
            manufacturers: strings(&["_TZE200_ztc6ggyl", "_TZE204_ztc6ggyl"]),
            device_type: Some(DeviceType::Motion),
            capabilities: strings(&["measure_luminance"]),
            datapoints: vec![
                DataPointMapping::new(1, Some("alarm_motion"), ValueKind::Enum)
                    .with_transform("presence"),
                // Sensitivity
                DataPointMapping::new(9, None, ValueKind::Integer),
                DataPointMapping::new(104, Some("measure_luminance"), ValueKind::Integer),
            ],
        },
        NamedProfile {
            name: "metering_plug".to_string(),
            models: strings(&["TS011F"]),
            manufacturers: Vec::new(),
            device_type: Some(DeviceType::Plug),
            capabilities: strings(&["measure_voltage", "measure_current"]),
            datapoints: Vec::new(),
        },
    ]
}
