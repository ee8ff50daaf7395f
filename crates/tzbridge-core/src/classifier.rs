//! Fingerprint classifier
//!
//! Turns the identification tokens of a [`DeviceDescriptor`] into a
//! [`DeviceProfile`]. Classification never fails: descriptors nothing matches
//! produce an `unknown` profile whose confidence reflects whatever evidence
//! was present.
//!
//! The steps run in a fixed order:
//! 1. Type inference from the catalog's ordered keyword table
//! 2. Capability inference (type template, power source, free-text hints)
//! 3. Cluster inference (basic + identify + type clusters)
//! 4. Datapoint table from a named catalog profile, or parsed from the hints
//!    of devices reporting the vendor's catch-all model
//! 5. Confidence scoring

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cache::ProfileCache;
use crate::catalog::{Catalog, NamedProfile, TypeEntry};
use crate::descriptor::DeviceDescriptor;
use crate::profile::{DataPointMapping, DeviceProfile, DeviceType, ValueKind, UNCATEGORIZED};

/// Basic cluster, present on every device
pub const CLUSTER_BASIC: u16 = 0x0000;
/// Identify cluster, present on every device
pub const CLUSTER_IDENTIFY: u16 = 0x0003;

/// Evidence weights for the confidence score.
///
/// `NAMED_PROFILE` counts only profiles pinned to specific manufacturers.
mod weight {
    pub const MANUFACTURER: u8 = 20;
    pub const MODEL: u8 = 20;
    pub const WIRE_FINGERPRINT: u8 = 15;
    pub const KNOWN_TYPE: u8 = 15;
    pub const CAPABILITIES: u8 = 15;
    pub const CLUSTERS: u8 = 10;
    pub const NAMED_PROFILE: u8 = 5;
}

static DP_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)dp\s*:?\s*(\d+)\s*:?\s*(.+)").expect("datapoint hint pattern is valid")
});

static BUILTIN: Lazy<Catalog> = Lazy::new(Catalog::builtin);

/// Maps a datapoint description to a capability
struct HintRule {
    keywords: &'static [&'static str],
    capability: &'static str,
    value_kind: ValueKind,
    divisor: f64,
    percentage: bool,
}

/// Ordered; the first rule whose keyword appears in a description wins
const DP_HINT_RULES: &[HintRule] = &[
    HintRule {
        keywords: &["onoff", "switch"],
        capability: "onoff",
        value_kind: ValueKind::Bool,
        divisor: 1.0,
        percentage: false,
    },
    HintRule {
        keywords: &["brightness", "dim"],
        capability: "dim",
        value_kind: ValueKind::Integer,
        divisor: 1000.0,
        percentage: true,
    },
    HintRule {
        keywords: &["temperature"],
        capability: "measure_temperature",
        value_kind: ValueKind::Integer,
        divisor: 10.0,
        percentage: false,
    },
    HintRule {
        keywords: &["humidity"],
        capability: "measure_humidity",
        value_kind: ValueKind::Integer,
        divisor: 10.0,
        percentage: false,
    },
    HintRule {
        keywords: &["power"],
        capability: "measure_power",
        value_kind: ValueKind::Integer,
        divisor: 10.0,
        percentage: false,
    },
    HintRule {
        keywords: &["current"],
        capability: "measure_current",
        value_kind: ValueKind::Integer,
        divisor: 1000.0,
        percentage: false,
    },
    HintRule {
        keywords: &["voltage"],
        capability: "measure_voltage",
        value_kind: ValueKind::Integer,
        divisor: 10.0,
        percentage: false,
    },
];

/// Measurement keywords recognised anywhere in the free-text hints
const MEASUREMENT_HINTS: &[(&str, &str)] = &[
    ("temperature", "measure_temperature"),
    ("humidity", "measure_humidity"),
    ("illuminance", "measure_luminance"),
];

/// Classifier bound to a catalog and an optional result cache
#[derive(Debug, Clone)]
pub struct Classifier {
    catalog: Arc<Catalog>,
    cache: Option<Arc<ProfileCache>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(Catalog::builtin())
    }
}

impl Classifier {
    /// Create a classifier without a cache
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            cache: None,
        }
    }

    /// Create a classifier that memoizes results in `cache`
    pub fn with_cache(catalog: Catalog, cache: Arc<ProfileCache>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            cache: Some(cache),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> Option<&ProfileCache> {
        self.cache.as_deref()
    }

    /// Classify a descriptor, consulting the cache when one is attached
    pub fn classify(&self, descriptor: &DeviceDescriptor) -> DeviceProfile {
        if let Some(cache) = &self.cache {
            if let Some(profile) = cache.get(descriptor) {
                trace!(model = %descriptor.model_token, "Profile cache hit");
                return profile;
            }
        }

        let profile = classify_with(&self.catalog, descriptor);

        if let Some(cache) = &self.cache {
            cache.insert(descriptor.clone(), profile.clone());
        }
        profile
    }
}

/// Classify a descriptor against the built-in catalog
pub fn classify(descriptor: &DeviceDescriptor) -> DeviceProfile {
    classify_with(&BUILTIN, descriptor)
}

/// Classify a descriptor against a specific catalog
pub fn classify_with(catalog: &Catalog, descriptor: &DeviceDescriptor) -> DeviceProfile {
    let named = catalog.find_profile(descriptor);

    let (device_type, type_entry) = infer_type(catalog, descriptor, named);
    let category = type_entry
        .map(|e| e.category.clone())
        .unwrap_or_else(|| UNCATEGORIZED.to_string());

    let mut capabilities = infer_capabilities(descriptor, device_type, type_entry);
    let clusters = infer_clusters(type_entry);

    let dp_table = match named {
        Some(profile) => {
            capabilities.extend(profile.capabilities.iter().cloned());
            profile.datapoints.clone()
        }
        None if catalog.vendor.is_generic_model(&descriptor.model_token) => descriptor
            .free_text_hints
            .as_deref()
            .map(parse_dp_hints)
            .unwrap_or_default(),
        None => Vec::new(),
    };
    capabilities.extend(dp_table.iter().filter_map(|m| m.capability.clone()));

    if device_type == DeviceType::Unknown {
        debug!(
            manufacturer = %descriptor.manufacturer_token,
            model = %descriptor.model_token,
            "Classification ambiguous, no device type matched"
        );
    }

    let mut confidence: u8 = 0;
    if descriptor.has_manufacturer() {
        confidence += weight::MANUFACTURER;
    }
    if descriptor.has_model() {
        confidence += weight::MODEL;
    }
    if descriptor.has_wire_fingerprint() {
        confidence += weight::WIRE_FINGERPRINT;
    }
    if device_type != DeviceType::Unknown {
        confidence += weight::KNOWN_TYPE;
    }
    if !capabilities.is_empty() {
        confidence += weight::CAPABILITIES;
    }
    if clusters.len() > 2 {
        confidence += weight::CLUSTERS;
    }
    if named.is_some_and(|p| !p.manufacturers.is_empty()) {
        confidence += weight::NAMED_PROFILE;
    }

    let profile = DeviceProfile {
        device_type,
        category,
        capabilities,
        clusters,
        dp_table,
        confidence: confidence.min(100),
        profile_name: named.map(|p| p.name.clone()),
    };

    debug!(
        device_type = %profile.device_type,
        capabilities = profile.capabilities.len(),
        datapoints = profile.dp_table.len(),
        confidence = profile.confidence,
        "Classified device"
    );
    profile
}

fn infer_type<'a>(
    catalog: &'a Catalog,
    descriptor: &DeviceDescriptor,
    named: Option<&NamedProfile>,
) -> (DeviceType, Option<&'a TypeEntry>) {
    let category = descriptor.category_hint.as_deref();
    if let Some(entry) = catalog.find_type(&descriptor.model_token, category) {
        return (entry.kind, Some(entry));
    }

    // A named profile can only fill in a type keyword inference missed
    match named.and_then(|p| p.device_type) {
        Some(kind) if kind != DeviceType::Unknown => (kind, catalog.type_entry(kind)),
        _ => (DeviceType::Unknown, None),
    }
}

fn infer_capabilities(
    descriptor: &DeviceDescriptor,
    device_type: DeviceType,
    type_entry: Option<&TypeEntry>,
) -> BTreeSet<String> {
    let mut capabilities: BTreeSet<String> = type_entry
        .map(|e| e.capabilities.iter().cloned().collect())
        .unwrap_or_default();

    let power = descriptor.power_source.as_deref().unwrap_or("").to_lowercase();
    if power.contains("battery") {
        capabilities.insert("measure_battery".to_string());
    }
    let mains = power.contains("mains") || power.trim() == "ac";
    if mains && device_type == DeviceType::Plug {
        capabilities.insert("measure_power".to_string());
    }

    if let Some(hints) = &descriptor.free_text_hints {
        let hints = hints.to_lowercase();
        for (keyword, capability) in MEASUREMENT_HINTS {
            if hints.contains(keyword) {
                capabilities.insert(capability.to_string());
            }
        }
    }

    capabilities
}

fn infer_clusters(type_entry: Option<&TypeEntry>) -> BTreeSet<u16> {
    let mut clusters: BTreeSet<u16> = [CLUSTER_BASIC, CLUSTER_IDENTIFY].into_iter().collect();
    if let Some(entry) = type_entry {
        clusters.extend(entry.clusters.iter().copied());
    }
    clusters
}

/// Parse `dp<N>: <description>` lines into a datapoint table.
///
/// Lines that do not match, describe nothing we know, or name a datapoint id
/// outside 0..=255 are skipped. A repeated id keeps its first mapping.
pub fn parse_dp_hints(hints: &str) -> Vec<DataPointMapping> {
    let mut table: Vec<DataPointMapping> = Vec::new();

    for line in hints.lines() {
        let Some(caps) = DP_HINT.captures(line) else {
            continue;
        };
        let Ok(dp_id) = caps[1].parse::<u8>() else {
            trace!(line = %line, "Datapoint id out of range");
            continue;
        };
        if table.iter().any(|m| m.dp_id == dp_id) {
            continue;
        }

        let description = caps[2].trim().to_lowercase();
        let Some(rule) = DP_HINT_RULES
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| description.contains(k)))
        else {
            trace!(dp_id = dp_id, description = %description, "No capability for datapoint hint");
            continue;
        };

        let mut mapping = DataPointMapping::new(dp_id, Some(rule.capability), rule.value_kind)
            .with_divisor(rule.divisor);
        if rule.percentage {
            mapping = mapping.with_range(0.0, 1.0);
        }
        table.push(mapping);
    }

    table
}
