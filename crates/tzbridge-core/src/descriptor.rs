//! Raw identification tokens announced by a device at pairing time

use serde::{Deserialize, Serialize};

/// Identification tokens observed when a device first joins the network.
///
/// Descriptors are immutable once created. Everything the classifier derives
/// from them can be recomputed at any time, so the descriptor is the source of
/// truth for a device's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Manufacturer name token (e.g. "_TZE200_xuzcvlku")
    #[serde(default)]
    pub manufacturer_token: String,
    /// Model identifier token (e.g. "TS0601")
    #[serde(default)]
    pub model_token: String,
    /// Power source as reported by the basic cluster ("Battery", "Mains (single phase)")
    #[serde(default)]
    pub power_source: Option<String>,
    /// Loosely structured hints supplied by the integrator, one per line
    #[serde(default)]
    pub free_text_hints: Option<String>,
    /// Cluster ids seen in the device's simple descriptor
    #[serde(default)]
    pub observed_clusters: Vec<u16>,
    /// Vendor category string some devices announce (e.g. "curtain")
    #[serde(default)]
    pub category_hint: Option<String>,
}

impl DeviceDescriptor {
    /// Create a descriptor from the two mandatory tokens
    pub fn new(manufacturer: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            manufacturer_token: manufacturer.into(),
            model_token: model.into(),
            ..Default::default()
        }
    }

    pub fn with_power_source(mut self, power_source: impl Into<String>) -> Self {
        self.power_source = Some(power_source.into());
        self
    }

    pub fn with_hints(mut self, hints: impl Into<String>) -> Self {
        self.free_text_hints = Some(hints.into());
        self
    }

    pub fn with_clusters(mut self, clusters: impl IntoIterator<Item = u16>) -> Self {
        self.observed_clusters = clusters.into_iter().collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category_hint = Some(category.into());
        self
    }

    /// Whether a manufacturer token was announced at all
    pub fn has_manufacturer(&self) -> bool {
        !self.manufacturer_token.trim().is_empty()
    }

    /// Whether a model token was announced at all
    pub fn has_model(&self) -> bool {
        !self.model_token.trim().is_empty()
    }

    /// Whether the device supplied its own cluster list
    pub fn has_wire_fingerprint(&self) -> bool {
        !self.observed_clusters.is_empty()
    }
}
