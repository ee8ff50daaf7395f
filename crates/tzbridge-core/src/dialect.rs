//! Dialect detection

use serde::{Deserialize, Serialize};

use crate::catalog::VendorConfig;
use crate::descriptor::DeviceDescriptor;

/// How a device expects to be spoken to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Dialect {
    /// Interoperable cluster/command addressing
    Standard,
    /// Proprietary datapoints inside the manufacturer-specific cluster
    Vendor,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => f.write_str("STANDARD"),
            Self::Vendor => f.write_str("VENDOR"),
        }
    }
}

/// Detect the dialect of a device using the given vendor constants.
///
/// `Vendor` when the model is the catch-all id or the manufacturer carries the
/// private prefix, `Standard` otherwise.
pub fn detect_with(vendor: &VendorConfig, descriptor: &DeviceDescriptor) -> Dialect {
    if vendor.is_generic_model(&descriptor.model_token)
        || vendor.has_private_prefix(&descriptor.manufacturer_token)
    {
        Dialect::Vendor
    } else {
        Dialect::Standard
    }
}

/// Detect the dialect of a device using the default vendor constants
pub fn detect(descriptor: &DeviceDescriptor) -> Dialect {
    detect_with(&VendorConfig::default(), descriptor)
}
