//! tzbridge Core - Device descriptors, catalog, classification and dialect detection
//!
//! This crate provides the foundational types for tzbridge:
//! - Device descriptors as announced by hardware at pairing time
//! - Device profiles and datapoint mapping tables
//! - The device catalog (built-in or loaded from TOML)
//! - The fingerprint classifier and its optional profile cache
//! - Dialect detection (standard clusters vs. vendor datapoints)

pub mod cache;
pub mod catalog;
pub mod classifier;
pub mod descriptor;
pub mod dialect;
pub mod profile;
pub mod value;

pub use cache::ProfileCache;
pub use catalog::{Catalog, CatalogError, NamedProfile, TypeEntry, VendorConfig};
pub use classifier::{classify, Classifier};
pub use descriptor::DeviceDescriptor;
pub use dialect::{detect, Dialect};
pub use profile::{DataPointMapping, DeviceProfile, DeviceType, ValueKind};
pub use value::CapabilityValue;
