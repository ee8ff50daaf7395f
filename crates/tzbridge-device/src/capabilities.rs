//! Capability state of one device instance
//!
//! The capability set can grow after pairing when the device reports a
//! datapoint the profile did not declare. Growth is gated by an allow-list so
//! unexpected wire data never adds arbitrary capabilities.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, trace};
use tzbridge_codec::{is_percentage, CODEC_CAPABILITIES};
use tzbridge_core::{CapabilityValue, DeviceProfile};

/// Live capability set and values for one device instance
#[derive(Debug, Clone)]
pub struct CapabilityStateManager {
    capabilities: BTreeSet<String>,
    values: BTreeMap<String, CapabilityValue>,
    allow_list: BTreeSet<String>,
    /// Set once the profile pass ran this session
    profile_applied: bool,
}

impl Default for CapabilityStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityStateManager {
    /// Manager gated by every capability the codec can produce
    pub fn new() -> Self {
        Self::with_allow_list(CODEC_CAPABILITIES.iter().copied())
    }

    pub fn with_allow_list<'a>(allowed: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            capabilities: BTreeSet::new(),
            values: BTreeMap::new(),
            allow_list: allowed.into_iter().map(str::to_string).collect(),
            profile_applied: false,
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn is_allowed(&self, capability: &str) -> bool {
        self.allow_list.contains(capability)
    }

    /// Add a capability after pairing. Returns whether it is present afterwards.
    pub fn add_capability_dynamically(&mut self, capability: &str) -> bool {
        if self.has_capability(capability) {
            return true;
        }
        if !self.is_allowed(capability) {
            debug!(capability = %capability, "Capability not on allow-list, not added");
            return false;
        }
        info!(capability = %capability, "Capability added dynamically");
        self.capabilities.insert(capability.to_string());
        true
    }

    /// Store a value, adding the capability first if allowed.
    ///
    /// A capability that is neither present nor allowed is left alone and
    /// `false` is returned. Percentage values are kept inside `[0, 1]`.
    pub fn set_capability_value(&mut self, capability: &str, value: CapabilityValue) -> bool {
        if !self.add_capability_dynamically(capability) {
            return false;
        }

        let value = match value {
            CapabilityValue::Number(n) if is_percentage(capability) => {
                CapabilityValue::Number(n.clamp(0.0, 1.0))
            }
            other => other,
        };
        trace!(capability = %capability, value = %value, "Capability value set");
        self.values.insert(capability.to_string(), value);
        true
    }

    pub fn capability_value(&self, capability: &str) -> Option<&CapabilityValue> {
        self.values.get(capability)
    }

    /// Present capabilities in sorted order
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.capabilities.iter().map(String::as_str)
    }

    /// Add the capabilities a profile declares but the instance lacks.
    ///
    /// Runs once per session; later calls add nothing. Declared capabilities
    /// bypass the allow-list. Returns how many were added.
    pub fn ensure_profile_capabilities(&mut self, profile: &DeviceProfile) -> usize {
        if self.profile_applied {
            trace!("Profile capabilities already applied this session");
            return 0;
        }
        self.profile_applied = true;

        let before = self.capabilities.len();
        self.capabilities.extend(profile.capabilities.iter().cloned());
        let added = self.capabilities.len() - before;
        debug!(added = added, total = self.capabilities.len(), "Applied profile capabilities");
        added
    }

    /// Start a new session, allowing the profile pass to run again
    pub fn begin_session(&mut self) {
        self.profile_applied = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tzbridge_core::{classify, DeviceDescriptor};

    fn curtain_profile() -> DeviceProfile {
        classify(&DeviceDescriptor::new("_TZE200_xuzcvlku", "TS0601"))
    }

    #[test]
    fn test_allow_list_gating() {
        let mut state = CapabilityStateManager::new();
        assert!(state.add_capability_dynamically("measure_temperature"));
        assert!(state.has_capability("measure_temperature"));

        assert!(!state.add_capability_dynamically("self_destruct"));
        assert!(!state.has_capability("self_destruct"));
    }

    #[test]
    fn test_write_to_unknown_capability_is_noop() {
        let mut state = CapabilityStateManager::new();
        assert!(!state.set_capability_value("self_destruct", true.into()));
        assert!(state.capability_value("self_destruct").is_none());
        assert_eq!(state.capabilities().count(), 0);
    }

    #[test]
    fn test_write_adds_allowed_capability() {
        let mut state = CapabilityStateManager::new();
        assert!(state.set_capability_value("measure_humidity", 41.5.into()));
        assert!(state.has_capability("measure_humidity"));
        assert_eq!(
            state.capability_value("measure_humidity"),
            Some(&CapabilityValue::Number(41.5))
        );
    }

    #[test]
    fn test_percentage_values_are_bounded() {
        let mut state = CapabilityStateManager::new();
        state.set_capability_value("dim", 1.4.into());
        assert_eq!(state.capability_value("dim"), Some(&CapabilityValue::Number(1.0)));
        state.set_capability_value("measure_temperature", 31.0.into());
        assert_eq!(
            state.capability_value("measure_temperature"),
            Some(&CapabilityValue::Number(31.0))
        );
    }

    #[test]
    fn test_profile_pass_runs_once() {
        let profile = curtain_profile();
        let mut state = CapabilityStateManager::with_allow_list([]);

        let added = state.ensure_profile_capabilities(&profile);
        assert_eq!(added, profile.capabilities.len());
        assert!(state.has_capability("windowcoverings_set"));
        assert!(state.has_capability("tilt"));

        assert_eq!(state.ensure_profile_capabilities(&profile), 0);

        state.begin_session();
        // Everything is already present
        assert_eq!(state.ensure_profile_capabilities(&profile), 0);
    }

    #[test]
    fn test_capabilities_sorted() {
        let mut state = CapabilityStateManager::new();
        state.add_capability_dynamically("onoff");
        state.add_capability_dynamically("dim");
        state.add_capability_dynamically("measure_power");
        let caps: Vec<&str> = state.capabilities().collect();
        assert_eq!(caps, vec!["dim", "measure_power", "onoff"]);
    }
}
