//! Named value transforms referenced by datapoint mappings
//!
//! Device families differ in how they encode the same idea, e.g. a curtain
//! motor reporting `0/1/2` for opening/stopped/closing. Instead of a type per
//! family, mappings name a transform and the codec looks it up here.

use std::collections::HashMap;
use tzbridge_core::CapabilityValue;

/// Decode direction: scaled wire value to capability value
pub type DecodeFn = fn(CapabilityValue) -> Option<CapabilityValue>;
/// Encode direction: capability value to unscaled wire value
pub type EncodeFn = fn(&CapabilityValue) -> Option<CapabilityValue>;

/// A pure transform with an optional inverse
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub decode: DecodeFn,
    pub encode: Option<EncodeFn>,
}

/// Registry of transforms by name
#[derive(Debug, Clone)]
pub struct TransformRegistry {
    entries: HashMap<String, Transform>,
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TransformRegistry {
    /// An empty registry
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry with every transform the built-in catalog uses
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "motor_state",
            Transform {
                decode: motor_state_decode,
                encode: Some(motor_state_encode),
            },
        );
        registry.register(
            "opening_mode",
            Transform {
                decode: opening_mode_decode,
                encode: Some(opening_mode_encode),
            },
        );
        registry.register(
            "presence",
            Transform {
                decode: presence_decode,
                encode: Some(presence_encode),
            },
        );
        registry.register(
            "invert_percent",
            Transform {
                decode: invert_percent,
                encode: Some(invert_percent_ref),
            },
        );
        registry
    }

    pub fn register(&mut self, name: &str, transform: Transform) {
        self.entries.insert(name.to_string(), transform);
    }

    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

/// Motor state enum: 0 opening, 1 stopped, 2 closing. Anything else reads as stopped.
fn motor_state_decode(value: CapabilityValue) -> Option<CapabilityValue> {
    let state = match value.as_f64() {
        Some(n) if n == 0.0 => "up",
        Some(n) if n == 2.0 => "down",
        _ => "idle",
    };
    Some(CapabilityValue::from(state))
}

fn motor_state_encode(value: &CapabilityValue) -> Option<CapabilityValue> {
    let n = match value.as_str()? {
        "up" => 0.0,
        "idle" | "stop" => 1.0,
        "down" => 2.0,
        _ => return None,
    };
    Some(CapabilityValue::Number(n))
}

/// Opening mode: 0 is the tilt side (half open), 1 is the lift side (fully open)
fn opening_mode_decode(value: CapabilityValue) -> Option<CapabilityValue> {
    match value.as_f64()? {
        n if n == 0.0 => Some(CapabilityValue::Number(0.5)),
        n if n == 1.0 => Some(CapabilityValue::Number(1.0)),
        _ => None,
    }
}

/// The 0.5 boundary belongs to the lift side
fn opening_mode_encode(value: &CapabilityValue) -> Option<CapabilityValue> {
    let n = value.as_f64()?;
    Some(CapabilityValue::Number(if n < 0.5 { 0.0 } else { 1.0 }))
}

fn presence_decode(value: CapabilityValue) -> Option<CapabilityValue> {
    value.as_bool().map(CapabilityValue::Bool)
}

fn presence_encode(value: &CapabilityValue) -> Option<CapabilityValue> {
    value
        .as_bool()
        .map(|b| CapabilityValue::Number(if b { 1.0 } else { 0.0 }))
}

fn invert_percent(value: CapabilityValue) -> Option<CapabilityValue> {
    invert_percent_ref(&value)
}

fn invert_percent_ref(value: &CapabilityValue) -> Option<CapabilityValue> {
    value.as_f64().map(|n| CapabilityValue::Number(1.0 - n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(name: &str, value: f64) -> Option<CapabilityValue> {
        let registry = TransformRegistry::builtin();
        (registry.get(name).unwrap().decode)(CapabilityValue::Number(value))
    }

    fn encode(name: &str, value: CapabilityValue) -> Option<CapabilityValue> {
        let registry = TransformRegistry::builtin();
        (registry.get(name).unwrap().encode.unwrap())(&value)
    }

    #[test]
    fn test_motor_state() {
        assert_eq!(decode("motor_state", 0.0), Some("up".into()));
        assert_eq!(decode("motor_state", 1.0), Some("idle".into()));
        assert_eq!(decode("motor_state", 2.0), Some("down".into()));
        assert_eq!(decode("motor_state", 7.0), Some("idle".into()));

        assert_eq!(encode("motor_state", "down".into()), Some(CapabilityValue::Number(2.0)));
        assert_eq!(encode("motor_state", "stop".into()), Some(CapabilityValue::Number(1.0)));
        assert_eq!(encode("motor_state", "sideways".into()), None);
    }

    #[test]
    fn test_opening_mode() {
        assert_eq!(decode("opening_mode", 0.0), Some(CapabilityValue::Number(0.5)));
        assert_eq!(decode("opening_mode", 1.0), Some(CapabilityValue::Number(1.0)));
        assert_eq!(decode("opening_mode", 3.0), None);

        assert_eq!(encode("opening_mode", 0.49.into()), Some(CapabilityValue::Number(0.0)));
        assert_eq!(encode("opening_mode", 0.5.into()), Some(CapabilityValue::Number(1.0)));
    }

    #[test]
    fn test_presence_and_invert() {
        assert_eq!(decode("presence", 2.0), Some(CapabilityValue::Bool(true)));
        assert_eq!(decode("presence", 0.0), Some(CapabilityValue::Bool(false)));
        assert_eq!(decode("invert_percent", 0.25), Some(CapabilityValue::Number(0.75)));
        assert_eq!(encode("invert_percent", 1.0.into()), Some(CapabilityValue::Number(0.0)));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = TransformRegistry::empty();
        assert!(!registry.contains("presence"));
        registry.register(
            "presence",
            Transform {
                decode: presence_decode,
                encode: None,
            },
        );
        assert!(registry.contains("presence"));
        assert!(registry.get("presence").unwrap().encode.is_none());
    }
}
