use serde::{Deserialize, Serialize};

use crate::backend::DeviceSnapshot;
use crate::catalog::DeviceCatalog;

/// Persistent identity of an input device. Numeric indices are reassigned
/// across OS sessions and driver reloads, so identity is the (name, channels,
/// default sample rate) triple and nothing else. This is the shape the
/// external settings store serializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentifier {
    pub name: String,
    pub channels: u16,
    pub default_samplerate: f64,
}

impl DeviceIdentifier {
    pub fn for_device(device: &DeviceSnapshot) -> Self {
        Self {
            name: device.name.clone(),
            channels: device.max_input_channels,
            default_samplerate: device.default_sample_rate,
        }
    }
}

/// On-disk device reference as found in legacy settings stores: old versions
/// persisted the raw device index, current ones the structured identifier.
/// Resolved into a canonical `DeviceIdentifier` once at load time; the
/// ambiguity never survives past that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersistedDeviceChoice {
    LegacyIndex(usize),
    Identifier(DeviceIdentifier),
}

impl PersistedDeviceChoice {
    /// A stale legacy index yields `None` (the caller forgets the choice and
    /// falls back to the system default).
    pub fn canonicalize(&self, catalog: &DeviceCatalog) -> Option<DeviceIdentifier> {
        match self {
            Self::Identifier(identifier) => Some(identifier.clone()),
            Self::LegacyIndex(index) => {
                let device = catalog.get_by_index(*index)?;
                tracing::info!(
                    index,
                    device = %device.name,
                    "migrated legacy device index to identifier"
                );
                Some(DeviceIdentifier::for_device(&device))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use std::sync::Arc;

    #[test]
    fn identifier_round_trips_through_json() {
        let identifier = DeviceIdentifier {
            name: "Microphone (Sennheiser USB headset)".to_string(),
            channels: 2,
            default_samplerate: 48_000.0,
        };
        let json = serde_json::to_string(&identifier).unwrap();
        let back: DeviceIdentifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identifier);
    }

    #[test]
    fn persisted_choice_parses_both_shapes() {
        let legacy: PersistedDeviceChoice = serde_json::from_str("7").unwrap();
        assert_eq!(legacy, PersistedDeviceChoice::LegacyIndex(7));

        let current: PersistedDeviceChoice = serde_json::from_str(
            r#"{"name": "Microphone (Jabra Evolve2)", "channels": 1, "default_samplerate": 16000.0}"#,
        )
        .unwrap();
        match current {
            PersistedDeviceChoice::Identifier(id) => {
                assert_eq!(id.name, "Microphone (Jabra Evolve2)");
                assert_eq!(id.channels, 1);
                assert_eq!(id.default_samplerate, 16_000.0);
            }
            other => panic!("expected identifier, got {other:?}"),
        }
    }

    #[test]
    fn legacy_index_canonicalizes_through_live_catalog() {
        let mut backend = FakeBackend::windows_apis();
        let index = backend.add_device("Microphone (Scarlett 2i2)", 2, 48_000.0, 1);
        let catalog = DeviceCatalog::new(Arc::new(backend));

        let choice = PersistedDeviceChoice::LegacyIndex(index);
        let identifier = choice.canonicalize(&catalog).unwrap();
        assert_eq!(identifier.name, "Microphone (Scarlett 2i2)");
        assert_eq!(identifier.channels, 2);

        let stale = PersistedDeviceChoice::LegacyIndex(42);
        assert_eq!(stale.canonicalize(&catalog), None);
    }
}
