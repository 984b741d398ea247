use crate::backend::DeviceSnapshot;
use crate::catalog::{normalize_device_name, outranks, DeviceCatalog};
use crate::identity::DeviceIdentifier;

/// Re-identifies a persisted device choice against live hardware. Indices
/// shift between sessions, device names truncate differently per API, and
/// hardware comes and goes; resolution is exact-match-first with a fuzzy
/// fallback.
pub struct DeviceResolver {
    catalog: DeviceCatalog,
}

impl DeviceResolver {
    pub fn new(catalog: DeviceCatalog) -> Self {
        Self { catalog }
    }

    /// `None` means the device is gone — a recoverable condition; callers
    /// fall back to the system default input.
    pub fn resolve(&self, identifier: &DeviceIdentifier) -> Option<DeviceSnapshot> {
        let devices = self.catalog.enumerate();

        // Exact structural match wins outright.
        if let Some(exact) = devices
            .iter()
            .find(|d| DeviceIdentifier::for_device(d) == *identifier)
        {
            return Some(exact.clone());
        }

        // Fuzzy pass: same raw name, or same name after truncation-aware
        // normalization, ranked by the catalog's dedup ordering.
        let target = normalize_device_name(&identifier.name);
        let apis = self.catalog.backend().host_apis();
        let mut best: Option<(DeviceSnapshot, u32)> = None;
        for device in devices {
            if device.name != identifier.name && normalize_device_name(&device.name) != target {
                continue;
            }
            let priority = self.catalog.priority_of(&device, &apis);
            let better = match &best {
                None => true,
                Some((incumbent, incumbent_priority)) => {
                    outranks(&device, priority, incumbent, *incumbent_priority)
                }
            };
            if better {
                best = Some((device, priority));
            }
        }

        match best {
            Some((device, _)) => {
                tracing::info!(
                    wanted = %identifier.name,
                    matched = %device.name,
                    "resolved persisted device by name fallback"
                );
                Some(device)
            }
            None => {
                tracing::warn!(wanted = %identifier.name, "persisted device not found");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use std::sync::Arc;

    fn resolver(backend: FakeBackend) -> DeviceResolver {
        DeviceResolver::new(DeviceCatalog::new(Arc::new(backend)))
    }

    #[test]
    fn exact_match_survives_index_reshuffle() {
        let identifier = DeviceIdentifier {
            name: "Microphone (Scarlett 2i2)".to_string(),
            channels: 2,
            default_samplerate: 48_000.0,
        };

        // Session one: the device enumerates first.
        let mut before = FakeBackend::windows_apis();
        before.add_device("Microphone (Scarlett 2i2)", 2, 48_000.0, 1);
        before.add_device("Microphone (Jabra Evolve2)", 1, 16_000.0, 1);
        let found = resolver(before).resolve(&identifier).unwrap();
        assert_eq!(found.index, 0);

        // Session two: a driver reload pushed it to a different index.
        let mut after = FakeBackend::windows_apis();
        after.add_device("Microphone (Jabra Evolve2)", 1, 16_000.0, 1);
        after.add_device("Webcam Mic (Logitech C920)", 1, 32_000.0, 1);
        after.add_device("Microphone (Scarlett 2i2)", 2, 48_000.0, 1);
        let found = resolver(after).resolve(&identifier).unwrap();
        assert_eq!(found.index, 2);
        assert_eq!(DeviceIdentifier::for_device(&found), identifier);
    }

    #[test]
    fn truncated_name_falls_back_to_normalized_match() {
        // Persisted under MME's truncated name; today only the WASAPI
        // variant survives dedup.
        let identifier = DeviceIdentifier {
            name: "Microphone (Sennheiser USB head".to_string(),
            channels: 2,
            default_samplerate: 44_100.0,
        };

        let mut backend = FakeBackend::windows_apis();
        backend.add_device("Microphone (Sennheiser USB head", 2, 44_100.0, 0);
        backend.add_device("Microphone (Sennheiser USB headset)", 2, 48_000.0, 1);
        let found = resolver(backend).resolve(&identifier).unwrap();
        assert_eq!(found.name, "Microphone (Sennheiser USB headset)");
    }

    #[test]
    fn fallback_matches_when_identifier_fields_drift() {
        // A driver update changed the channel count, so the exact pass
        // misses; the name fallback still finds the deduplicated survivor
        // (the 3-channel variant outranks the degraded 1-channel one).
        let identifier = DeviceIdentifier {
            name: "Microphone (Yeti Stereo Microphone)".to_string(),
            channels: 2,
            default_samplerate: 44_100.0,
        };

        let mut backend = FakeBackend::windows_apis();
        backend.add_device("Microphone (Yeti Stereo", 1, 48_000.0, 1);
        backend.add_device("Microphone (Yeti Stereo Microphone)", 3, 48_000.0, 3);
        let found = resolver(backend).resolve(&identifier).unwrap();
        assert_eq!(found.max_input_channels, 3);
    }

    #[test]
    fn missing_device_resolves_to_none() {
        let identifier = DeviceIdentifier {
            name: "Microphone (Unplugged)".to_string(),
            channels: 1,
            default_samplerate: 44_100.0,
        };

        let mut backend = FakeBackend::windows_apis();
        backend.add_device("Microphone (Jabra Evolve2)", 1, 16_000.0, 1);
        assert!(resolver(backend).resolve(&identifier).is_none());
    }
}
