use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backend::{AudioBackend, DeviceSnapshot, HostApi};

/// Raw per-channel endpoints of multi-channel WDM-KS devices, e.g.
/// "Microphone 1 (Scarlett 2i2)". The aggregate endpoint carries the audio.
static RAW_CHANNEL_ENDPOINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^microphone \d+ \(").expect("raw channel endpoint pattern"));

/// Virtual endpoints that enumerate as inputs but never carry microphone
/// audio.
const VIRTUAL_ENDPOINTS: [&str; 5] = [
    "stereo mix",
    "system virtual",
    "loopback",
    "what u hear",
    "wave out mix",
];

/// Normalize a device name for dedup keying (never for display).
///
/// MME truncates names at ~31 characters, so the same hardware can enumerate
/// as "Microphone (Sennheiser USB headset)" under WASAPI and
/// "Microphone (Sennheiser USB head" under MME. Keeping everything through
/// the last `(` plus the first two words of the parenthetical collapses both
/// to "Microphone (Sennheiser USB". Idempotent.
pub(crate) fn normalize_device_name(name: &str) -> String {
    let mut normalized = name.trim().to_string();

    if let Some(last_paren) = normalized.rfind('(') {
        let prefix = &normalized[..=last_paren];
        let mut suffix = normalized[last_paren + 1..].trim_end();
        if let Some(stripped) = suffix.strip_suffix(')') {
            suffix = stripped.trim_end();
        }
        let words: Vec<&str> = suffix.split_whitespace().take(2).collect();
        normalized = format!("{}{}", prefix, words.join(" "));
    }

    // A name reduced to a dangling "(" keeps only its prefix.
    normalized.trim_end_matches('(').trim_end().to_string()
}

/// Endpoints that enumerate as inputs but should never be offered to the
/// user: virtual processing taps and raw WDM-KS channels.
pub(crate) fn is_problematic_endpoint(name: &str) -> bool {
    let lower = name.to_lowercase();

    if lower.starts_with("input (") {
        return true;
    }
    if VIRTUAL_ENDPOINTS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    RAW_CHANNEL_ENDPOINT.is_match(&lower)
}

/// Tie-break score for a host API family. WASAPI is the most reliable on
/// modern Windows, then DirectSound, MME, WDM-KS. Never persisted.
pub(crate) fn host_api_priority(api_name: &str) -> u32 {
    let api = api_name.to_lowercase();
    if api.contains("wasapi") {
        400
    } else if api.contains("directsound") {
        300
    } else if api.contains("mme") {
        200
    } else if api.contains("wdm-ks") || api.contains("ks") {
        100
    } else {
        50
    }
}

/// Three-key ordering used both for catalog dedup and resolver fallback:
/// more channels wins (1-channel variants of multi-channel hardware are
/// usually degraded), then host-API priority, then default sample rate.
pub(crate) fn outranks(
    candidate: &DeviceSnapshot,
    candidate_priority: u32,
    incumbent: &DeviceSnapshot,
    incumbent_priority: u32,
) -> bool {
    if candidate.max_input_channels != incumbent.max_input_channels {
        return candidate.max_input_channels > incumbent.max_input_channels;
    }
    if candidate_priority != incumbent_priority {
        return candidate_priority > incumbent_priority;
    }
    candidate.default_sample_rate > incumbent.default_sample_rate
}

/// Collapses the raw, API-duplicated device list into one canonical entry per
/// physical device.
pub struct DeviceCatalog {
    backend: Arc<dyn AudioBackend>,
}

impl DeviceCatalog {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self { backend }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn AudioBackend> {
        &self.backend
    }

    pub(crate) fn priority_of(&self, device: &DeviceSnapshot, apis: &[HostApi]) -> u32 {
        apis.iter()
            .find(|api| api.index == device.host_api)
            .map(|api| host_api_priority(&api.name))
            .unwrap_or(0)
    }

    /// One entry per physical device, each carrying its original display
    /// name, ordered by enumeration index.
    pub fn enumerate(&self) -> Vec<DeviceSnapshot> {
        let apis = self.backend.host_apis();
        let mut best: HashMap<String, DeviceSnapshot> = HashMap::new();

        for device in self.backend.input_devices() {
            if device.max_input_channels == 0 {
                continue;
            }
            if is_problematic_endpoint(&device.name) {
                tracing::trace!(device = %device.name, "filtered problematic endpoint");
                continue;
            }

            let key = normalize_device_name(&device.name);
            let candidate_priority = self.priority_of(&device, &apis);
            let replace = match best.get(&key) {
                None => true,
                Some(incumbent) => {
                    let incumbent_priority = self.priority_of(incumbent, &apis);
                    outranks(&device, candidate_priority, incumbent, incumbent_priority)
                }
            };
            if replace {
                best.insert(key, device);
            }
        }

        let mut devices: Vec<DeviceSnapshot> = best.into_values().collect();
        devices.sort_by_key(|d| d.index);
        devices
    }

    /// Direct raw-index lookup, pre-dedup. A stale index or an output-only
    /// device yields `None`, not an error.
    pub fn get_by_index(&self, index: usize) -> Option<DeviceSnapshot> {
        self.backend
            .input_devices()
            .into_iter()
            .find(|d| d.index == index && d.max_input_channels > 0)
    }

    /// Whether the index appears in the current deduplicated set.
    pub fn is_valid(&self, index: usize) -> bool {
        self.enumerate().iter().any(|d| d.index == index)
    }

    /// All input variants grouped by raw display name, pre-filter and
    /// pre-dedup. Diagnostic view of what each API exposes.
    pub fn variants(&self) -> BTreeMap<String, Vec<DeviceSnapshot>> {
        let mut groups: BTreeMap<String, Vec<DeviceSnapshot>> = BTreeMap::new();
        for device in self.backend.input_devices() {
            if device.max_input_channels == 0 {
                continue;
            }
            groups.entry(device.name.clone()).or_default().push(device);
        }
        groups
    }
}
