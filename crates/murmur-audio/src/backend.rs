use cpal::traits::{DeviceTrait, HostTrait};
use murmur_foundation::AudioError;

/// One audio backend family (WASAPI, DirectSound, ALSA, ...) as reported by
/// the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct HostApi {
    pub index: usize,
    pub name: String,
}

/// Enumeration-time snapshot of one input endpoint. The `index` is volatile
/// and only meaningful within the session that produced it; persist a
/// `DeviceIdentifier` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub default_sample_rate: f64,
    pub host_api: usize,
}

/// Read-only view of the platform audio subsystem. The catalog and resolver
/// work purely on snapshots, so they can run against a fake in tests.
pub trait AudioBackend: Send + Sync {
    fn host_apis(&self) -> Vec<HostApi>;
    fn input_devices(&self) -> Vec<DeviceSnapshot>;
    fn default_input_device(&self) -> Option<DeviceSnapshot>;
}

/// Production backend over cpal. Every available host is walked so the same
/// physical device surfaces once per backend family, the way multi-API
/// platforms expose it.
pub struct CpalBackend;

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// Reopen the live cpal device behind a snapshot. Falls back to the
    /// system default input when the selection is absent or no longer
    /// present. Returns the device plus its native input channel count.
    pub(crate) fn open_input(
        &self,
        selection: Option<&DeviceSnapshot>,
    ) -> Result<(cpal::Device, u16), AudioError> {
        if let Some(selection) = selection {
            if let Some(device) = self.find_live(selection) {
                return Ok((device, selection.max_input_channels.max(1)));
            }
            tracing::warn!(
                device = %selection.name,
                "selected device not present; falling back to system default input"
            );
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::DeviceNotFound {
                name: selection.map(|s| s.name.clone()),
            })?;
        let channels = native_channel_count(&device);
        Ok((device, channels))
    }

    fn find_live(&self, selection: &DeviceSnapshot) -> Option<cpal::Device> {
        let hosts = cpal::available_hosts();
        let host_id = hosts.get(selection.host_api)?;
        let host = cpal::host_from_id(*host_id).ok()?;
        host.input_devices()
            .ok()?
            .find(|d| d.name().map(|n| n == selection.name).unwrap_or(false))
    }
}

impl AudioBackend for CpalBackend {
    fn host_apis(&self) -> Vec<HostApi> {
        cpal::available_hosts()
            .iter()
            .enumerate()
            .map(|(index, id)| HostApi {
                index,
                name: id.name().to_string(),
            })
            .collect()
    }

    fn input_devices(&self) -> Vec<DeviceSnapshot> {
        let mut snapshots = Vec::new();
        let mut index = 0usize;
        for (api_index, host_id) in cpal::available_hosts().into_iter().enumerate() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    tracing::debug!("host {} unavailable: {}", host_id.name(), e);
                    continue;
                }
            };
            let devices = match host.input_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    tracing::warn!(
                        "failed to enumerate input devices on {}: {}",
                        host_id.name(),
                        e
                    );
                    continue;
                }
            };
            for device in devices {
                // A fault reading one device's metadata skips that device
                // only; the index still advances so later indices line up
                // with the platform's numbering.
                if let Some(snapshot) = snapshot_device(&device, index, api_index) {
                    snapshots.push(snapshot);
                }
                index += 1;
            }
        }
        snapshots
    }

    fn default_input_device(&self) -> Option<DeviceSnapshot> {
        let default_host = cpal::default_host();
        let name = default_host.default_input_device()?.name().ok()?;
        let api_index = cpal::available_hosts()
            .iter()
            .position(|id| *id == default_host.id())?;
        self.input_devices()
            .into_iter()
            .find(|d| d.host_api == api_index && d.name == name)
    }
}

fn snapshot_device(device: &cpal::Device, index: usize, host_api: usize) -> Option<DeviceSnapshot> {
    let name = match device.name() {
        Ok(name) => name,
        Err(e) => {
            tracing::debug!("skipping device with unreadable name: {}", e);
            return None;
        }
    };
    let max_input_channels = match device.supported_input_configs() {
        Ok(configs) => configs.map(|c| c.channels()).max().unwrap_or(0),
        Err(e) => {
            tracing::debug!(device = %name, "skipping device without readable input configs: {}", e);
            return None;
        }
    };
    let default_sample_rate = device
        .default_input_config()
        .map(|c| c.sample_rate().0 as f64)
        .unwrap_or(0.0);
    Some(DeviceSnapshot {
        index,
        name,
        max_input_channels,
        default_sample_rate,
        host_api,
    })
}

fn native_channel_count(device: &cpal::Device) -> u16 {
    device
        .supported_input_configs()
        .ok()
        .and_then(|configs| configs.map(|c| c.channels()).max())
        .or_else(|| device.default_input_config().ok().map(|c| c.channels()))
        .unwrap_or(1)
        .max(1)
}
