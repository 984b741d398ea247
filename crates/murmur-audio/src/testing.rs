//! In-crate test scaffolding: a scripted backend standing in for live
//! hardware.

use crate::backend::{AudioBackend, DeviceSnapshot, HostApi};

pub(crate) struct FakeBackend {
    apis: Vec<HostApi>,
    devices: Vec<DeviceSnapshot>,
    default_index: Option<usize>,
}

impl FakeBackend {
    pub fn with_apis(names: &[&str]) -> Self {
        Self {
            apis: names
                .iter()
                .enumerate()
                .map(|(index, name)| HostApi {
                    index,
                    name: name.to_string(),
                })
                .collect(),
            devices: Vec::new(),
            default_index: None,
        }
    }

    /// The PortAudio-style API table of a typical Windows box:
    /// 0 = MME, 1 = WASAPI, 2 = DirectSound, 3 = WDM-KS.
    pub fn windows_apis() -> Self {
        Self::with_apis(&[
            "MME",
            "Windows WASAPI",
            "Windows DirectSound",
            "Windows WDM-KS",
        ])
    }

    /// Append a device and return its enumeration index.
    pub fn add_device(&mut self, name: &str, channels: u16, sample_rate: f64, api: usize) -> usize {
        let index = self.devices.len();
        self.devices.push(DeviceSnapshot {
            index,
            name: name.to_string(),
            max_input_channels: channels,
            default_sample_rate: sample_rate,
            host_api: api,
        });
        index
    }

    pub fn set_default(&mut self, index: usize) {
        self.default_index = Some(index);
    }
}

impl AudioBackend for FakeBackend {
    fn host_apis(&self) -> Vec<HostApi> {
        self.apis.clone()
    }

    fn input_devices(&self) -> Vec<DeviceSnapshot> {
        self.devices.clone()
    }

    fn default_input_device(&self) -> Option<DeviceSnapshot> {
        self.default_index
            .and_then(|index| self.devices.get(index).cloned())
    }
}
