//! In-memory registry fake shared by the unit tests

use std::collections::VecDeque;
use std::sync::Mutex;

use camfleet_core::{ActPatch, Device, DeviceId, DevicePage, WifiNetwork};
use serde_json::{json, Value};

use crate::client::{DeviceApi, RegistryError};

#[derive(Debug, Clone)]
pub enum Call {
    List,
    Capture,
    Fetch,
    Patch(DeviceId, ActPatch),
    Wifi(DeviceId, Vec<WifiNetwork>),
}

#[derive(Debug)]
pub struct FakeApi {
    group_id: u64,
    page_size: u32,
    devices: Vec<Device>,
    capture_status: u16,
    wifi_status: u16,
    photos: Mutex<VecDeque<Result<Option<String>, RegistryError>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeApi {
    pub fn new(group_id: u64) -> Self {
        Self {
            group_id,
            page_size: 100,
            devices: Vec::new(),
            capture_status: 202,
            wifi_status: 200,
            photos: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_devices(mut self, devices: Vec<Device>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_capture_status(mut self, status: u16) -> Self {
        self.capture_status = status;
        self
    }

    pub fn with_wifi_status(mut self, status: u16) -> Self {
        self.wifi_status = status;
        self
    }

    /// Queue fetch results; an empty queue answers `Ok(None)`
    pub fn with_photos(self, photos: Vec<Result<Option<String>, RegistryError>>) -> Self {
        *self.photos.lock().unwrap() = photos.into();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn list_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::List))
    }

    pub fn fetch_calls(&self) -> usize {
        self.count(|c| matches!(c, Call::Fetch))
    }

    pub fn patches(&self) -> Vec<ActPatch> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Patch(_, p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn wifi_puts(&self) -> Vec<Vec<WifiNetwork>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Wifi(_, list) => Some(list),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl DeviceApi for FakeApi {
    fn group_id(&self) -> u64 {
        self.group_id
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn list_devices(
        &self,
        limit: u32,
        next: Option<&str>,
        _include_status: bool,
    ) -> Result<DevicePage, RegistryError> {
        self.record(Call::List);
        let start: usize = next.and_then(|n| n.parse().ok()).unwrap_or(0);
        let end = (start + limit as usize).min(self.devices.len());
        Ok(DevicePage {
            items: self.devices[start..end].to_vec(),
            total: self.devices.len() as u64,
            next: (end < self.devices.len()).then(|| end.to_string()),
        })
    }

    async fn request_photo_capture(&self, _device: &DeviceId) -> Result<(), RegistryError> {
        self.record(Call::Capture);
        if self.capture_status == 202 {
            Ok(())
        } else {
            Err(RegistryError::ContractViolation {
                expected: 202,
                actual: self.capture_status,
                body: String::new(),
            })
        }
    }

    async fn fetch_last_photo(&self, _device: &DeviceId) -> Result<Option<String>, RegistryError> {
        self.record(Call::Fetch);
        self.photos.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn patch_act(&self, device: &DeviceId, patch: &ActPatch) -> Result<(), RegistryError> {
        self.record(Call::Patch(device.clone(), patch.clone()));
        Ok(())
    }

    async fn replace_wifi_networks(
        &self,
        device: &DeviceId,
        networks: &[WifiNetwork],
    ) -> Result<(), RegistryError> {
        self.record(Call::Wifi(device.clone(), networks.to_vec()));
        if self.wifi_status >= 300 {
            return Err(RegistryError::Status {
                status: self.wifi_status,
                body: "rejected".into(),
            });
        }
        Ok(())
    }
}

pub fn device_with_act(id: &str, name: &str, act_id: u64, act_name: &str) -> Device {
    device_from(json!({
        "id": id,
        "device": {
            "id": id,
            "name": name,
            "hostname": format!("host-{}", id),
            "act": {"id": act_id, "name": act_name},
            "access_points": [{"ssid": "office"}, {"ssid": "backup"}]
        },
        "status": {"foundness": "Found"}
    }))
}

pub fn device_from(value: Value) -> Device {
    serde_json::from_value(value).unwrap()
}
