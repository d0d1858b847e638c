//! Device types as reported by the device registry
//!
//! The registry owns these records; camfleet only holds them for the
//! duration of a request. Deserialization is deliberately lenient: fields the
//! registry leaves out or sends as `null` fall back to defaults, and
//! unparseable timestamps become `None` instead of failing a whole page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::settings::{SettingsMap, SettingsTiers};
use crate::wifi::WifiNetwork;

/// Registry-assigned device identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Liveness tri-state reported by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Foundness {
    /// Device is reachable
    Found,
    /// Device has stopped reporting
    Lost,
    /// Not reported, or a value this version does not know
    #[default]
    #[serde(other)]
    Unknown,
}

/// Application ("act") installed on a device, with its three settings tiers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Act {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Template defaults for the application type
    #[serde(default, deserialize_with = "null_as_default")]
    pub base_settings: SettingsMap,
    /// Application-level overrides
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings: SettingsMap,
    /// Per-device overrides
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_specific_settings: SettingsMap,
}

impl Act {
    /// Borrow the three tiers in resolution order
    pub fn tiers(&self) -> SettingsTiers<'_> {
        SettingsTiers {
            device_specific: &self.device_specific_settings,
            settings: &self.settings,
            base_settings: &self.base_settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub ssid: String,
}

/// Static device record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hostname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mac_addr: String,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub host_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_os_booted_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub foundness: Foundness,
    #[serde(default)]
    pub act: Option<Act>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub access_points: Vec<AccessPoint>,
}

/// Live status block, present when listing with `include_status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub foundness: Foundness,
    #[serde(default)]
    pub act_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connected_ssid: Option<String>,
    /// Signal strength in dBm
    #[serde(default)]
    pub signal_strength: Option<f64>,
    #[serde(default)]
    pub cpu_temperature: Option<f64>,
}

/// One entry of a device listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub device: DeviceRecord,
    #[serde(default)]
    pub status: Option<DeviceStatus>,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.device.name
    }

    pub fn act(&self) -> Option<&Act> {
        self.device.act.as_ref()
    }

    /// Tenant key; the dashboard keys clients by device hostname
    pub fn client_id(&self) -> &str {
        &self.device.hostname
    }

    /// Liveness, preferring the live status block over the static record
    pub fn foundness(&self) -> Foundness {
        match self.status.as_ref().map(|s| s.foundness) {
            Some(Foundness::Unknown) | None => self.device.foundness,
            Some(known) => known,
        }
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.status.as_ref().and_then(|s| s.last_updated)
    }

    /// Configured networks in preference order. The registry never returns
    /// passwords, so entries carry `password: None`.
    pub fn wifi_networks(&self) -> Vec<WifiNetwork> {
        self.device
            .access_points
            .iter()
            .map(|ap| WifiNetwork::open(&ap.ssid))
            .collect()
    }
}

/// One page of a device listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicePage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Device>,
    #[serde(default)]
    pub total: u64,
    /// Continuation cursor; `None` on the last page
    #[serde(default)]
    pub next: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }))
}
