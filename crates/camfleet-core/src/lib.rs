//! camfleet Core - Device model, settings codec and reconciliation
//!
//! This crate holds the pure logic of camfleet, with no I/O:
//! - Device and application types as reported by the registry
//! - Application classification by id and display name
//! - Three-tier settings resolution and typed per-kind settings
//! - Detection geometry and its flat per-application encoding
//! - Patch reconciliation with required defaults
//! - The ordered Wi-Fi credential list
//! - Fleet filtering, sorting and paging

pub mod codec;
pub mod device;
pub mod fleet;
pub mod geometry;
pub mod kind;
pub mod reconcile;
pub mod settings;
pub mod wifi;

pub use codec::{decode_geometry, encode_geometry, CodecError};
pub use device::{Act, Device, DeviceId, DevicePage, DeviceRecord, DeviceStatus, Foundness};
pub use fleet::{FleetPage, FleetQuery, SortField, SortOrder, StatusFilter};
pub use geometry::{DetectionGeometry, GeometryError, GeometrySet, LineKind, Point};
pub use kind::{ApplicationKind, IdRule, KindRules, NameRule};
pub use reconcile::{geometry_patch, reconcile, settings_patch, ActPatch};
pub use settings::{
    settings_view, ActSettings, SettingSource, SettingView, SettingsMap, SettingsTiers,
};
pub use wifi::{AddOutcome, MoveDirection, WifiError, WifiList, WifiNetwork};
