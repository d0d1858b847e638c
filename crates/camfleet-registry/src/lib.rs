//! camfleet Registry - Device registry access
//!
//! This crate talks to the external device registry:
//! - An authenticated HTTP client per device group
//! - Routing of devices to the group that owns them
//! - Photo capture with scheduled polling and cancellation
//! - Settings, geometry and Wi-Fi operations built on the core reconciler

pub mod client;
pub mod ops;
pub mod photo;
pub mod routing;

#[cfg(test)]
mod testing;

pub use client::{DeviceApi, GroupCredentials, RegistryClient, RegistryError, DEFAULT_BASE_URL};
pub use ops::{OpsError, WifiEditor};
pub use photo::{Clock, PhotoError, PhotoPoller, PhotoState, PollSchedule, TokioClock};
pub use routing::{Fleet, FleetDevice, GroupRouter, GroupRule};
