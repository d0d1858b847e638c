//! Application state management

use anyhow::Result;
use camfleet_core::{ApplicationKind, Device, DeviceId, KindRules};
use camfleet_registry::{
    Fleet, FleetDevice, PhotoState, PollSchedule, RegistryClient, RegistryError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;

/// A photo capture currently running for one device
struct ActivePhoto {
    cancel: CancellationToken,
    state: watch::Receiver<PhotoState>,
}

/// Shared application state
pub struct AppState {
    /// Group clients and routing
    pub fleet: Fleet<RegistryClient>,
    /// Application classification rules
    pub kinds: KindRules,
    /// Photo polling schedule
    pub schedule: PollSchedule,
    /// Configuration
    pub config: Config,
    /// In-flight photo captures, at most one per device
    active_photos: Mutex<HashMap<DeviceId, ActivePhoto>>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let timeout = Duration::from_secs(config.registry.request_timeout_secs);
        let clients = config
            .group_credentials()?
            .into_iter()
            .map(|credentials| {
                Ok(RegistryClient::new(&config.registry.base_url, credentials, timeout)?
                    .with_page_size(config.registry.page_size))
            })
            .collect::<Result<Vec<_>>>()?;

        let fleet = Fleet::new(clients, config.group_router()?)?;
        info!(
            groups = ?fleet.group_ids(),
            default_group = fleet.router().default_group(),
            "Registry clients ready"
        );

        Ok(Arc::new(Self {
            fleet,
            kinds: config.kind_rules(),
            schedule: config.poll_schedule(),
            config,
            active_photos: Mutex::new(HashMap::new()),
        }))
    }

    /// Look up a device across all groups
    pub async fn find_device(&self, id: &DeviceId) -> Result<Option<FleetDevice>, RegistryError> {
        self.fleet.find(id).await
    }

    pub fn client_for(&self, device: &FleetDevice) -> &RegistryClient {
        self.fleet.client_for(&device.device, Some(device.group_id))
    }

    /// Kind of the installed application, `None` without one
    pub fn classify(&self, device: &Device) -> Option<ApplicationKind> {
        device.act().map(|act| self.kinds.classify_act(act))
    }

    fn photos(&self) -> MutexGuard<'_, HashMap<DeviceId, ActivePhoto>> {
        self.active_photos
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a capture for `id`. `None` if one is already running.
    pub fn begin_photo(
        self: &Arc<Self>,
        id: &DeviceId,
        cancel: CancellationToken,
        state: watch::Receiver<PhotoState>,
    ) -> Option<PhotoGuard> {
        let mut photos = self.photos();
        if photos.contains_key(id) {
            return None;
        }
        photos.insert(id.clone(), ActivePhoto { cancel, state });
        debug!(device = %id, "Photo capture registered");
        Some(PhotoGuard {
            state: Arc::clone(self),
            id: id.clone(),
        })
    }

    /// Cancel the running capture for `id`. `false` if none is running.
    pub fn cancel_photo(&self, id: &DeviceId) -> bool {
        match self.photos().get(id) {
            Some(active) => {
                active.cancel.cancel();
                info!(device = %id, "Photo capture cancelled");
                true
            }
            None => false,
        }
    }

    /// State of the running capture, `Idle` when none is running
    pub fn photo_state(&self, id: &DeviceId) -> PhotoState {
        self.photos()
            .get(id)
            .map(|active| active.state.borrow().clone())
            .unwrap_or(PhotoState::Idle)
    }
}

/// Removes the capture entry when the request finishes or is dropped
pub struct PhotoGuard {
    state: Arc<AppState>,
    id: DeviceId,
}

impl Drop for PhotoGuard {
    fn drop(&mut self) {
        self.state.photos().remove(&self.id);
    }
}
