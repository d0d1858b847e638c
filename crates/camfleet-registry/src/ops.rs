//! Device operations: reconcile locally, then dispatch to the registry
//!
//! Saves are last-write-wins. The registry offers no version check, so a
//! concurrent edit by another operator between read and write is lost.

use camfleet_core::geometry::{LineKind, Point};
use camfleet_core::{
    decode_geometry, geometry_patch, settings_patch, ActPatch, AddOutcome, ApplicationKind,
    Device, DeviceId, GeometryError, GeometrySet, MoveDirection, SettingsMap, WifiError,
    WifiList, WifiNetwork,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{DeviceApi, RegistryError};

#[derive(Error, Debug)]
pub enum OpsError {
    #[error("Device {0} has no application installed")]
    NoApplication(DeviceId),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Wifi(#[from] WifiError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Merge `edits` over the device-specific settings and send them
pub async fn save_settings<A: DeviceApi>(
    api: &A,
    device: &Device,
    kind: ApplicationKind,
    edits: SettingsMap,
) -> Result<ActPatch, OpsError> {
    let act = device
        .act()
        .ok_or_else(|| OpsError::NoApplication(device.id.clone()))?;
    let edited = edits.len();
    let patch = settings_patch(act, kind, edits);
    api.patch_act(&device.id, &patch).await?;
    info!(device = %device.id, kind = ?kind, edited, "Saved device settings");
    Ok(patch)
}

/// Encode `geometry` for the device's application and send it
pub async fn save_geometry<A: DeviceApi>(
    api: &A,
    device: &Device,
    kind: ApplicationKind,
    geometry: &GeometrySet,
) -> Result<ActPatch, OpsError> {
    let act = device
        .act()
        .ok_or_else(|| OpsError::NoApplication(device.id.clone()))?;
    let patch = geometry_patch(act, kind, geometry)?;
    api.patch_act(&device.id, &patch).await?;
    info!(device = %device.id, kind = ?kind, items = geometry.len(), "Saved detection geometry");
    Ok(patch)
}

/// Current geometry stored on the device, decoded for `kind`
pub fn current_geometry(device: &Device, kind: ApplicationKind) -> GeometrySet {
    device
        .act()
        .map(|act| decode_geometry(kind, &act.device_specific_settings))
        .unwrap_or_default()
}

/// Add a line to the stored geometry and save. Entry applications keep a
/// single line, so the new one replaces any existing line.
pub async fn add_line<A: DeviceApi>(
    api: &A,
    device: &Device,
    kind: ApplicationKind,
    points: Vec<Point>,
) -> Result<GeometrySet, OpsError> {
    let line_kind = match kind {
        ApplicationKind::Traffic => LineKind::Traffic,
        ApplicationKind::Entry => LineKind::Entry,
        _ => return Err(GeometryError::Unsupported { found: "line" }.into()),
    };
    let mut geometry = current_geometry(device, kind);
    geometry.add_line(line_kind, points)?;
    save_geometry(api, device, kind, &geometry).await?;
    Ok(geometry)
}

/// Wi-Fi list of one device. Each edit computes the full list, replaces it
/// remotely, and only then updates the local copy.
#[derive(Debug, Clone)]
pub struct WifiEditor {
    device: DeviceId,
    list: WifiList,
}

impl WifiEditor {
    pub fn new(device: DeviceId, networks: Vec<WifiNetwork>) -> Self {
        Self {
            device,
            list: WifiList::new(networks),
        }
    }

    pub fn for_device(device: &Device) -> Self {
        Self::new(device.id.clone(), device.wifi_networks())
    }

    pub fn list(&self) -> &WifiList {
        &self.list
    }

    async fn commit<A: DeviceApi>(&mut self, api: &A, next: WifiList) -> Result<(), OpsError> {
        api.replace_wifi_networks(&self.device, next.networks())
            .await?;
        self.list = next;
        Ok(())
    }

    /// `confirmed` is the operator's consent to overwrite an existing SSID
    pub async fn add<A: DeviceApi>(
        &mut self,
        api: &A,
        network: WifiNetwork,
        confirmed: bool,
    ) -> Result<AddOutcome, OpsError> {
        let ssid = network.ssid.clone();
        let (next, outcome) = self.list.with_added(network, confirmed)?;
        self.commit(api, next).await?;
        info!(device = %self.device, ssid = %ssid, outcome = ?outcome, "Added Wi-Fi network");
        Ok(outcome)
    }

    pub async fn remove<A: DeviceApi>(&mut self, api: &A, ssid: &str) -> Result<(), OpsError> {
        let next = self.list.without(ssid)?;
        self.commit(api, next).await?;
        info!(device = %self.device, ssid = %ssid, "Removed Wi-Fi network");
        Ok(())
    }

    /// Returns `false` when the move falls off either end and nothing was sent
    pub async fn move_entry<A: DeviceApi>(
        &mut self,
        api: &A,
        index: usize,
        direction: MoveDirection,
    ) -> Result<bool, OpsError> {
        let Some(next) = self.list.with_moved(index, direction) else {
            debug!(device = %self.device, index, direction = ?direction, "Wi-Fi move out of range");
            return Ok(false);
        };
        self.commit(api, next).await?;
        Ok(true)
    }

    pub async fn move_ssid<A: DeviceApi>(
        &mut self,
        api: &A,
        ssid: &str,
        direction: MoveDirection,
    ) -> Result<bool, OpsError> {
        let index = self
            .list
            .position(ssid)
            .ok_or_else(|| WifiError::NotFound(ssid.to_string()))?;
        self.move_entry(api, index, direction).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{device_from, device_with_act, FakeApi};
    use serde_json::{json, Value};

    fn ssids(list: &[WifiNetwork]) -> Vec<&str> {
        list.iter().map(|n| n.ssid.as_str()).collect()
    }

    fn edits(value: Value) -> SettingsMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn traffic_device() -> Device {
        device_from(json!({
            "id": "cam-1",
            "device": {
                "id": "cam-1",
                "name": "Front",
                "act": {
                    "id": 9917,
                    "name": "WalkerInsight",
                    "device_specific_settings": {"detection_lines": "0,0,10,10", "fps": 5}
                }
            }
        }))
    }

    #[tokio::test]
    async fn test_save_settings_sends_reconciled_patch() {
        let api = FakeApi::new(1);
        let patch = save_settings(
            &api,
            &traffic_device(),
            ApplicationKind::Traffic,
            edits(json!({"rotation": 180})),
        )
        .await
        .unwrap();

        assert_eq!(api.patches(), vec![patch.clone()]);
        let sent = serde_json::to_value(&patch).unwrap();
        assert_eq!(sent["act_id"], json!(9917));
        assert_eq!(sent["device_specific_settings"]["fps"], json!(5));
        assert_eq!(sent["device_specific_settings"]["rotation"], json!(180));
        assert_eq!(sent["device_specific_settings"]["model"], json!("body"));
    }

    #[tokio::test]
    async fn test_device_without_act() {
        let api = FakeApi::new(1);
        let bare = device_from(json!({"id": "x", "device": {"id": "x"}}));
        let err = save_settings(&api, &bare, ApplicationKind::Traffic, SettingsMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::NoApplication(_)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_traffic_line_appends() {
        let api = FakeApi::new(1);
        let geometry = add_line(
            &api,
            &traffic_device(),
            ApplicationKind::Traffic,
            vec![Point::new(20.0, 20.0), Point::new(40.0, 40.0)],
        )
        .await
        .unwrap();
        assert_eq!(geometry.len(), 2);
        let sent = api.patches();
        assert_eq!(
            sent[0].settings()["detection_lines"],
            json!("0,0,10,10:20,20,40,40")
        );
    }

    #[tokio::test]
    async fn test_invalid_geometry_sends_nothing() {
        let api = FakeApi::new(1);
        let err = add_line(
            &api,
            &traffic_device(),
            ApplicationKind::Traffic,
            vec![Point::new(1.0, 1.0)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OpsError::Geometry(GeometryError::TooFewLinePoints(1))));
        assert!(api.patches().is_empty());
    }

    #[tokio::test]
    async fn test_line_on_dwell_app_rejected() {
        let api = FakeApi::new(1);
        let device = device_with_act("d", "Dwell cam", 9916, "滞在計測");
        let err = add_line(
            &api,
            &device,
            ApplicationKind::Dwell,
            vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OpsError::Geometry(GeometryError::Unsupported { .. })));
    }

    #[tokio::test]
    async fn test_wifi_add_and_overwrite() {
        let api = FakeApi::new(1);
        let device = device_with_act("d", "Shop", 9917, "x");
        let mut editor = WifiEditor::for_device(&device);

        let outcome = editor
            .add(&api, WifiNetwork::new("guest", Some("pw".into())), false)
            .await
            .unwrap();
        assert_eq!(outcome, AddOutcome::Appended { index: 2 });

        let err = editor
            .add(&api, WifiNetwork::new("office", Some("new".into())), false)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Wifi(WifiError::NeedsConfirmation(_))));
        assert_eq!(api.wifi_puts().len(), 1);

        editor
            .add(&api, WifiNetwork::new("office", Some("new".into())), true)
            .await
            .unwrap();
        let puts = api.wifi_puts();
        assert_eq!(ssids(&puts[1]), vec!["office", "backup", "guest"]);
        assert_eq!(puts[1][0].password.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_failed_put_leaves_list_unchanged() {
        let api = FakeApi::new(1).with_wifi_status(500);
        let device = device_with_act("d", "Shop", 9917, "x");
        let mut editor = WifiEditor::for_device(&device);

        let err = editor.remove(&api, "office").await.unwrap_err();
        assert!(matches!(err, OpsError::Registry(RegistryError::Status { status: 500, .. })));
        assert_eq!(ssids(editor.list().networks()), vec!["office", "backup"]);
    }

    #[tokio::test]
    async fn test_wifi_move_out_of_range_is_noop() {
        let api = FakeApi::new(1);
        let device = device_with_act("d", "Shop", 9917, "x");
        let mut editor = WifiEditor::for_device(&device);

        assert!(!editor.move_ssid(&api, "office", MoveDirection::Up).await.unwrap());
        assert!(api.wifi_puts().is_empty());

        assert!(editor.move_ssid(&api, "office", MoveDirection::Down).await.unwrap());
        assert_eq!(ssids(editor.list().networks()), vec!["backup", "office"]);

        let err = editor
            .move_ssid(&api, "missing", MoveDirection::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Wifi(WifiError::NotFound(_))));
    }
}
