//! REST API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use camfleet_core::{
    settings_view, ApplicationKind, Device, DeviceId, FleetPage, FleetQuery, Foundness,
    GeometryError, GeometrySet, MoveDirection, Point, SettingView, SettingsMap, WifiError,
    WifiNetwork,
};
use camfleet_registry::{
    ops, FleetDevice, OpsError, PhotoError, PhotoPoller, PhotoState, RegistryError, WifiEditor,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::AppState;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

type Failure = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<Json<T>, Failure>;

fn failure(status: StatusCode, msg: impl Into<String>) -> Failure {
    (status, Json(ApiError::new(msg)))
}

fn registry_failure(e: RegistryError) -> Failure {
    let status = match &e {
        RegistryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        RegistryError::Status { .. }
        | RegistryError::ContractViolation { .. }
        | RegistryError::Transport(_)
        | RegistryError::Decode(_) => StatusCode::BAD_GATEWAY,
    };
    warn!(error = %e, status = %status, "Registry call failed");
    failure(status, e.to_string())
}

fn geometry_failure(e: GeometryError) -> Failure {
    failure(StatusCode::BAD_REQUEST, e.to_string())
}

fn wifi_failure(e: WifiError) -> Failure {
    let status = match &e {
        WifiError::EmptySsid => StatusCode::BAD_REQUEST,
        WifiError::NeedsConfirmation(_) => StatusCode::CONFLICT,
        WifiError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    failure(status, e.to_string())
}

fn ops_failure(e: OpsError) -> Failure {
    match e {
        OpsError::NoApplication(_) => failure(StatusCode::CONFLICT, e.to_string()),
        OpsError::Geometry(e) => geometry_failure(e),
        OpsError::Wifi(e) => wifi_failure(e),
        OpsError::Registry(e) => registry_failure(e),
    }
}

fn photo_failure(e: PhotoError) -> Failure {
    match e {
        PhotoError::Timeout { .. } => failure(StatusCode::GATEWAY_TIMEOUT, e.to_string()),
        PhotoError::Cancelled => failure(StatusCode::CONFLICT, "cancelled"),
        PhotoError::CaptureRequest(_) | PhotoError::Registry(_) => {
            warn!(error = %e, "Photo capture failed");
            failure(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

async fn load_device(state: &AppState, id: &str) -> Result<FleetDevice, Failure> {
    state
        .find_device(&DeviceId::from(id))
        .await
        .map_err(registry_failure)?
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "Device not found"))
}

fn require_kind(state: &AppState, device: &Device) -> Result<ApplicationKind, Failure> {
    state.classify(device).ok_or_else(|| {
        failure(
            StatusCode::CONFLICT,
            format!("Device {} has no application installed", device.id),
        )
    })
}

/// Device as presented to the dashboard
#[derive(Serialize)]
pub struct DeviceView {
    pub group_id: u64,
    pub client_id: String,
    pub foundness: Foundness,
    pub kind: Option<ApplicationKind>,
    pub kind_label: Option<String>,
    /// Whether the geometry editor applies to this device
    pub has_geometry: bool,
    #[serde(flatten)]
    pub device: Device,
}

fn device_view(state: &AppState, fleet_device: FleetDevice) -> DeviceView {
    let kind = state.classify(&fleet_device.device);
    DeviceView {
        group_id: fleet_device.group_id,
        client_id: fleet_device.device.client_id().to_string(),
        foundness: fleet_device.device.foundness(),
        kind,
        kind_label: kind.map(|k| k.label()),
        has_geometry: kind.is_some_and(|k| k.has_geometry()),
        device: fleet_device.device,
    }
}

/// List devices across all groups
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FleetQuery>,
) -> ApiResult<FleetPage<DeviceView>> {
    let devices = state.fleet.list_all(true).await.map_err(registry_failure)?;
    let page = query.apply(devices);
    Ok(Json(FleetPage {
        items: page
            .items
            .into_iter()
            .map(|d| device_view(&state, d))
            .collect(),
        total: page.total,
        page: page.page,
        pages: page.pages,
    }))
}

/// Get a specific device by ID
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<DeviceView> {
    let device = load_device(&state, &id).await?;
    Ok(Json(device_view(&state, device)))
}

#[derive(Serialize)]
pub struct SettingsResponse {
    pub kind: ApplicationKind,
    pub settings: Vec<SettingView>,
}

/// Effective settings with their source tier
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<SettingsResponse> {
    let device = load_device(&state, &id).await?;
    let kind = require_kind(&state, &device.device)?;
    let settings = device
        .device
        .act()
        .map(|act| settings_view(kind, &act.tiers()))
        .unwrap_or_default();
    Ok(Json(SettingsResponse { kind, settings }))
}

/// Save operator edits to the device-specific settings
pub async fn patch_settings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(edits): Json<SettingsMap>,
) -> ApiResult<Value> {
    let device = load_device(&state, &id).await?;
    let kind = require_kind(&state, &device.device)?;
    info!(device = %id, keys = edits.len(), "Settings save requested");

    let patch = ops::save_settings(state.client_for(&device), &device.device, kind, edits)
        .await
        .map_err(ops_failure)?;
    Ok(Json(json!({"status": "saved", "patch": patch})))
}

/// Decoded detection geometry
pub async fn get_geometry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<GeometrySet> {
    let device = load_device(&state, &id).await?;
    let kind = require_kind(&state, &device.device)?;
    Ok(Json(ops::current_geometry(&device.device, kind)))
}

/// Replace the detection geometry
pub async fn put_geometry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(geometry): Json<GeometrySet>,
) -> ApiResult<Value> {
    let device = load_device(&state, &id).await?;
    let kind = require_kind(&state, &device.device)?;
    info!(device = %id, items = geometry.len(), "Geometry save requested");

    let patch = ops::save_geometry(state.client_for(&device), &device.device, kind, &geometry)
        .await
        .map_err(ops_failure)?;
    Ok(Json(json!({"status": "saved", "patch": patch})))
}

#[derive(Deserialize)]
pub struct AddLineRequest {
    pub points: Vec<Point>,
}

/// Add one line and save; entry applications keep only the new line
pub async fn add_line(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddLineRequest>,
) -> ApiResult<GeometrySet> {
    let device = load_device(&state, &id).await?;
    let kind = require_kind(&state, &device.device)?;

    let geometry = ops::add_line(state.client_for(&device), &device.device, kind, req.points)
        .await
        .map_err(ops_failure)?;
    Ok(Json(geometry))
}

/// Capture a photo and wait for its URL
pub async fn capture_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let device = load_device(&state, &id).await?;
    let device_id = device.device.id.clone();

    let poller = PhotoPoller::new(state.schedule.clone());
    let cancel = CancellationToken::new();
    let _guard = state
        .begin_photo(&device_id, cancel.clone(), poller.subscribe())
        .ok_or_else(|| failure(StatusCode::CONFLICT, "Photo capture already in progress"))?;

    info!(device = %device_id, group = device.group_id, "Photo capture started");
    let url = poller
        .capture(state.client_for(&device), &device_id, &cancel)
        .await
        .map_err(photo_failure)?;
    Ok(Json(json!({ "url": url })))
}

/// State of the running capture
pub async fn photo_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<PhotoState> {
    Json(state.photo_state(&DeviceId::from(id.as_str())))
}

/// Cancel the running capture
pub async fn cancel_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    if state.cancel_photo(&DeviceId::from(id.as_str())) {
        Ok(Json(json!({"status": "cancelled", "device_id": id})))
    } else {
        Err(failure(StatusCode::NOT_FOUND, "No photo capture in progress"))
    }
}

#[derive(Serialize)]
pub struct WifiResponse {
    pub networks: Vec<WifiNetwork>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

fn wifi_response(editor: &WifiEditor, result: Option<Value>) -> Json<WifiResponse> {
    Json(WifiResponse {
        networks: editor.list().networks().to_vec(),
        result,
    })
}

/// Configured Wi-Fi networks in preference order
pub async fn get_wifi(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<WifiResponse> {
    let device = load_device(&state, &id).await?;
    Ok(wifi_response(&WifiEditor::for_device(&device.device), None))
}

#[derive(Deserialize)]
pub struct AddWifiRequest {
    pub ssid: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Operator confirmed overwriting an existing SSID
    #[serde(default)]
    pub overwrite: bool,
}

pub async fn add_wifi(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddWifiRequest>,
) -> ApiResult<WifiResponse> {
    let device = load_device(&state, &id).await?;
    let mut editor = WifiEditor::for_device(&device.device);
    let outcome = editor
        .add(
            state.client_for(&device),
            WifiNetwork::new(req.ssid, req.password),
            req.overwrite,
        )
        .await
        .map_err(ops_failure)?;
    Ok(wifi_response(&editor, serde_json::to_value(outcome).ok()))
}

/// `ssid` is a percent-encoded path segment, so `/` arrives as `%2F`
pub async fn remove_wifi(
    State(state): State<Arc<AppState>>,
    Path((id, ssid)): Path<(String, String)>,
) -> ApiResult<WifiResponse> {
    let device = load_device(&state, &id).await?;
    let mut editor = WifiEditor::for_device(&device.device);
    editor
        .remove(state.client_for(&device), &ssid)
        .await
        .map_err(ops_failure)?;
    Ok(wifi_response(&editor, None))
}

#[derive(Deserialize)]
pub struct MoveWifiRequest {
    pub direction: MoveDirection,
}

pub async fn move_wifi(
    State(state): State<Arc<AppState>>,
    Path((id, ssid)): Path<(String, String)>,
    Json(req): Json<MoveWifiRequest>,
) -> ApiResult<WifiResponse> {
    let device = load_device(&state, &id).await?;
    let mut editor = WifiEditor::for_device(&device.device);
    let moved = editor
        .move_ssid(state.client_for(&device), &ssid, req.direction)
        .await
        .map_err(ops_failure)?;
    Ok(wifi_response(&editor, Some(json!({ "moved": moved }))))
}

/// Get current configuration. Holds token sources only, never tokens.
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<crate::config::Config> {
    Json(state.config.clone())
}
