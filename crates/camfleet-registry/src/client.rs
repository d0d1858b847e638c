//! HTTP client for the device registry
//!
//! One [`RegistryClient`] talks to one device group. Nothing is cached: every
//! call reflects what the registry holds at that moment.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use camfleet_core::{ActPatch, Device, DeviceId, DevicePage, WifiNetwork};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.actcast.io/v0";

/// Devices requested per listing page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Registry returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Registry broke its contract: expected status {expected}, got {actual}: {body}")]
    ContractViolation {
        expected: u16,
        actual: u16,
        body: String,
    },
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed registry response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Token and group id for one device group
#[derive(Clone)]
pub struct GroupCredentials {
    pub group_id: u64,
    pub token: String,
}

impl std::fmt::Debug for GroupCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupCredentials")
            .field("group_id", &self.group_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Registry operations used by the rest of camfleet. Implemented by
/// [`RegistryClient`] and by in-memory fakes in tests.
pub trait DeviceApi: Send + Sync {
    fn group_id(&self) -> u64;

    fn page_size(&self) -> u32 {
        DEFAULT_PAGE_SIZE
    }

    fn list_devices(
        &self,
        limit: u32,
        next: Option<&str>,
        include_status: bool,
    ) -> impl Future<Output = Result<DevicePage, RegistryError>> + Send;

    /// Ask the device to take a photo. Succeeds only on 202 Accepted.
    fn request_photo_capture(
        &self,
        device: &DeviceId,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// URL of the most recent photo, `None` while none is available
    fn fetch_last_photo(
        &self,
        device: &DeviceId,
    ) -> impl Future<Output = Result<Option<String>, RegistryError>> + Send;

    fn patch_act(
        &self,
        device: &DeviceId,
        patch: &ActPatch,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Replace the device's whole Wi-Fi list
    fn replace_wifi_networks(
        &self,
        device: &DeviceId,
        networks: &[WifiNetwork],
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;

    /// Follow `next` cursors until the listing is exhausted. Stops on an
    /// empty cursor or one that was already followed.
    fn list_all_devices(
        &self,
        include_status: bool,
    ) -> impl Future<Output = Result<Vec<Device>, RegistryError>> + Send {
        async move {
            let mut devices = Vec::new();
            let mut seen = HashSet::new();
            let mut cursor: Option<String> = None;
            loop {
                let page = self
                    .list_devices(self.page_size(), cursor.as_deref(), include_status)
                    .await?;
                devices.extend(page.items);
                match page.next {
                    Some(next) if !next.is_empty() && seen.insert(next.clone()) => {
                        cursor = Some(next)
                    }
                    Some(next) if !next.is_empty() => {
                        warn!(group = self.group_id(), cursor = %next, "Listing cursor repeated, stopping");
                        break;
                    }
                    _ => break,
                }
            }
            debug!(group = self.group_id(), count = devices.len(), "Listed devices");
            Ok(devices)
        }
    }
}

#[derive(Deserialize)]
struct PhotoEnvelope {
    #[serde(default)]
    photo: Option<PhotoBody>,
}

#[derive(Deserialize)]
struct PhotoBody {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
struct WifiBody<'a> {
    wifi_networks: &'a [WifiNetwork],
}

/// Client bound to a single device group
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: GroupCredentials,
    page_size: u32,
}

impl RegistryClient {
    pub fn new(
        base_url: &str,
        credentials: GroupCredentials,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            RegistryError::InvalidArgument(format!("invalid registry url {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidArgument(format!(
                "registry url {} cannot carry a path",
                base_url
            )));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            credentials,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// `{base}/groups/{group}/{segments..}`, each segment percent-encoded
    fn group_url(&self, segments: &[&str]) -> Url {
        let group = self.credentials.group_id.to_string();
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base urls
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("groups").push(&group).extend(segments);
        }
        url
    }

    fn device_url(&self, device: &DeviceId, suffix: &str) -> Result<Url, RegistryError> {
        if device.as_str().trim().is_empty() {
            return Err(RegistryError::InvalidArgument(
                "device id must not be empty".to_string(),
            ));
        }
        Ok(self.group_url(&["devices", device.as_str(), suffix]))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", self.credentials.token),
            )
            .header(reqwest::header::ACCEPT, "application/json")
    }
}

/// Turn a non-success response into `RegistryError::Status`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, "Registry request failed");
    Err(RegistryError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RegistryError> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}

impl DeviceApi for RegistryClient {
    fn group_id(&self) -> u64 {
        self.credentials.group_id
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn list_devices(
        &self,
        limit: u32,
        next: Option<&str>,
        include_status: bool,
    ) -> Result<DevicePage, RegistryError> {
        let url = self.group_url(&["devices"]);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(next) = next {
            query.push(("next", next.to_string()));
        }
        if include_status {
            query.push(("include_status", "1".to_string()));
        }

        debug!(group = self.credentials.group_id, limit, next = ?next, "Listing devices");
        let response = self
            .request(reqwest::Method::GET, url)
            .query(&query)
            .send()
            .await?;
        read_json(check_status(response).await?).await
    }

    async fn request_photo_capture(&self, device: &DeviceId) -> Result<(), RegistryError> {
        let url = self.device_url(device, "photo")?;
        let response = self.request(reqwest::Method::POST, url).send().await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            warn!(device = %device, status = %status, "Photo capture request not accepted");
            return Err(RegistryError::ContractViolation {
                expected: StatusCode::ACCEPTED.as_u16(),
                actual: status.as_u16(),
                body,
            });
        }

        info!(device = %device, group = self.credentials.group_id, "Photo capture requested");
        Ok(())
    }

    async fn fetch_last_photo(&self, device: &DeviceId) -> Result<Option<String>, RegistryError> {
        let url = self.device_url(device, "photo")?;
        let response = self.request(reqwest::Method::GET, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(device = %device, "No photo yet (404)");
            return Ok(None);
        }
        let envelope: PhotoEnvelope = read_json(check_status(response).await?).await?;
        let url = envelope
            .photo
            .and_then(|p| p.url)
            .filter(|u| !u.is_empty());
        debug!(device = %device, ready = url.is_some(), "Fetched last photo");
        Ok(url)
    }

    async fn patch_act(&self, device: &DeviceId, patch: &ActPatch) -> Result<(), RegistryError> {
        let url = self.device_url(device, "act")?;
        let response = self
            .request(reqwest::Method::PATCH, url)
            .json(patch)
            .send()
            .await?;
        check_status(response).await?;
        info!(
            device = %device,
            group = self.credentials.group_id,
            keys = patch.settings().len(),
            "Patched application settings"
        );
        Ok(())
    }

    async fn replace_wifi_networks(
        &self,
        device: &DeviceId,
        networks: &[WifiNetwork],
    ) -> Result<(), RegistryError> {
        let url = self.device_url(device, "wifi")?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&WifiBody {
                wifi_networks: networks,
            })
            .send()
            .await?;
        check_status(response).await?;
        info!(device = %device, count = networks.len(), "Replaced Wi-Fi networks");
        Ok(())
    }
}
