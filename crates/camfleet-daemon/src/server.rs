//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices", get(api::list_devices))
        .route("/api/devices/{id}", get(api::get_device))
        .route(
            "/api/devices/{id}/settings",
            get(api::get_settings).patch(api::patch_settings),
        )
        .route(
            "/api/devices/{id}/geometry",
            get(api::get_geometry).put(api::put_geometry),
        )
        .route("/api/devices/{id}/geometry/lines", post(api::add_line))
        .route(
            "/api/devices/{id}/photo",
            get(api::photo_state)
                .post(api::capture_photo)
                .delete(api::cancel_photo),
        )
        .route(
            "/api/devices/{id}/wifi",
            get(api::get_wifi).post(api::add_wifi),
        )
        .route(
            "/api/devices/{id}/wifi/{ssid}",
            delete(api::remove_wifi),
        )
        .route("/api/devices/{id}/wifi/{ssid}/move", post(api::move_wifi))
        .route("/api/config", get(api::get_config))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the REST API until the process is stopped
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, "Starting REST API");
    axum::serve(listener, app).await?;
    Ok(())
}
