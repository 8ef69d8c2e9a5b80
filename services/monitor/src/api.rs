//! HTTP intake and control API.

use crate::camera::MonitorRequest;
use crate::config::ApiConfig;
use crate::scheduler::{AdmissionScheduler, SchedulerStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<AdmissionScheduler>,
}

/// Body of `POST /set-cameras`
#[derive(Debug, Deserialize)]
pub struct SetCameraRequest {
    pub camera_id: i64,
    pub recorder_guid: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/set-cameras", post(set_cameras))
        .route("/stop-all", post(stop_all))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "camwatch-monitor"
    }))
}

async fn status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

/// Queue a camera for monitoring
async fn set_cameras(
    State(state): State<AppState>,
    Json(body): Json<SetCameraRequest>,
) -> (StatusCode, Json<MessageResponse>) {
    let request = MonitorRequest::new(body.camera_id, body.recorder_guid);
    let key = request.key();

    match state.scheduler.enqueue(request) {
        Ok(()) => {
            info!(camera = %key, "Monitor request accepted");
            (
                StatusCode::ACCEPTED,
                Json(MessageResponse {
                    message: format!("Camera {} queued for monitoring", key),
                }),
            )
        }
        Err(e) => {
            warn!(camera = %key, error = %e, "Monitor request rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(MessageResponse {
                    message: e.to_string(),
                }),
            )
        }
    }
}

async fn stop_all(State(state): State<AppState>) -> Json<MessageResponse> {
    let stopped = state.scheduler.stop_all();
    Json(MessageResponse {
        message: format!("Stop requested for {} sessions", stopped),
    })
}

/// Serve the API until `shutdown` resolves
pub async fn start_api_server<F>(state: AppState, config: &ApiConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);

    info!(address = %config.bind_address, "Starting intake API server");

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
