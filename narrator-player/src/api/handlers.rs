//! HTTP request handlers for the control API

use super::server::AppContext;
use crate::audio::output::AudioOutput;
use crate::error::Error;
use crate::playback::PlayerView;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    response::Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceListResponse {
    pub devices: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    /// Relative offset in seconds; negative seeks backward
    pub delta_secs: f64,
}

#[derive(Debug, Deserialize)]
pub struct RestartRequest {
    #[serde(default)]
    pub preserve_position: bool,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

type ApiResult = Result<Json<PlayerView>, (StatusCode, Json<StatusResponse>)>;

fn error_response(e: Error) -> (StatusCode, Json<StatusResponse>) {
    let status = match &e {
        Error::EmptyNarration | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::ControllerClosed => StatusCode::SERVICE_UNAVAILABLE,
        Error::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", e);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "narrator-player",
        "version": env!("CARGO_PKG_VERSION"),
        "git_hash": env!("NARRATOR_GIT_HASH"),
        "build_timestamp": env!("NARRATOR_BUILD_TIMESTAMP"),
        "port": ctx.port,
        "player_state": ctx.controller.view().state,
    }))
}

/// GET /player
pub async fn get_player(State(ctx): State<AppContext>) -> Json<PlayerView> {
    Json(ctx.controller.view())
}

/// POST /player/toggle
pub async fn toggle(State(ctx): State<AppContext>) -> ApiResult {
    ctx.controller
        .toggle_play_pause()
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /player/seek
pub async fn seek(State(ctx): State<AppContext>, Json(req): Json<SeekRequest>) -> ApiResult {
    ctx.controller
        .seek(req.delta_secs)
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /player/skip/forward
pub async fn skip_forward(State(ctx): State<AppContext>) -> ApiResult {
    ctx.controller
        .skip_forward()
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /player/skip/back
pub async fn skip_back(State(ctx): State<AppContext>) -> ApiResult {
    ctx.controller
        .skip_back()
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /player/restart
pub async fn restart(State(ctx): State<AppContext>, Json(req): Json<RestartRequest>) -> ApiResult {
    ctx.controller
        .restart(req.preserve_position)
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /player/text
pub async fn set_text(State(ctx): State<AppContext>, Json(req): Json<TextRequest>) -> ApiResult {
    ctx.controller
        .set_text(req.text)
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /player/report/today
///
/// Loads today's report from the backend and makes it the narration text.
pub async fn load_today_report(State(ctx): State<AppContext>) -> ApiResult {
    let Some(reports) = ctx.reports.as_ref() else {
        return Err(error_response(Error::InvalidState(
            "report endpoint is not configured".to_string(),
        )));
    };

    let text = reports
        .fetch_narration_text()
        .await
        .map_err(error_response)?;
    info!(chars = text.chars().count(), "Narration text loaded from today's report");

    ctx.controller
        .set_text(text)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /audio/devices - output devices usable as `playback.output_device`
pub async fn list_audio_devices() -> Result<Json<DeviceListResponse>, (StatusCode, Json<StatusResponse>)> {
    let devices = AudioOutput::list_devices().map_err(error_response)?;
    info!("Found {} audio devices", devices.len());
    Ok(Json(DeviceListResponse { devices }))
}

/// GET /events - SSE stream of narration events
pub async fn event_stream(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    narrator_common::sse::event_sse_stream(ctx.events.subscribe())
}
