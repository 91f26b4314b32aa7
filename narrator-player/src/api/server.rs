//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::playback::PlaybackController;
use crate::report::ReportClient;
use axum::{
    routing::{get, post},
    Router,
};
use narrator_common::events::EventBus;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: Arc<PlaybackController>,
    pub events: Arc<EventBus>,
    /// None disables `POST /player/report/today`
    pub reports: Option<Arc<ReportClient>>,
    pub port: u16,
}

/// Build the control router
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/player", get(super::handlers::get_player))
        .route("/player/toggle", post(super::handlers::toggle))
        .route("/player/seek", post(super::handlers::seek))
        .route("/player/skip/forward", post(super::handlers::skip_forward))
        .route("/player/skip/back", post(super::handlers::skip_back))
        .route("/player/restart", post(super::handlers::restart))
        .route("/player/text", post(super::handlers::set_text))
        .route("/player/report/today", post(super::handlers::load_today_report))
        .route("/audio/devices", get(super::handlers::list_audio_devices))
        .route("/events", get(super::handlers::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the control API until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.port));
    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("Control API stopped");
    Ok(())
}
