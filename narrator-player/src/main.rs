//! narrator-player - progressive TTS narration player
//!
//! Streams narration audio from the TTS backend and plays it while it is
//! still being generated. Controlled through a small HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use narrator_common::config::{load_toml, resolve_config_path};
use narrator_common::events::EventBus;
use narrator_player::api::{self, AppContext};
use narrator_player::audio::{DeviceBackend, DeviceSettings};
use narrator_player::config::PlayerConfig;
use narrator_player::fetcher::HttpStreamFetcher;
use narrator_player::playback::{ControllerSettings, PlaybackController};
use narrator_player::report::ReportClient;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither RUST_LOG nor the config sets one
const DEFAULT_LOG_FILTER: &str = "narrator_player=debug,tower_http=debug";

#[derive(Parser, Debug)]
#[command(name = "narrator-player")]
#[command(about = "Progressive TTS narration player")]
#[command(version)]
struct Args {
    /// HTTP control port
    #[arg(short, long, env = "NARRATOR_PORT")]
    port: Option<u16>,

    /// Base URL of the TTS backend
    #[arg(long, env = "NARRATOR_TTS_URL")]
    tts_url: Option<String>,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Narration text to load at startup
    #[arg(long, conflicts_with_all = ["text_file", "report"])]
    text: Option<String>,

    /// Read narration text from a file at startup
    #[arg(long, conflicts_with = "report")]
    text_file: Option<PathBuf>,

    /// Load today's report from the backend at startup
    #[arg(long)]
    report: bool,

    /// Start playback as soon as text is loaded
    #[arg(long)]
    autoplay: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Resolved before logging starts so the configured level can apply
    let config_path = resolve_config_path(args.config.as_deref(), "NARRATOR_CONFIG");
    let mut config: PlayerConfig =
        load_toml(config_path.as_deref()).context("Failed to load configuration")?;

    let default_filter = if config.logging.level == "info" {
        DEFAULT_LOG_FILTER.to_string()
    } else {
        config.logging.level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("No config file found, using built-in defaults"),
    }

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(url) = args.tts_url.clone() {
        config.endpoint.tts_base_url = url;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Starting narrator-player on port {} (TTS backend {})",
        config.port, config.endpoint.tts_base_url
    );

    let events = Arc::new(EventBus::default());
    let fetcher = HttpStreamFetcher::new(
        &config.endpoint.tts_base_url,
        config.endpoint.connect_timeout(),
    )
    .context("Failed to create narration fetcher")?;
    info!("Narration endpoint: {}", fetcher.endpoint_url());

    let reports = ReportClient::new(
        &config.endpoint.report_base_url,
        config.endpoint.connect_timeout(),
    )
    .context("Failed to create report client")?;

    let backend = DeviceBackend::new(DeviceSettings::from(&config.playback));
    let controller = Arc::new(PlaybackController::spawn(
        ControllerSettings::from(&config),
        Arc::new(fetcher),
        Arc::new(backend),
        Arc::clone(&events),
    ));

    let initial_text = if let Some(text) = args.text.clone() {
        Some(text)
    } else if let Some(path) = &args.text_file {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        )
    } else if args.report {
        Some(
            reports
                .fetch_narration_text()
                .await
                .context("Failed to load today's report")?,
        )
    } else {
        None
    };

    if let Some(text) = initial_text {
        controller
            .set_text(text)
            .await
            .context("Failed to load narration text")?;
        if args.autoplay {
            controller
                .toggle_play_pause()
                .await
                .context("Failed to start playback")?;
        }
    } else if args.autoplay {
        warn!("--autoplay ignored: no narration text given");
    }

    let ctx = AppContext {
        controller: Arc::clone(&controller),
        events,
        reports: Some(Arc::new(reports)),
        port: config.port,
    };

    api::run(ctx, shutdown_signal())
        .await
        .context("Control API failed")?;

    controller
        .shutdown()
        .await
        .context("Failed to stop playback controller")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
