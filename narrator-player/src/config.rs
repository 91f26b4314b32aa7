//! Configuration for narrator-player
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments (--port, --tts-url)
//! 2. Environment variables (NARRATOR_PORT, NARRATOR_TTS_URL, NARRATOR_CONFIG)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! Every field has a default, so a partial (or absent) TOML file is valid.

use crate::error::{Error, Result};
use crate::estimator::DurationEstimator;
use narrator_common::config::LoggingConfig;
use serde::Deserialize;
use std::time::Duration;

/// Default HTTP control port
pub const DEFAULT_PORT: u16 = 5750;

/// Default base URL of the backend serving /generate-tts and /reports/today
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Player configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// HTTP control server port
    pub port: u16,

    /// Backend endpoints
    pub endpoint: EndpointConfig,

    /// Playback behaviour
    pub playback: PlaybackConfig,

    /// Duration estimation rates
    pub estimator: DurationEstimator,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            endpoint: EndpointConfig::default(),
            playback: PlaybackConfig::default(),
            estimator: DurationEstimator::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Backend endpoint configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL for `POST /generate-tts`
    pub tts_base_url: String,

    /// Base URL for `GET /reports/today`
    pub report_base_url: String,

    /// Connection timeout. Streaming bodies have no overall timeout.
    pub connect_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            tts_base_url: DEFAULT_BACKEND_URL.to_string(),
            report_base_url: DEFAULT_BACKEND_URL.to_string(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl EndpointConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Playback behaviour configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Step for skip forward/back controls
    pub skip_step_secs: f64,

    /// Media clock tick interval
    pub position_tick_ms: u64,

    /// Live buffer capacity; appends beyond it fail with BufferFull
    pub max_buffer_bytes: u64,

    /// Output device name (None = system default)
    pub output_device: Option<String>,

    /// Output volume (0.0-1.0)
    pub volume: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            skip_step_secs: 15.0,
            position_tick_ms: 250,
            max_buffer_bytes: 64 * 1024 * 1024,
            output_device: None,
            volume: 1.0,
        }
    }
}

impl PlaybackConfig {
    pub fn position_tick(&self) -> Duration {
        Duration::from_millis(self.position_tick_ms)
    }
}

impl PlayerConfig {
    /// Reject values that would make playback misbehave
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("endpoint.tts_base_url", &self.endpoint.tts_base_url),
            ("endpoint.report_base_url", &self.endpoint.report_base_url),
        ] {
            reqwest::Url::parse(url)
                .map_err(|e| Error::Config(format!("{} '{}' is not a valid URL: {}", name, url, e)))?;
        }

        if !(self.playback.skip_step_secs.is_finite() && self.playback.skip_step_secs > 0.0) {
            return Err(Error::Config(format!(
                "playback.skip_step_secs must be positive, got {}",
                self.playback.skip_step_secs
            )));
        }

        if self.playback.position_tick_ms < 10 {
            return Err(Error::Config(format!(
                "playback.position_tick_ms must be at least 10, got {}",
                self.playback.position_tick_ms
            )));
        }

        if self.playback.max_buffer_bytes == 0 {
            return Err(Error::Config(
                "playback.max_buffer_bytes must be non-zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.playback.volume) {
            return Err(Error::Config(format!(
                "playback.volume must be within 0.0-1.0, got {}",
                self.playback.volume
            )));
        }

        if !self.estimator.is_valid() {
            return Err(Error::Config(format!(
                "estimator rates must be positive: {:?}",
                self.estimator
            )));
        }

        Ok(())
    }
}
