//! # Narrator Player Library (narrator-player)
//!
//! Progressive playback of narrated text: audio is streamed from a TTS
//! endpoint chunk by chunk, committed in order into a live media buffer and
//! played while the rest is still being generated.
//!
//! **Architecture:** reqwest chunk fetcher -> ordered buffer appender ->
//! live buffer -> symphonia + rubato + cpal playhead, driven by a single
//! controller task and exposed over an axum control API.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod estimator;
pub mod fetcher;
pub mod media;
pub mod playback;
pub mod report;

pub use error::{Error, Result};
