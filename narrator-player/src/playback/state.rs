//! Playback state and the read-only view published to observers

use narrator_common::events::{PlayerState, SessionStatus};
use narrator_common::human_time::format_progress;
use serde::Serialize;
use uuid::Uuid;

/// Mutable playback state owned by the controller
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackState {
    /// User intent: true while the user wants audio to play
    pub is_playing: bool,
    pub current_time_secs: f64,
    /// Playback requested but no audio available at the position yet
    pub is_loading: bool,
}

/// Snapshot rendered by the player view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub state: PlayerState,
    pub is_playing: bool,
    pub is_loading: bool,
    pub current_time_secs: f64,
    /// Upper-biased estimate; never decreases within a session
    pub estimated_duration_secs: f64,
    /// e.g. `0:12 / ~1:40`
    pub progress_label: String,
    pub buffered_bytes: u64,
    pub session_id: Option<Uuid>,
    pub session_status: SessionStatus,
    pub skip_enabled: bool,
    pub error: Option<String>,
}

impl PlayerView {
    pub(crate) fn new(
        state: PlayerState,
        playback: PlaybackState,
        estimated_duration_secs: f64,
    ) -> Self {
        Self {
            state,
            is_playing: playback.is_playing,
            is_loading: playback.is_loading,
            current_time_secs: playback.current_time_secs,
            estimated_duration_secs,
            progress_label: format_progress(
                playback.current_time_secs,
                estimated_duration_secs,
                true,
            ),
            buffered_bytes: 0,
            session_id: None,
            session_status: SessionStatus::Idle,
            skip_enabled: false,
            error: None,
        }
    }

    /// Fraction of the estimated duration played, in 0.0-1.0
    pub fn progress_fraction(&self) -> f64 {
        if self.estimated_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.current_time_secs / self.estimated_duration_secs).clamp(0.0, 1.0)
    }
}

impl Default for PlayerView {
    fn default() -> Self {
        Self::new(PlayerState::Idle, PlaybackState::default(), 0.0)
    }
}
