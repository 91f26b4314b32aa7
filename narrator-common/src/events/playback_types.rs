//! Playback-related type definitions
//!
//! Supporting types for the player state machine and the stream session
//! lifecycle.

use serde::{Deserialize, Serialize};

/// Player state as seen by the user
///
/// Transitions:
/// - Idle → Loading on the first play request
/// - Loading → Playing once the output can produce audio
/// - Playing ↔ Paused on user toggle
/// - Playing/Paused → Ended on natural completion of a fully streamed track
/// - any → Failed on transport or append error
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Failed,
}

impl PlayerState {
    /// True while a session exists and has not failed
    pub fn has_live_session(&self) -> bool {
        matches!(
            self,
            PlayerState::Loading | PlayerState::Playing | PlayerState::Paused | PlayerState::Ended
        )
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "idle"),
            PlayerState::Loading => write!(f, "loading"),
            PlayerState::Playing => write!(f, "playing"),
            PlayerState::Paused => write!(f, "paused"),
            PlayerState::Ended => write!(f, "ended"),
            PlayerState::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle of one fetch-and-buffer session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No request issued yet
    #[default]
    Idle,
    /// Request sent, no chunk received yet
    Loading,
    /// At least one chunk committed, producer still sending
    Streaming,
    /// Producer signalled end of stream and every chunk committed
    Complete,
    /// Transport or append failure; no further data will arrive
    Failed,
}

impl SessionStatus {
    /// Complete and Failed are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "idle"),
            SessionStatus::Loading => write!(f, "loading"),
            SessionStatus::Streaming => write!(f, "streaming"),
            SessionStatus::Complete => write!(f, "complete"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_state_serializes_lowercase() {
        let json = serde_json::to_string(&PlayerState::Loading).unwrap();
        assert_eq!(json, "\"loading\"");
        assert_eq!(PlayerState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_live_session_states() {
        assert!(!PlayerState::Idle.has_live_session());
        assert!(PlayerState::Loading.has_live_session());
        assert!(PlayerState::Ended.has_live_session());
        assert!(!PlayerState::Failed.has_live_session());
    }

    #[test]
    fn test_terminal_session_status() {
        assert!(SessionStatus::Complete.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::Streaming.is_terminal());
        assert_eq!(SessionStatus::default(), SessionStatus::Idle);
    }
}
