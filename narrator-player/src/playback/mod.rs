//! Playback control
//!
//! The controller drives one stream session at a time and publishes a
//! `PlayerView` whenever anything visible changes.

pub mod controller;
pub mod session;
pub mod state;

pub use controller::{ControllerSettings, PlaybackController};
pub use session::{consume_stream, SessionFailure, SessionHandle, SessionUpdate, StreamSession};
pub use state::{PlaybackState, PlayerView};
