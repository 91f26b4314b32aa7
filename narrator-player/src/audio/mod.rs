//! Audio pipeline behind the playback controller
//!
//! A session's media is a pair: the buffer chunks are committed into, and the
//! playhead that renders whatever has been committed. The controller only
//! talks to the `Playhead` trait; the device implementation decodes the live
//! buffer with symphonia, resamples with rubato and plays through cpal.

pub mod decoder;
pub mod device;
pub mod output;
pub mod resampler;

pub use device::{DeviceBackend, DevicePlayhead, DeviceSettings};

use crate::error::Result;
use crate::media::MediaBuffer;
use uuid::Uuid;

/// Number of interleaved channels used inside the pipeline
pub const STEREO: usize = 2;

/// What the playhead can currently do at its position
#[derive(Debug, Clone, PartialEq)]
pub enum PlayheadStatus {
    /// No decoded audio at the current position yet
    Waiting,
    /// Audio is available (playing or ready to play)
    Ready,
    /// All committed audio has been played and the stream has ended
    Ended,
    /// The output or decoder failed; the playhead will not recover
    Faulted(String),
}

/// Underlying player for one session's buffer
///
/// Calls never block; the work happens on the playhead's own thread.
pub trait Playhead: Send {
    fn play(&mut self);

    fn pause(&mut self);

    /// Jump to an absolute position in seconds. The caller clamps.
    fn seek(&mut self, position_secs: f64);

    fn position_secs(&self) -> f64;

    fn status(&self) -> PlayheadStatus;
}

/// Buffer and playhead for one session
pub struct MediaPair {
    pub buffer: Box<dyn MediaBuffer>,
    pub playhead: Box<dyn Playhead>,
}

/// Creates the media pair for each new session
pub trait MediaBackend: Send + Sync {
    fn create(&self, session_id: Uuid) -> Result<MediaPair>;
}

/// Single stereo output frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn scaled(self, volume: f32) -> Self {
        Self {
            left: (self.left * volume).clamp(-1.0, 1.0),
            right: (self.right * volume).clamp(-1.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_applies_volume_and_clamps() {
        let frame = AudioFrame {
            left: 1.0,
            right: -0.4,
        };
        assert_eq!(
            frame.scaled(0.5),
            AudioFrame {
                left: 0.5,
                right: -0.2
            }
        );

        let loud = AudioFrame {
            left: 0.9,
            right: -0.9,
        };
        assert_eq!(
            loud.scaled(2.0),
            AudioFrame {
                left: 1.0,
                right: -1.0
            }
        );
    }
}

/// Short mono 22.05kHz MP3 of speech, 45 frames of 576 samples
#[cfg(test)]
pub(crate) fn speech_fixture() -> bytes::Bytes {
    let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/audio/speech_mono_22k.mp3");
    std::fs::read(&path)
        .unwrap_or_else(|e| panic!("missing fixture {:?}: {}", path, e))
        .into()
}
