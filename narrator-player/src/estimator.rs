//! Duration estimation for a narration whose length is not yet known
//!
//! Two sources feed the estimate:
//! - the narration text, before any audio exists, so the view never shows
//!   an unknown duration;
//! - the number of bytes received, once streaming starts, scaled upward by a
//!   safety factor so the displayed duration does not shrink below the
//!   remaining content before the stream completes.
//!
//! The estimator is stateless: callers pass the previous estimate back in,
//! which keeps the sequence of estimates non-decreasing.

use serde::Deserialize;
use tracing::trace;

/// Default speech rate in characters per second
pub const DEFAULT_CHARS_PER_SECOND: f64 = 5.0;

/// Default assumed encoded bytes per second of audio
pub const DEFAULT_BYTES_PER_SECOND: f64 = 16_000.0;

/// Default multiplier applied to the byte-derived estimate
pub const DEFAULT_SAFETY_FACTOR: f64 = 8.0;

/// Running duration estimator
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct DurationEstimator {
    pub chars_per_second: f64,
    pub bytes_per_second: f64,
    pub safety_factor: f64,
}

impl Default for DurationEstimator {
    fn default() -> Self {
        Self {
            chars_per_second: DEFAULT_CHARS_PER_SECOND,
            bytes_per_second: DEFAULT_BYTES_PER_SECOND,
            safety_factor: DEFAULT_SAFETY_FACTOR,
        }
    }
}

impl DurationEstimator {
    /// Estimate from text alone.
    ///
    /// Counts Unicode scalar values. The result is floored at one
    /// character's worth so that it is always strictly positive.
    pub fn estimate_from_text(&self, text: &str) -> f64 {
        let chars = text.chars().count().max(1);
        chars as f64 / self.chars_per_second
    }

    /// Revise an estimate with the bytes received so far.
    ///
    /// Returns `max(prior_estimate, bytes_received / bytes_per_second * safety_factor)`.
    pub fn refine(&self, bytes_received: u64, prior_estimate: f64) -> f64 {
        let from_bytes = self.estimate_from_bytes(bytes_received);
        if from_bytes < prior_estimate {
            trace!(
                bytes_received,
                from_bytes,
                prior_estimate,
                "Byte-derived estimate below prior, keeping prior"
            );
            prior_estimate
        } else {
            from_bytes
        }
    }

    /// Byte-derived estimate without the monotonic floor
    pub fn estimate_from_bytes(&self, bytes_received: u64) -> f64 {
        bytes_received as f64 / self.bytes_per_second * self.safety_factor
    }

    /// All rates must be finite and positive
    pub fn is_valid(&self) -> bool {
        [self.chars_per_second, self.bytes_per_second, self.safety_factor]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}
