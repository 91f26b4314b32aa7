//! Human-readable time formatting
//!
//! Clock-style display of playback positions and duration estimates.

/// Seconds at which the clock switches to the H:MM:SS form
const HOUR_FORMAT_MIN: u64 = 3600;

/// Format seconds as a playback clock.
///
/// - Below one hour: `M:SS`
/// - One hour and above: `H:MM:SS`
///
/// Fractions are truncated; negative and non-finite inputs display as `0:00`.
///
/// # Examples
///
/// ```
/// use narrator_common::human_time::format_clock;
///
/// assert_eq!(format_clock(0.0), "0:00");
/// assert_eq!(format_clock(75.9), "1:15");
/// assert_eq!(format_clock(3661.0), "1:01:01");
/// ```
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };

    if total >= HOUR_FORMAT_MIN {
        let hours = total / 3600;
        let mins = (total % 3600) / 60;
        let secs = total % 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", total / 60, total % 60)
    }
}

/// Format a position against a duration.
///
/// While the duration is still an estimate it is prefixed with `~`.
///
/// # Examples
///
/// ```
/// use narrator_common::human_time::format_progress;
///
/// assert_eq!(format_progress(12.0, 100.0, true), "0:12 / ~1:40");
/// assert_eq!(format_progress(12.0, 100.0, false), "0:12 / 1:40");
/// ```
pub fn format_progress(position_secs: f64, duration_secs: f64, estimated: bool) -> String {
    let marker = if estimated { "~" } else { "" };
    format!(
        "{} / {}{}",
        format_clock(position_secs),
        marker,
        format_clock(duration_secs)
    )
}
