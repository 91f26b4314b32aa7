//! Error types for narrator-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Transport and append failures have their own enums because they travel
//! separately through the session loop before reaching the controller.

use thiserror::Error;

/// Stream open/read failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Request could not be sent or no response head arrived
    #[error("Failed to reach narration endpoint {url}: {message}")]
    Connect { url: String, message: String },

    /// Response arrived with a non-success status
    #[error("Narration endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body terminated abnormally after streaming started
    #[error("Narration stream interrupted after {bytes_received} bytes: {message}")]
    Interrupted { bytes_received: u64, message: String },
}

/// Buffer commit failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    /// Committing the chunk would exceed the buffer capacity
    #[error("Media buffer full: capacity {capacity} bytes, attempted {attempted} bytes")]
    BufferFull { capacity: u64, attempted: u64 },

    /// The decoder rejected data already committed to the buffer
    #[error("Media buffer rejected data: {0}")]
    Rejected(String),

    /// The buffer was torn down
    #[error("Media buffer detached")]
    Detached,

    /// An earlier append failed; the appender accepts no more chunks
    #[error("Appender aborted after a previous failure")]
    Aborted,
}

/// Main error type for narrator-player
#[derive(Error, Debug)]
pub enum Error {
    /// Stream open/read errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Buffer commit errors
    #[error("Append error: {0}")]
    Append(#[from] AppendError),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Narration request with nothing to say
    #[error("Narration text is empty")]
    EmptyNarration,

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Request parameters out of range
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Controller task is no longer running
    #[error("Playback controller has shut down")]
    ControllerClosed,

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server or client errors outside the narration stream
    #[error("HTTP error: {0}")]
    Http(String),

    /// Errors from the shared crate
    #[error(transparent)]
    Common(#[from] narrator_common::Error),
}

/// Convenience Result type using narrator-player Error
pub type Result<T> = std::result::Result<T, Error>;
