//! Media buffering
//!
//! Chunks received from the narration stream are committed, strictly in
//! order, into an append-only media buffer that the audio pipeline reads
//! from while more data is still arriving.

pub mod appender;
pub mod live_buffer;

pub use appender::BufferAppender;
pub use live_buffer::{LiveBuffer, LiveBufferReader};

use crate::error::AppendError;
use async_trait::async_trait;
use bytes::Bytes;

/// Append-only buffer that accepts one chunk commit at a time
///
/// `append` takes `&mut self`, so a second commit cannot start before the
/// previous one has resolved.
#[async_trait]
pub trait MediaBuffer: Send {
    /// Commit a chunk after all previously committed ones
    async fn append(&mut self, chunk: Bytes) -> Result<(), AppendError>;

    /// Signal that no more chunks will arrive
    fn end_of_stream(&mut self);

    /// Total bytes committed so far
    fn committed_bytes(&self) -> u64;
}
