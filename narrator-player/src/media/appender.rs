//! Ordered, one-at-a-time commit of chunks into a media buffer
//!
//! Chunks are queued and drained in arrival order. At most one commit is in
//! flight; the next starts only after the previous has resolved. The first
//! failed commit poisons the appender: pending chunks are discarded and every
//! later call fails with `AppendError::Aborted`.

use super::MediaBuffer;
use crate::error::AppendError;
use bytes::Bytes;
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

pub struct BufferAppender {
    buffer: Box<dyn MediaBuffer>,
    pending: VecDeque<Bytes>,
    append_in_flight: bool,
    committed_chunks: u64,
    failed: bool,
    finished: bool,
}

impl BufferAppender {
    pub fn new(buffer: Box<dyn MediaBuffer>) -> Self {
        Self {
            buffer,
            pending: VecDeque::new(),
            append_in_flight: false,
            committed_chunks: 0,
            failed: false,
            finished: false,
        }
    }

    /// Queue a chunk and commit everything queued, in order.
    ///
    /// Resolves once the queue is drained. Empty chunks are ignored.
    pub async fn append_chunk(&mut self, chunk: Bytes) -> Result<(), AppendError> {
        self.check_usable()?;
        if chunk.is_empty() {
            trace!("Ignoring empty chunk");
            return Ok(());
        }
        self.pending.push_back(chunk);
        self.drain().await
    }

    /// Commit remaining chunks, then signal end of stream
    pub async fn finish(&mut self) -> Result<(), AppendError> {
        self.check_usable()?;
        self.drain().await?;
        if !self.finished {
            self.finished = true;
            self.buffer.end_of_stream();
            debug!(
                chunks = self.committed_chunks,
                bytes = self.buffer.committed_bytes(),
                "All chunks committed, end of stream signalled"
            );
        }
        Ok(())
    }

    async fn drain(&mut self) -> Result<(), AppendError> {
        while let Some(chunk) = self.pending.pop_front() {
            let len = chunk.len();
            self.append_in_flight = true;
            let result = self.buffer.append(chunk).await;
            self.append_in_flight = false;

            if let Err(e) = result {
                warn!(
                    error = %e,
                    committed_chunks = self.committed_chunks,
                    discarded = self.pending.len(),
                    "Chunk commit failed, aborting appender"
                );
                self.failed = true;
                self.pending.clear();
                return Err(e);
            }

            self.committed_chunks += 1;
            trace!(chunk = self.committed_chunks, len, "Chunk committed");
        }
        Ok(())
    }

    fn check_usable(&mut self) -> Result<(), AppendError> {
        if self.append_in_flight {
            // A previous commit was cancelled mid-flight; buffer contents are unknown
            self.failed = true;
            self.append_in_flight = false;
            self.pending.clear();
        }
        if self.failed {
            return Err(AppendError::Aborted);
        }
        if self.finished {
            return Err(AppendError::Rejected(
                "append after end of stream".to_string(),
            ));
        }
        Ok(())
    }

    pub fn committed_chunks(&self) -> u64 {
        self.committed_chunks
    }

    pub fn committed_bytes(&self) -> u64 {
        self.buffer.committed_bytes()
    }

    pub fn pending_chunks(&self) -> usize {
        self.pending.len()
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
