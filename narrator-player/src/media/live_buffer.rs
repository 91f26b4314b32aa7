//! Growable in-memory media buffer shared between the session task (writer)
//! and the decoder thread (readers).
//!
//! Readers block until the bytes they ask for have been committed, the stream
//! has ended, or the buffer has been detached. Dropping the writer without
//! calling `end_of_stream` ends the stream at whatever was committed, so a
//! failed session leaves its partial audio readable.

use super::MediaBuffer;
use crate::error::AppendError;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use symphonia::core::io::MediaSource;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    ended: bool,
    detached: bool,
    rejection: Option<String>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BufferState>,
    changed: Condvar,
    capacity: u64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // A panicking reader must not wedge the writer
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, BufferState>) -> MutexGuard<'a, BufferState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writer side of the live buffer
#[derive(Debug)]
pub struct LiveBuffer {
    shared: Arc<Shared>,
}

impl LiveBuffer {
    pub fn new(capacity: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BufferState::default()),
                changed: Condvar::new(),
                capacity,
            }),
        }
    }

    /// New reader positioned at byte 0
    pub fn reader(&self) -> LiveBufferReader {
        LiveBufferReader {
            shared: Arc::clone(&self.shared),
            position: 0,
        }
    }

}

#[async_trait]
impl MediaBuffer for LiveBuffer {
    async fn append(&mut self, chunk: Bytes) -> Result<(), AppendError> {
        let mut state = self.shared.lock();

        if state.detached {
            return Err(AppendError::Detached);
        }
        if let Some(reason) = &state.rejection {
            return Err(AppendError::Rejected(reason.clone()));
        }
        if state.ended {
            return Err(AppendError::Rejected(
                "append after end of stream".to_string(),
            ));
        }

        let attempted = state.data.len() as u64 + chunk.len() as u64;
        if attempted > self.shared.capacity {
            return Err(AppendError::BufferFull {
                capacity: self.shared.capacity,
                attempted,
            });
        }

        state.data.extend_from_slice(&chunk);
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn end_of_stream(&mut self) {
        let mut state = self.shared.lock();
        if !state.ended {
            state.ended = true;
            debug!(bytes = state.data.len(), "Live buffer ended");
        }
        drop(state);
        self.shared.changed.notify_all();
    }

    fn committed_bytes(&self) -> u64 {
        self.shared.lock().data.len() as u64
    }
}

impl Drop for LiveBuffer {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if !state.ended && !state.detached {
            debug!(
                bytes = state.data.len(),
                "Live buffer writer dropped before end of stream"
            );
            state.ended = true;
        }
        drop(state);
        self.shared.changed.notify_all();
    }
}

/// Blocking reader over a live buffer
///
/// Each reader has its own position. Cloning yields an independent reader at
/// the same position.
#[derive(Debug, Clone)]
pub struct LiveBufferReader {
    shared: Arc<Shared>,
    position: u64,
}

impl LiveBufferReader {
    /// Tear down the buffer: wakes blocked readers, fails further appends
    pub fn close(&self) {
        let mut state = self.shared.lock();
        state.detached = true;
        drop(state);
        self.shared.changed.notify_all();
    }

    /// Record that the committed data cannot be decoded
    ///
    /// The next append on the writer fails with `AppendError::Rejected`.
    pub fn reject(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "Live buffer data rejected");
        let mut state = self.shared.lock();
        state.rejection.get_or_insert(reason);
        drop(state);
        self.shared.changed.notify_all();
    }
}

impl Read for LiveBufferReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.shared.lock();
        loop {
            if state.detached {
                return Ok(0);
            }

            let len = state.data.len() as u64;
            if self.position < len {
                let start = self.position as usize;
                let n = buf.len().min(state.data.len() - start);
                buf[..n].copy_from_slice(&state.data[start..start + n]);
                self.position += n as u64;
                return Ok(n);
            }

            if state.ended {
                return Ok(0);
            }

            state = self.shared.wait(state);
        }
    }
}

impl Seek for LiveBufferReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => {
                // The end is unknown until the stream finishes
                let mut state = self.shared.lock();
                while !state.ended && !state.detached {
                    state = self.shared.wait(state);
                }
                state.data.len() as i128 + delta as i128
            }
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of live buffer",
            ));
        }

        self.position = target as u64;
        Ok(self.position)
    }
}

impl MediaSource for LiveBufferReader {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        let state = self.shared.lock();
        state.ended.then_some(state.data.len() as u64)
    }
}
