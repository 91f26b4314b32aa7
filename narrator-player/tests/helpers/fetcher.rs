//! Scripted narration stream

use async_trait::async_trait;
use bytes::Bytes;
use narrator_player::error::TransportError;
use narrator_player::fetcher::{ChunkStream, NarrationRequest, StreamFetcher};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FetchStats {
    pub opens: AtomicUsize,
    /// Chunks handed to the consumer
    pub pulled: AtomicUsize,
    pub requests: Mutex<Vec<String>>,
}

/// StreamFetcher replaying the same chunks on every open
#[derive(Clone)]
pub struct ScriptedFetcher {
    chunks: Vec<Bytes>,
    /// Pull index (0-based) that fails instead of yielding a chunk
    fail_at: Option<(usize, TransportError)>,
    open_error: Option<TransportError>,
    open_delay: Duration,
    chunk_delay: Duration,
    stats: Arc<FetchStats>,
}

impl ScriptedFetcher {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks,
            fail_at: None,
            open_error: None,
            open_delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            stats: Arc::new(FetchStats::default()),
        }
    }

    pub fn failing_at(mut self, index: usize, error: TransportError) -> Self {
        self.fail_at = Some((index, error));
        self
    }

    pub fn with_open_error(mut self, error: TransportError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn opens(&self) -> usize {
        self.stats.opens.load(Ordering::SeqCst)
    }

    pub fn pulled(&self) -> usize {
        self.stats.pulled.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.stats.requests.lock().unwrap().clone()
    }

    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.len() as u64).sum()
    }
}

#[async_trait]
impl StreamFetcher for ScriptedFetcher {
    async fn open(
        &self,
        request: &NarrationRequest,
    ) -> Result<Box<dyn ChunkStream>, TransportError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.stats
            .requests
            .lock()
            .unwrap()
            .push(request.text().to_string());

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }

        Ok(Box::new(ScriptedStream {
            chunks: self.chunks.iter().cloned().collect(),
            next_index: 0,
            fail_at: self.fail_at.clone(),
            delay: self.chunk_delay,
            stats: Arc::clone(&self.stats),
            done: false,
        }))
    }
}

struct ScriptedStream {
    chunks: VecDeque<Bytes>,
    next_index: usize,
    fail_at: Option<(usize, TransportError)>,
    delay: Duration,
    stats: Arc<FetchStats>,
    done: bool,
}

#[async_trait]
impl ChunkStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.done {
            return Ok(None);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let index = self.next_index;
        self.next_index += 1;

        if let Some((at, error)) = &self.fail_at {
            if *at == index {
                self.done = true;
                return Err(error.clone());
            }
        }

        match self.chunks.pop_front() {
            Some(chunk) => {
                self.stats.pulled.fetch_add(1, Ordering::SeqCst);
                Ok(Some(chunk))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}
