//! Instrumented media buffer and a test-driven playhead

use async_trait::async_trait;
use bytes::Bytes;
use narrator_player::audio::{MediaBackend, MediaPair, Playhead, PlayheadStatus};
use narrator_player::error::{AppendError, Error, Result};
use narrator_player::media::MediaBuffer;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// What an InstrumentedBuffer observed
#[derive(Debug, Default)]
pub struct BufferLog {
    pub committed: Vec<Bytes>,
    pub append_calls: usize,
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub ended: bool,
}

impl BufferLog {
    pub fn committed_bytes(&self) -> u64 {
        self.committed.iter().map(|c| c.len() as u64).sum()
    }
}

/// MediaBuffer that records every commit and how many overlapped
pub struct InstrumentedBuffer {
    log: Arc<Mutex<BufferLog>>,
    /// 1-based append call that is rejected
    reject_call: Option<usize>,
    append_delay: Duration,
}

impl InstrumentedBuffer {
    pub fn new() -> (Self, Arc<Mutex<BufferLog>>) {
        Self::with_options(None, Duration::ZERO)
    }

    pub fn with_options(
        reject_call: Option<usize>,
        append_delay: Duration,
    ) -> (Self, Arc<Mutex<BufferLog>>) {
        let log = Arc::new(Mutex::new(BufferLog::default()));
        let buffer = Self {
            log: Arc::clone(&log),
            reject_call,
            append_delay,
        };
        (buffer, log)
    }
}

#[async_trait]
impl MediaBuffer for InstrumentedBuffer {
    async fn append(&mut self, chunk: Bytes) -> std::result::Result<(), AppendError> {
        let call = {
            let mut log = self.log.lock().unwrap();
            log.append_calls += 1;
            log.in_flight += 1;
            log.max_in_flight = log.max_in_flight.max(log.in_flight);
            log.append_calls
        };

        if self.append_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.append_delay).await;
        }

        let mut log = self.log.lock().unwrap();
        log.in_flight -= 1;
        if self.reject_call == Some(call) {
            return Err(AppendError::Rejected(format!("chunk {} rejected", call)));
        }
        log.committed.push(chunk);
        Ok(())
    }

    fn end_of_stream(&mut self) {
        self.log.lock().unwrap().ended = true;
    }

    fn committed_bytes(&self) -> u64 {
        self.log.lock().unwrap().committed_bytes()
    }
}

#[derive(Debug)]
pub struct PlayheadControlState {
    pub playing: bool,
    pub position: f64,
    pub status: PlayheadStatus,
    pub seeks: Vec<f64>,
    pub dropped: bool,
}

/// Test-side handle to a ManualPlayhead
#[derive(Debug, Clone)]
pub struct PlayheadControl(Arc<Mutex<PlayheadControlState>>);

impl PlayheadControl {
    fn new(status: PlayheadStatus) -> Self {
        Self(Arc::new(Mutex::new(PlayheadControlState {
            playing: false,
            position: 0.0,
            status,
            seeks: Vec::new(),
            dropped: false,
        })))
    }

    pub fn set_status(&self, status: PlayheadStatus) {
        self.0.lock().unwrap().status = status;
    }

    pub fn set_position(&self, position: f64) {
        self.0.lock().unwrap().position = position;
    }

    pub fn position(&self) -> f64 {
        self.0.lock().unwrap().position
    }

    pub fn is_playing(&self) -> bool {
        self.0.lock().unwrap().playing
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.0.lock().unwrap().seeks.clone()
    }

    pub fn is_dropped(&self) -> bool {
        self.0.lock().unwrap().dropped
    }
}

/// Playhead whose status and position are set by the test
pub struct ManualPlayhead {
    control: PlayheadControl,
}

impl Playhead for ManualPlayhead {
    fn play(&mut self) {
        self.control.0.lock().unwrap().playing = true;
    }

    fn pause(&mut self) {
        self.control.0.lock().unwrap().playing = false;
    }

    fn seek(&mut self, position_secs: f64) {
        let mut state = self.control.0.lock().unwrap();
        state.position = position_secs;
        state.seeks.push(position_secs);
    }

    fn position_secs(&self) -> f64 {
        self.control.position()
    }

    fn status(&self) -> PlayheadStatus {
        self.control.0.lock().unwrap().status.clone()
    }
}

impl Drop for ManualPlayhead {
    fn drop(&mut self) {
        if let Ok(mut state) = self.control.0.lock() {
            state.dropped = true;
            state.playing = false;
        }
    }
}

/// Handles to the media created for one session
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub buffer: Arc<Mutex<BufferLog>>,
    pub playhead: PlayheadControl,
}

/// MediaBackend producing instrumented buffers and manual playheads
pub struct TestBackend {
    reject_call: Option<usize>,
    append_delay: Duration,
    fail_create: bool,
    sessions: Mutex<Vec<SessionRecord>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            reject_call: None,
            append_delay: Duration::ZERO,
            fail_create: false,
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Reject the given 1-based append call in every session
    pub fn rejecting_append(mut self, call: usize) -> Self {
        self.reject_call = Some(call);
        self
    }

    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = delay;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn last(&self) -> SessionRecord {
        self.sessions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no session was created")
    }
}

impl MediaBackend for TestBackend {
    fn create(&self, session_id: Uuid) -> Result<MediaPair> {
        if self.fail_create {
            return Err(Error::AudioOutput("no output device".to_string()));
        }

        let (buffer, log) = InstrumentedBuffer::with_options(self.reject_call, self.append_delay);
        let control = PlayheadControl::new(PlayheadStatus::Waiting);
        self.sessions.lock().unwrap().push(SessionRecord {
            session_id,
            buffer: log,
            playhead: control.clone(),
        });

        Ok(MediaPair {
            buffer: Box::new(buffer),
            playhead: Box::new(ManualPlayhead { control }),
        })
    }
}
