//! Event types for the narrator event system
//!
//! Provides shared event definitions and EventBus for the workspace.

mod playback_types;

pub use playback_types::{PlayerState, SessionStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Narration event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NarrationEvent {
    /// A new stream session was opened
    ///
    /// Emitted before any audio byte arrives, carrying the text-based estimate.
    SessionStarted {
        session_id: Uuid,
        /// Characters in the narration text
        text_chars: usize,
        /// Estimate derived from text length alone
        initial_estimate_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// A chunk was committed into the live buffer
    ChunkCommitted {
        session_id: Uuid,
        /// 1-based index of the committed chunk
        chunk_index: u64,
        /// Total bytes received so far in this session
        bytes_received: u64,
        /// Revised duration estimate after this chunk
        estimated_duration_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// Producer finished and every chunk was committed
    SessionCompleted {
        session_id: Uuid,
        bytes_received: u64,
        chunks_committed: u64,
        estimated_duration_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// Session aborted by a transport or append failure
    SessionFailed {
        session_id: Uuid,
        /// Committed bytes remain playable
        bytes_received: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Player state machine transition
    PlayerStateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
        timestamp: DateTime<Utc>,
    },

    /// Periodic playback progress
    ///
    /// Emitted on each media clock tick while playing.
    PlaybackProgress {
        session_id: Uuid,
        position_secs: f64,
        estimated_duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

impl NarrationEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            NarrationEvent::SessionStarted { .. } => "SessionStarted",
            NarrationEvent::ChunkCommitted { .. } => "ChunkCommitted",
            NarrationEvent::SessionCompleted { .. } => "SessionCompleted",
            NarrationEvent::SessionFailed { .. } => "SessionFailed",
            NarrationEvent::PlayerStateChanged { .. } => "PlayerStateChanged",
            NarrationEvent::PlaybackProgress { .. } => "PlaybackProgress",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast` so that every component emits
/// through the same channel and SSE clients can subscribe at any time.
pub struct EventBus {
    tx: broadcast::Sender<NarrationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// slowest subscriber starts lagging.
    ///
    /// # Examples
    ///
    /// ```
    /// use narrator_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<NarrationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: NarrationEvent,
    ) -> Result<usize, broadcast::error::SendError<NarrationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NarrationEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
