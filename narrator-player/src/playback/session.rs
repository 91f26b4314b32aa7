//! One playback session: a single narration stream feeding a single buffer
//!
//! The consumption loop pulls the next chunk only after the previous one has
//! been committed, so the network is read no faster than the buffer accepts
//! data. Progress travels to the controller as `SessionUpdate` messages.

use crate::audio::{MediaPair, Playhead};
use crate::error::{AppendError, TransportError};
use crate::estimator::DurationEstimator;
use crate::fetcher::{NarrationRequest, StreamFetcher};
use crate::media::BufferAppender;
use narrator_common::events::SessionStatus;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Progress of one stream session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSession {
    pub id: Uuid,
    pub status: SessionStatus,
    pub bytes_received: u64,
    pub bytes_committed: u64,
    pub chunks_committed: u64,
    /// Always positive; non-decreasing for the life of the session
    pub estimated_duration_secs: f64,
}

impl StreamSession {
    pub fn new(id: Uuid, initial_estimate_secs: f64) -> Self {
        Self {
            id,
            status: SessionStatus::Loading,
            bytes_received: 0,
            bytes_committed: 0,
            chunks_committed: 0,
            estimated_duration_secs: initial_estimate_secs,
        }
    }
}

/// Why a session stopped early
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Append(#[from] AppendError),
}

/// Message from a session task to the controller
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// Response accepted; chunks are about to flow
    Opened(StreamSession),
    ChunkCommitted(StreamSession),
    Completed(StreamSession),
    Failed {
        session: StreamSession,
        error: SessionFailure,
    },
}

impl SessionUpdate {
    pub fn session(&self) -> &StreamSession {
        match self {
            SessionUpdate::Opened(session)
            | SessionUpdate::ChunkCommitted(session)
            | SessionUpdate::Completed(session)
            | SessionUpdate::Failed { session, .. } => session,
        }
    }
}

/// Open the stream and commit every chunk, in order, one at a time.
///
/// Returns the final session state. Updates are best-effort: a closed update
/// channel does not stop consumption.
pub async fn consume_stream(
    mut session: StreamSession,
    request: NarrationRequest,
    fetcher: Arc<dyn StreamFetcher>,
    mut appender: BufferAppender,
    estimator: DurationEstimator,
    updates: mpsc::UnboundedSender<SessionUpdate>,
) -> StreamSession {
    let session_id = session.id;

    let mut stream = match fetcher.open(&request).await {
        Ok(stream) => stream,
        Err(e) => return fail(session, e.into(), &updates),
    };

    session.status = SessionStatus::Streaming;
    let _ = updates.send(SessionUpdate::Opened(session.clone()));

    loop {
        let chunk = match stream.next_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return fail(session, e.into(), &updates),
        };

        session.bytes_received += chunk.len() as u64;

        if let Err(e) = appender.append_chunk(chunk).await {
            return fail(session, e.into(), &updates);
        }

        session.chunks_committed = appender.committed_chunks();
        session.bytes_committed = appender.committed_bytes();
        session.estimated_duration_secs =
            estimator.refine(session.bytes_received, session.estimated_duration_secs);

        debug!(
            %session_id,
            chunk = session.chunks_committed,
            bytes = session.bytes_received,
            estimate_secs = session.estimated_duration_secs,
            "Chunk committed"
        );
        let _ = updates.send(SessionUpdate::ChunkCommitted(session.clone()));
    }

    if let Err(e) = appender.finish().await {
        return fail(session, e.into(), &updates);
    }

    session.status = SessionStatus::Complete;
    info!(
        %session_id,
        chunks = session.chunks_committed,
        bytes = session.bytes_received,
        estimate_secs = session.estimated_duration_secs,
        "Narration stream complete"
    );
    let _ = updates.send(SessionUpdate::Completed(session.clone()));
    session
}

fn fail(
    mut session: StreamSession,
    error: SessionFailure,
    updates: &mpsc::UnboundedSender<SessionUpdate>,
) -> StreamSession {
    warn!(
        session_id = %session.id,
        bytes = session.bytes_received,
        chunks = session.chunks_committed,
        "Narration session failed: {}",
        error
    );
    session.status = SessionStatus::Failed;
    let _ = updates.send(SessionUpdate::Failed {
        session: session.clone(),
        error,
    });
    session
}

/// Live session owned by the controller
///
/// Dropping the handle cancels the consumption task and releases the
/// playhead. Updates already queued carry this session's id and are
/// discarded by the controller.
pub struct SessionHandle {
    pub session: StreamSession,
    pub playhead: Box<dyn Playhead>,
    task: JoinHandle<StreamSession>,
}

impl SessionHandle {
    /// Spawn the consumption task for a fresh session
    pub fn start(
        session: StreamSession,
        request: NarrationRequest,
        fetcher: Arc<dyn StreamFetcher>,
        media: MediaPair,
        estimator: DurationEstimator,
        updates: mpsc::UnboundedSender<SessionUpdate>,
    ) -> Self {
        let appender = BufferAppender::new(media.buffer);
        let task = tokio::spawn(consume_stream(
            session.clone(),
            request,
            fetcher,
            appender,
            estimator,
            updates,
        ));

        Self {
            session,
            playhead: media.playhead,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.session.id
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!(session_id = %self.session.id, "Cancelling narration stream");
            self.task.abort();
        }
    }
}
