//! Playback controller
//!
//! Owns the player state machine and the current session. All commands,
//! session updates and clock ticks are handled on a single task, so state
//! transitions are serialized and a session can never be opened twice by
//! overlapping requests.
//!
//! ```text
//! Idle --toggle--> Loading --audio ready--> Playing <--toggle--> Paused
//!                     |                        |
//!                     +------ stream error ----+--> Failed --toggle--> Loading
//!                                              |
//!                                   played out, stream complete
//!                                              v
//!                                            Ended --toggle--> Playing (from 0)
//! ```

use super::session::{SessionHandle, SessionUpdate, StreamSession};
use super::state::{PlaybackState, PlayerView};
use crate::audio::{MediaBackend, PlayheadStatus};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::estimator::DurationEstimator;
use crate::fetcher::{NarrationRequest, StreamFetcher};
use chrono::Utc;
use narrator_common::events::{EventBus, NarrationEvent, PlayerState, SessionStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Commands queued ahead of the controller before senders wait
const COMMAND_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    pub estimator: DurationEstimator,
    pub skip_step_secs: f64,
    pub position_tick: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&PlayerConfig::default())
    }
}

impl From<&PlayerConfig> for ControllerSettings {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            estimator: config.estimator,
            skip_step_secs: config.playback.skip_step_secs,
            position_tick: config.playback.position_tick(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipDirection {
    Forward,
    Back,
}

#[derive(Debug)]
enum Op {
    TogglePlayPause,
    Seek(f64),
    Skip(SkipDirection),
    Restart { preserve_position: bool },
    SetText(String),
    Shutdown,
}

struct Command {
    op: Op,
    reply: oneshot::Sender<Result<PlayerView>>,
}

/// Handle to the controller task
///
/// Cheap to share behind an `Arc`; every method is a message to the task.
pub struct PlaybackController {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<PlayerView>,
}

impl PlaybackController {
    /// Start the controller task. Must be called within a tokio runtime.
    pub fn spawn(
        settings: ControllerSettings,
        fetcher: Arc<dyn StreamFetcher>,
        backend: Arc<dyn MediaBackend>,
        events: Arc<EventBus>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(PlayerView::default());

        let actor = ControllerActor {
            settings,
            fetcher,
            backend,
            events,
            view_tx,
            updates_tx: update_tx,
            request: None,
            state: PlayerState::Idle,
            playback: PlaybackState::default(),
            session: None,
            error: None,
        };
        tokio::spawn(actor.run(command_rx, update_rx));

        Self {
            commands: command_tx,
            view: view_rx,
        }
    }

    /// Start, pause or resume playback depending on the current state
    pub async fn toggle_play_pause(&self) -> Result<PlayerView> {
        self.request(Op::TogglePlayPause).await
    }

    /// Move the playhead by `delta_secs`, clamped to `[0, estimated duration]`
    pub async fn seek(&self, delta_secs: f64) -> Result<PlayerView> {
        if !delta_secs.is_finite() {
            return Err(Error::InvalidInput(format!(
                "seek delta must be finite, got {}",
                delta_secs
            )));
        }
        self.request(Op::Seek(delta_secs)).await
    }

    /// Skip ahead by the configured step; ignored unless playing
    pub async fn skip_forward(&self) -> Result<PlayerView> {
        self.request(Op::Skip(SkipDirection::Forward)).await
    }

    /// Skip back by the configured step; ignored unless playing
    pub async fn skip_back(&self) -> Result<PlayerView> {
        self.request(Op::Skip(SkipDirection::Back)).await
    }

    /// Tear down the session and stream the narration again
    pub async fn restart(&self, preserve_position: bool) -> Result<PlayerView> {
        self.request(Op::Restart { preserve_position }).await
    }

    /// Replace the narration text; any current session is torn down
    pub async fn set_text(&self, text: impl Into<String>) -> Result<PlayerView> {
        self.request(Op::SetText(text.into())).await
    }

    /// Stop the controller task and tear down the session
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Op::Shutdown).await.map(|_| ())
    }

    /// Latest published view
    pub fn view(&self) -> PlayerView {
        self.view.borrow().clone()
    }

    /// Receiver that is notified whenever the view changes
    pub fn subscribe(&self) -> watch::Receiver<PlayerView> {
        self.view.clone()
    }

    async fn request(&self, op: Op) -> Result<PlayerView> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command { op, reply })
            .await
            .map_err(|_| Error::ControllerClosed)?;
        response.await.map_err(|_| Error::ControllerClosed)?
    }
}

struct ControllerActor {
    settings: ControllerSettings,
    fetcher: Arc<dyn StreamFetcher>,
    backend: Arc<dyn MediaBackend>,
    events: Arc<EventBus>,
    view_tx: watch::Sender<PlayerView>,
    updates_tx: mpsc::UnboundedSender<SessionUpdate>,
    request: Option<NarrationRequest>,
    state: PlayerState,
    playback: PlaybackState,
    session: Option<SessionHandle>,
    error: Option<String>,
}

impl ControllerActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut updates: mpsc::UnboundedReceiver<SessionUpdate>,
    ) {
        let mut ticker = tokio::time::interval(self.settings.position_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Playback controller started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(Command { op, reply }) = command else {
                        break;
                    };
                    let stop = matches!(op, Op::Shutdown);
                    let result = self.handle(op);
                    self.publish();
                    let _ = reply.send(result.map(|_| self.build_view()));
                    if stop {
                        break;
                    }
                }
                Some(update) = updates.recv() => {
                    self.apply_update(update);
                    self.publish();
                }
                _ = ticker.tick() => {
                    self.on_tick();
                    self.publish();
                }
            }
        }

        self.teardown_session();
        self.publish();
        info!("Playback controller stopped");
    }

    fn handle(&mut self, op: Op) -> Result<()> {
        debug!(?op, state = %self.state, "Controller command");
        match op {
            Op::TogglePlayPause => self.toggle_play_pause(),
            Op::Seek(delta) => {
                self.seek_by(delta);
                Ok(())
            }
            Op::Skip(direction) => {
                self.skip(direction);
                Ok(())
            }
            Op::Restart { preserve_position } => self.start_session(preserve_position),
            Op::SetText(text) => self.set_text(text),
            Op::Shutdown => {
                self.teardown_session();
                self.playback = PlaybackState::default();
                self.set_state(PlayerState::Idle);
                Ok(())
            }
        }
    }

    fn toggle_play_pause(&mut self) -> Result<()> {
        match self.state {
            PlayerState::Idle | PlayerState::Failed => self.start_session(false),
            PlayerState::Loading => {
                // Only the intent flips; the pending session stays the only one
                self.playback.is_playing = !self.playback.is_playing;
                if let Some(handle) = self.session.as_mut() {
                    if self.playback.is_playing {
                        handle.playhead.play();
                    } else {
                        handle.playhead.pause();
                    }
                }
                Ok(())
            }
            PlayerState::Playing => {
                self.pause();
                Ok(())
            }
            PlayerState::Paused => {
                self.resume();
                Ok(())
            }
            PlayerState::Ended => {
                if let Some(handle) = self.session.as_mut() {
                    handle.playhead.seek(0.0);
                }
                self.playback.current_time_secs = 0.0;
                self.resume();
                Ok(())
            }
        }
    }

    fn pause(&mut self) {
        if let Some(handle) = self.session.as_mut() {
            handle.playhead.pause();
        }
        self.playback.is_playing = false;
        self.playback.is_loading = false;
        self.set_state(PlayerState::Paused);
    }

    fn resume(&mut self) {
        let Some(handle) = self.session.as_mut() else {
            return;
        };
        handle.playhead.play();
        self.playback.is_playing = true;
        self.playback.is_loading = handle.playhead.status() == PlayheadStatus::Waiting;
        self.set_state(PlayerState::Playing);
    }

    /// Tear down any session and open a new one for the current text
    fn start_session(&mut self, preserve_position: bool) -> Result<()> {
        let request = self
            .request
            .clone()
            .ok_or_else(|| Error::InvalidState("no narration text has been set".to_string()))?;

        let resume_at = if preserve_position {
            self.playback.current_time_secs
        } else {
            0.0
        };
        self.teardown_session();

        let session_id = Uuid::new_v4();
        let initial_estimate = self.settings.estimator.estimate_from_text(request.text());

        let mut media = match self.backend.create(session_id) {
            Ok(media) => media,
            Err(e) => {
                self.fail(format!("Failed to prepare audio output: {}", e));
                return Err(e);
            }
        };

        let resume_at = resume_at.clamp(0.0, initial_estimate);
        if resume_at > 0.0 {
            media.playhead.seek(resume_at);
        }
        media.playhead.play();

        let session = StreamSession::new(session_id, initial_estimate);
        self.session = Some(SessionHandle::start(
            session,
            request.clone(),
            Arc::clone(&self.fetcher),
            media,
            self.settings.estimator,
            self.updates_tx.clone(),
        ));

        self.error = None;
        self.playback = PlaybackState {
            is_playing: true,
            current_time_secs: resume_at,
            is_loading: true,
        };
        self.set_state(PlayerState::Loading);

        info!(
            %session_id,
            chars = request.text().chars().count(),
            initial_estimate_secs = initial_estimate,
            resume_at,
            "Narration session started"
        );
        self.events.emit_lossy(NarrationEvent::SessionStarted {
            session_id,
            text_chars: request.text().chars().count(),
            initial_estimate_secs: initial_estimate,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn seek_by(&mut self, delta_secs: f64) {
        let Some(handle) = self.session.as_mut() else {
            debug!("Seek ignored, no session");
            return;
        };

        let estimate = handle.session.estimated_duration_secs;
        let current = handle.playhead.position_secs();
        let target = (current + delta_secs).clamp(0.0, estimate);
        handle.playhead.seek(target);
        self.playback.current_time_secs = target;

        debug!(current, delta_secs, target, estimate, "Seek");

        if self.state == PlayerState::Ended && target < estimate {
            self.set_state(PlayerState::Paused);
        }
    }

    fn skip(&mut self, direction: SkipDirection) {
        if !self.skip_enabled() {
            debug!(?direction, state = %self.state, "Skip ignored");
            return;
        }
        let step = self.settings.skip_step_secs;
        match direction {
            SkipDirection::Forward => self.seek_by(step),
            SkipDirection::Back => self.seek_by(-step),
        }
    }

    fn set_text(&mut self, text: String) -> Result<()> {
        let request = NarrationRequest::new(text)?;
        self.teardown_session();
        self.request = Some(request);
        self.playback = PlaybackState::default();
        self.error = None;
        self.set_state(PlayerState::Idle);
        Ok(())
    }

    fn apply_update(&mut self, update: SessionUpdate) {
        let Some(handle) = self.session.as_mut() else {
            return;
        };
        let session = update.session();
        if session.id != handle.id() {
            debug!(stale = %session.id, current = %handle.id(), "Ignoring update from old session");
            return;
        }

        match update {
            SessionUpdate::Opened(session) => {
                handle.session = session;
            }
            SessionUpdate::ChunkCommitted(session) => {
                self.events.emit_lossy(NarrationEvent::ChunkCommitted {
                    session_id: session.id,
                    chunk_index: session.chunks_committed,
                    bytes_received: session.bytes_received,
                    estimated_duration_secs: session.estimated_duration_secs,
                    timestamp: Utc::now(),
                });
                handle.session = session;
            }
            SessionUpdate::Completed(session) => {
                self.events.emit_lossy(NarrationEvent::SessionCompleted {
                    session_id: session.id,
                    bytes_received: session.bytes_received,
                    chunks_committed: session.chunks_committed,
                    estimated_duration_secs: session.estimated_duration_secs,
                    timestamp: Utc::now(),
                });
                handle.session = session;
            }
            SessionUpdate::Failed { session, error } => {
                self.events.emit_lossy(NarrationEvent::SessionFailed {
                    session_id: session.id,
                    bytes_received: session.bytes_received,
                    error: error.to_string(),
                    timestamp: Utc::now(),
                });
                handle.session = session;
                self.fail(error.to_string());
            }
        }
    }

    /// Media clock: sample the playhead and advance the state machine
    fn on_tick(&mut self) {
        if self.state == PlayerState::Failed {
            return;
        }
        let Some(handle) = self.session.as_mut() else {
            return;
        };

        let status = handle.playhead.status();
        let estimate = handle.session.estimated_duration_secs;
        self.playback.current_time_secs = handle.playhead.position_secs().min(estimate);

        match status {
            PlayheadStatus::Faulted(reason) => {
                self.fail(reason);
                return;
            }
            PlayheadStatus::Ended if handle.session.status == SessionStatus::Complete => {
                if self.state != PlayerState::Ended {
                    handle.playhead.pause();
                    self.playback.is_playing = false;
                    self.playback.is_loading = false;
                    self.set_state(PlayerState::Ended);
                }
            }
            PlayheadStatus::Ended | PlayheadStatus::Waiting => {
                self.playback.is_loading = self.playback.is_playing;
            }
            PlayheadStatus::Ready => {
                self.playback.is_loading = false;
                if self.state == PlayerState::Loading {
                    let next = if self.playback.is_playing {
                        PlayerState::Playing
                    } else {
                        PlayerState::Paused
                    };
                    self.set_state(next);
                }
            }
        }

        if self.state == PlayerState::Playing {
            if let Some(handle) = self.session.as_ref() {
                self.events.emit_lossy(NarrationEvent::PlaybackProgress {
                    session_id: handle.id(),
                    position_secs: self.playback.current_time_secs,
                    estimated_duration_secs: handle.session.estimated_duration_secs,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Enter Failed. Progress stops updating; committed audio is left alone.
    fn fail(&mut self, reason: String) {
        error!(state = %self.state, "Playback failed: {}", reason);
        self.error = Some(reason);
        self.playback.is_loading = false;
        self.set_state(PlayerState::Failed);
    }

    fn teardown_session(&mut self) {
        if let Some(handle) = self.session.take() {
            debug!(session_id = %handle.id(), status = %handle.session.status, "Tearing down session");
        }
    }

    fn skip_enabled(&self) -> bool {
        self.session.is_some() && self.state == PlayerState::Playing
    }

    fn set_state(&mut self, new_state: PlayerState) {
        if self.state == new_state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;
        info!(%old_state, %new_state, "Player state changed");
        self.events.emit_lossy(NarrationEvent::PlayerStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    fn build_view(&self) -> PlayerView {
        let session = self.session.as_ref().map(|h| &h.session);
        let estimate = session
            .map(|s| s.estimated_duration_secs)
            .or_else(|| {
                self.request
                    .as_ref()
                    .map(|r| self.settings.estimator.estimate_from_text(r.text()))
            })
            .unwrap_or(0.0);

        PlayerView {
            buffered_bytes: session.map_or(0, |s| s.bytes_committed),
            session_id: session.map(|s| s.id),
            session_status: session.map_or(SessionStatus::Idle, |s| s.status),
            skip_enabled: self.skip_enabled(),
            error: self.error.clone(),
            ..PlayerView::new(self.state, self.playback, estimate)
        }
    }

    fn publish(&self) {
        let view = self.build_view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }
}
