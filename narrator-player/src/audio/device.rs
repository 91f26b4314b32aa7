//! Playhead that renders a live buffer through the sound card
//!
//! Each playhead owns a dedicated thread that decodes the buffer, resamples
//! to the device rate and pushes stereo samples into a lock-free ring. The
//! cpal callback pops from the ring; pausing makes it emit silence without
//! consuming. Position is derived from the number of frames actually played.

use super::decoder::StreamDecoder;
use super::output::AudioOutput;
use super::resampler::StreamResampler;
use super::{AudioFrame, MediaBackend, MediaPair, Playhead, PlayheadStatus, STEREO};
use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::media::{LiveBuffer, LiveBufferReader};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Seconds of decoded audio held in the ring ahead of the device
const RING_SECONDS: usize = 2;

/// Sleep while the ring is full or the stream is exhausted
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Upper bound on waiting for the callback to discard stale samples
const FLUSH_WAIT_LIMIT: u32 = 100;

/// Output settings shared by every session's playhead
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// Output device name; `None` uses the system default
    pub device_name: Option<String>,
    /// Linear gain in `0.0..=1.0`
    pub volume: f32,
    /// Capacity of each session's live buffer
    pub max_buffer_bytes: u64,
}

impl From<&PlaybackConfig> for DeviceSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            device_name: config.output_device.clone(),
            volume: config.volume,
            max_buffer_bytes: config.max_buffer_bytes,
        }
    }
}

/// Creates a live buffer and a device playhead per session
///
/// The output device is opened by each playhead's own thread, so creating a
/// session never blocks on the sound system. Device errors surface later as
/// `PlayheadStatus::Faulted`.
pub struct DeviceBackend {
    settings: DeviceSettings,
}

impl DeviceBackend {
    pub fn new(settings: DeviceSettings) -> Self {
        Self { settings }
    }
}

impl MediaBackend for DeviceBackend {
    /// Fresh buffer plus a paused playhead reading it
    fn create(&self, session_id: Uuid) -> Result<MediaPair> {
        let buffer = LiveBuffer::new(self.settings.max_buffer_bytes);
        let playhead = DevicePlayhead::spawn(session_id, buffer.reader(), self.settings.clone())?;
        Ok(MediaPair {
            buffer: Box::new(buffer),
            playhead: Box::new(playhead),
        })
    }
}

/// Seek waiting for the pump thread
#[derive(Debug, Clone, Copy, PartialEq)]
struct SeekRequest {
    target: f64,
    /// Position that was audible when the first unapplied seek was requested
    resume_from: f64,
}

impl SeekRequest {
    /// Position of the audio still playing, given the playhead's current position
    ///
    /// Accounting was rebased to `target` when the seek was requested, so
    /// anything past it was played from the old position.
    fn playing_position(&self, reported: f64) -> f64 {
        self.resume_from + (reported - self.target).max(0.0)
    }
}

/// State shared between the controller, the pump thread and the audio callback
#[derive(Debug, Default)]
struct PlayheadShared {
    playing: AtomicBool,
    shutdown: AtomicBool,
    seek_request: Mutex<Option<SeekRequest>>,
    /// Callback must discard everything in the ring
    flush: AtomicBool,
    /// Position at the last seek, as f64 bits
    base_position: AtomicU64,
    frames_played: AtomicU64,
    output_rate: AtomicU32,
    /// Samples for the current position have reached the ring
    primed: AtomicBool,
    /// Callback found the ring empty while playing
    starved: AtomicBool,
    /// Decoder reached the end and everything decoded is in the ring
    decoder_finished: AtomicBool,
    /// Callback observed an empty ring after `decoder_finished`
    drained: AtomicBool,
    fault: Mutex<Option<String>>,
}

impl PlayheadShared {
    fn position_secs(&self) -> f64 {
        let base = f64::from_bits(self.base_position.load(Ordering::Acquire));
        let rate = self.output_rate.load(Ordering::Acquire);
        if rate == 0 {
            return base;
        }
        base + self.frames_played.load(Ordering::Acquire) as f64 / rate as f64
    }

    fn status(&self) -> PlayheadStatus {
        if let Some(reason) = self.fault.lock().ok().and_then(|f| f.clone()) {
            return PlayheadStatus::Faulted(reason);
        }
        if self.drained.load(Ordering::Acquire) {
            return PlayheadStatus::Ended;
        }
        if !self.primed.load(Ordering::Acquire) || self.starved.load(Ordering::Acquire) {
            return PlayheadStatus::Waiting;
        }
        PlayheadStatus::Ready
    }

    /// Restart position accounting at `position_secs`
    fn rebase(&self, position_secs: f64) {
        self.base_position
            .store(position_secs.to_bits(), Ordering::Release);
        self.frames_played.store(0, Ordering::Release);
        self.decoder_finished.store(false, Ordering::Release);
        self.drained.store(false, Ordering::Release);
        self.primed.store(false, Ordering::Release);
        self.starved.store(false, Ordering::Release);
    }

    /// Queue a seek and report `target` until the pump lands it
    ///
    /// A seek replacing one the pump has not taken yet keeps the original
    /// resume point, since the earlier target was never heard.
    fn request_seek(&self, target: f64) {
        if let Ok(mut request) = self.seek_request.lock() {
            let resume_from = match *request {
                Some(pending) => pending.playing_position(self.position_secs()),
                None => self.position_secs(),
            };
            *request = Some(SeekRequest {
                target,
                resume_from,
            });
            self.rebase(target);
        }
    }

    fn take_seek_request(&self) -> Option<SeekRequest> {
        self.seek_request.lock().ok().and_then(|mut r| r.take())
    }

    /// Account from where the decoder landed, unless a newer seek is queued
    fn land_seek(&self, actual: f64) {
        if let Ok(request) = self.seek_request.lock() {
            if request.is_none() {
                self.rebase(actual);
            }
        }
    }

    fn fail(&self, reason: String) {
        if let Ok(mut fault) = self.fault.lock() {
            fault.get_or_insert(reason);
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

/// Playhead rendering one session's live buffer through the sound card
///
/// Control calls only flip shared flags; decoding, seeking and output all
/// happen on the playhead's thread. Dropping the playhead stops the thread
/// and detaches the buffer.
pub struct DevicePlayhead {
    shared: Arc<PlayheadShared>,
    reader: LiveBufferReader,
}

impl DevicePlayhead {
    /// Start the pump thread for `reader`. Starts paused.
    pub fn spawn(
        session_id: Uuid,
        reader: LiveBufferReader,
        settings: DeviceSettings,
    ) -> Result<Self> {
        let shared = Arc::new(PlayheadShared::default());

        let thread_shared = Arc::clone(&shared);
        let thread_reader = reader.clone();
        let id = session_id.simple().to_string();
        thread::Builder::new()
            .name(format!("playhead-{}", &id[..8]))
            .spawn(move || run_pump(thread_reader, thread_shared, settings))
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn playhead thread: {}", e)))?;

        debug!(%session_id, "Device playhead started");
        Ok(Self { shared, reader })
    }
}

impl Playhead for DevicePlayhead {
    fn play(&mut self) {
        self.shared.playing.store(true, Ordering::Release);
    }

    fn pause(&mut self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    fn seek(&mut self, position_secs: f64) {
        self.shared.request_seek(position_secs);
    }

    fn position_secs(&self) -> f64 {
        self.shared.position_secs()
    }

    fn status(&self) -> PlayheadStatus {
        self.shared.status()
    }
}

impl Drop for DevicePlayhead {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.playing.store(false, Ordering::Release);
        // Wakes a pump blocked on the buffer
        self.reader.close();
    }
}

fn run_pump(reader: LiveBufferReader, shared: Arc<PlayheadShared>, settings: DeviceSettings) {
    if let Err(e) = pump(&reader, &shared, &settings) {
        if shared.is_shutdown() {
            debug!("Playhead stopped during teardown: {}", e);
        } else {
            error!("Playhead failed: {}", e);
            shared.fail(e.to_string());
        }
    }
    debug!("Playhead thread exiting");
}

/// Body of the playhead thread: open the device, then decode and queue audio
/// until shutdown. Seek requests are served between packets.
fn pump(reader: &LiveBufferReader, shared: &Arc<PlayheadShared>, settings: &DeviceSettings) -> Result<()> {
    let mut output = AudioOutput::open(settings.device_name.as_deref(), settings.volume)?;
    let output_rate = output.sample_rate();
    shared.output_rate.store(output_rate, Ordering::Release);

    let (mut producer, consumer) =
        HeapRb::<f32>::new(output_rate as usize * STEREO * RING_SECONDS).split();
    output.start(frame_source(consumer, Arc::clone(shared)))?;

    let mut decoder = match StreamDecoder::open(reader.clone()) {
        Ok(decoder) => decoder,
        Err(e) => {
            if !shared.is_shutdown() {
                // Makes the session's next append fail
                reader.reject(e.to_string());
            }
            return Err(e);
        }
    };
    let mut resampler = StreamResampler::new(decoder.sample_rate(), output_rate)?;
    info!(
        input_rate = decoder.sample_rate(),
        output_rate, "Narration decoding started"
    );

    let mut pending: Vec<f32> = Vec::new();
    let mut offset = 0;
    let mut at_eof = false;

    while !shared.is_shutdown() {
        if output.has_error() {
            return Err(Error::AudioOutput("Output stream reported an error".to_string()));
        }

        if let Some(request) = shared.take_seek_request() {
            // Stale audio must not keep playing while the decoder searches
            discard_ring(shared);
            apply_seek(&mut decoder, shared, request)?;
            resampler.reset();
            pending.clear();
            offset = 0;
            at_eof = false;
            continue;
        }

        if offset < pending.len() {
            // Push whole frames only so the callback stays channel-aligned
            let room = producer.vacant_len() & !(STEREO - 1);
            let end = pending.len().min(offset + room);
            let pushed = producer.push_slice(&pending[offset..end]);
            offset += pushed;
            if pushed > 0 {
                shared.primed.store(true, Ordering::Release);
            }
            if offset < pending.len() {
                thread::sleep(IDLE_WAIT);
            }
            continue;
        }

        if at_eof {
            if !shared.decoder_finished.swap(true, Ordering::AcqRel) {
                debug!("All narration audio decoded");
                // Nothing was ever decoded at this position
                shared.primed.store(true, Ordering::Release);
            }
            thread::sleep(IDLE_WAIT);
            continue;
        }

        match decoder.next_stereo()? {
            Some(samples) => pending = resampler.process(&samples)?,
            None => {
                pending = resampler.flush()?;
                at_eof = true;
            }
        }
        offset = 0;
    }

    output.stop()
}

/// Move the decoder to the requested position and settle position accounting
///
/// When the target cannot be reached (past the end of an ended stream), the
/// decoder goes back to the audio that was playing when the seek was asked
/// for. Only a failure to do that is fatal.
fn apply_seek(decoder: &mut StreamDecoder, shared: &PlayheadShared, request: SeekRequest) -> Result<f64> {
    let actual = match decoder.seek(request.target) {
        Ok(actual) => actual,
        Err(e) => {
            let playing = request.playing_position(shared.position_secs());
            warn!(
                requested = request.target,
                resume = playing,
                "{}, resuming previous position",
                e
            );
            decoder.seek(playing)?
        }
    };
    shared.land_seek(actual);
    Ok(actual)
}

/// Ask the callback to drop stale samples and wait until it has
fn discard_ring(shared: &PlayheadShared) {
    shared.flush.store(true, Ordering::Release);
    for _ in 0..FLUSH_WAIT_LIMIT {
        if !shared.flush.load(Ordering::Acquire) || shared.is_shutdown() {
            return;
        }
        thread::sleep(Duration::from_millis(2));
    }
    warn!("Audio callback did not acknowledge flush");
}

/// Per-frame callback body for the output stream
fn frame_source(
    mut consumer: HeapCons<f32>,
    shared: Arc<PlayheadShared>,
) -> impl FnMut() -> AudioFrame + Send + 'static {
    move || {
        if shared.flush.load(Ordering::Acquire) {
            while consumer.try_pop().is_some() {}
            shared.flush.store(false, Ordering::Release);
        }

        if consumer.is_empty() && shared.decoder_finished.load(Ordering::Acquire) {
            shared.drained.store(true, Ordering::Release);
        }

        if !shared.playing.load(Ordering::Acquire) {
            return AudioFrame::zero();
        }

        match (consumer.try_pop(), consumer.try_pop()) {
            (Some(left), Some(right)) => {
                shared.frames_played.fetch_add(1, Ordering::AcqRel);
                shared.starved.store(false, Ordering::Release);
                AudioFrame { left, right }
            }
            _ => {
                if !shared.decoder_finished.load(Ordering::Acquire) {
                    shared.starved.store(true, Ordering::Release);
                }
                AudioFrame::zero()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::speech_fixture;
    use crate::media::MediaBuffer;

    const RATE: u32 = 44_100;

    fn shared_at(position_secs: f64) -> PlayheadShared {
        let shared = PlayheadShared::default();
        shared.output_rate.store(RATE, Ordering::Release);
        shared.rebase(position_secs);
        shared
    }

    fn play_for(shared: &PlayheadShared, secs: f64) {
        shared
            .frames_played
            .fetch_add((secs * RATE as f64) as u64, Ordering::AcqRel);
    }

    async fn ended_speech_decoder() -> (LiveBuffer, StreamDecoder) {
        let mut buffer = LiveBuffer::new(1 << 20);
        buffer.append(speech_fixture()).await.unwrap();
        buffer.end_of_stream();
        let decoder = StreamDecoder::open(buffer.reader()).unwrap();
        (buffer, decoder)
    }

    #[test]
    fn test_new_playhead_is_waiting_at_zero() {
        let shared = PlayheadShared::default();
        assert_eq!(shared.status(), PlayheadStatus::Waiting);
        assert_eq!(shared.position_secs(), 0.0);
    }

    #[test]
    fn test_position_counts_played_frames() {
        let shared = PlayheadShared::default();
        shared.output_rate.store(48_000, Ordering::Release);
        shared.rebase(10.0);
        shared.frames_played.store(24_000, Ordering::Release);
        assert_eq!(shared.position_secs(), 10.5);
    }

    #[test]
    fn test_status_transitions() {
        let shared = PlayheadShared::default();
        shared.primed.store(true, Ordering::Release);
        assert_eq!(shared.status(), PlayheadStatus::Ready);

        shared.starved.store(true, Ordering::Release);
        assert_eq!(shared.status(), PlayheadStatus::Waiting);

        shared.drained.store(true, Ordering::Release);
        assert_eq!(shared.status(), PlayheadStatus::Ended);

        shared.rebase(3.0);
        assert_eq!(shared.status(), PlayheadStatus::Waiting);

        shared.fail("device unplugged".to_string());
        assert_eq!(
            shared.status(),
            PlayheadStatus::Faulted("device unplugged".to_string())
        );
    }

    #[test]
    fn test_callback_plays_pairs_and_respects_pause() {
        let shared = Arc::new(PlayheadShared::default());
        let (mut producer, consumer) = HeapRb::<f32>::new(16).split();
        let mut next = frame_source(consumer, Arc::clone(&shared));

        producer.push_slice(&[0.25, -0.25, 0.5, -0.5]);

        assert_eq!(next(), AudioFrame::zero());
        assert_eq!(shared.frames_played.load(Ordering::Acquire), 0);

        shared.playing.store(true, Ordering::Release);
        assert_eq!(
            next(),
            AudioFrame {
                left: 0.25,
                right: -0.25
            }
        );
        assert_eq!(shared.frames_played.load(Ordering::Acquire), 1);

        shared.flush.store(true, Ordering::Release);
        assert_eq!(next(), AudioFrame::zero());
        assert!(!shared.flush.load(Ordering::Acquire));
        assert!(shared.starved.load(Ordering::Acquire));
    }

    #[test]
    fn test_callback_marks_drained_after_decoder_finished() {
        let shared = Arc::new(PlayheadShared::default());
        let (_producer, consumer) = HeapRb::<f32>::new(4).split();
        let mut next = frame_source(consumer, Arc::clone(&shared));

        next();
        assert!(!shared.drained.load(Ordering::Acquire));

        shared.decoder_finished.store(true, Ordering::Release);
        next();
        assert_eq!(shared.status(), PlayheadStatus::Ended);
    }

    #[test]
    fn test_seek_reports_target_until_landed() {
        let shared = shared_at(2.0);
        play_for(&shared, 1.0);
        shared.primed.store(true, Ordering::Release);

        shared.request_seek(10.0);
        assert_eq!(shared.position_secs(), 10.0);
        assert_eq!(shared.status(), PlayheadStatus::Waiting);

        let request = shared.take_seek_request().unwrap();
        assert_eq!(request.target, 10.0);
        assert_eq!(request.resume_from, 3.0);
        assert!(shared.take_seek_request().is_none());
    }

    #[test]
    fn test_replaced_seek_keeps_original_resume_point() {
        let shared = shared_at(2.0);
        play_for(&shared, 1.0);
        shared.request_seek(10.0);
        // Old audio keeps playing until the pump takes the request
        play_for(&shared, 0.5);

        shared.request_seek(4.0);
        let request = shared.take_seek_request().unwrap();
        assert_eq!(request.target, 4.0);
        assert_eq!(request.resume_from, 3.5);
    }

    #[test]
    fn test_landing_defers_to_newer_request() {
        let shared = shared_at(0.0);
        shared.request_seek(8.0);
        shared.take_seek_request();
        shared.request_seek(1.0);

        shared.land_seek(7.9);
        assert_eq!(shared.position_secs(), 1.0);

        shared.take_seek_request();
        shared.land_seek(0.95);
        assert_eq!(shared.position_secs(), 0.95);
    }

    /// Given: a decoded narration playing near its start
    /// When: the pump applies a seek inside the audio
    /// Then: the reported position is where the decoder landed
    #[tokio::test]
    async fn test_applied_seek_reports_landed_position() {
        let (_buffer, mut decoder) = ended_speech_decoder().await;
        let shared = shared_at(0.0);
        play_for(&shared, 0.2);

        shared.request_seek(0.5);
        let request = shared.take_seek_request().unwrap();
        let actual = apply_seek(&mut decoder, &shared, request).unwrap();

        assert!(actual <= 0.5 && actual > 0.35, "landed at {}", actual);
        assert_eq!(shared.position_secs(), actual);
        assert!(decoder.next_stereo().unwrap().is_some());
    }

    /// Given: an ended narration about a second long, playing at 0.4s
    /// When: a seek far past its end is applied
    /// Then: playback resumes where it was instead of reporting the target
    #[tokio::test]
    async fn test_unreachable_seek_resumes_playing_position() {
        let (_buffer, mut decoder) = ended_speech_decoder().await;
        let shared = shared_at(0.3);
        play_for(&shared, 0.1);

        shared.request_seek(30.0);
        play_for(&shared, 0.05);
        let request = shared.take_seek_request().unwrap();
        let actual = apply_seek(&mut decoder, &shared, request).unwrap();

        assert!(actual <= 0.45 && actual > 0.3, "resumed at {}", actual);
        assert_eq!(shared.position_secs(), actual);
        assert!(decoder.next_stereo().unwrap().is_some());
    }
}
