//! Incremental MP3 decoding from a live buffer
//!
//! Unlike a file decoder, reads block while the narration is still arriving,
//! so `next_stereo` only returns `None` once the stream has ended (or the
//! buffer was torn down).
//!
//! The total length of the stream is unknown until it ends, so seeking never
//! relies on it: symphonia's accurate mode scans frame headers from the
//! nearest known point instead of estimating a byte offset.

use super::STEREO;
use crate::error::{Error, Result};
use crate::media::LiveBufferReader;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// Fallback when the container does not declare a rate
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Decoder for one session's narration stream
///
/// Owns the symphonia format reader over a `LiveBufferReader` and the codec
/// decoder for its audio track. Lives on the playhead's pump thread; every
/// call may block waiting for more committed bytes.
pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    /// Track selected at open; packets from other tracks are dropped
    track_id: u32,
    /// Converts packet timestamps into seconds
    time_base: Option<TimeBase>,
    sample_rate: u32,
}

impl StreamDecoder {
    /// Identify the stream format and set up a decoder for its first audio track.
    ///
    /// Blocks until enough data has been committed to identify the format.
    ///
    /// # Errors
    /// `Error::Decode` when the committed bytes are not a supported MP3
    /// stream, or when the buffer ends or is torn down before a frame could
    /// be identified.
    pub fn open(source: LiveBufferReader) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        hint.mime_type("audio/mpeg").with_extension("mp3");

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Unrecognised narration stream: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track in narration stream".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params.sample_rate.unwrap_or_else(|| {
            warn!("Stream has no declared sample rate, assuming {}", DEFAULT_SAMPLE_RATE);
            DEFAULT_SAMPLE_RATE
        });

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Unsupported narration codec: {}", e)))?;

        debug!(
            track_id,
            sample_rate,
            channels = ?codec_params.channels.map(|c| c.count()),
            "Narration decoder ready"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            time_base: codec_params.time_base,
            sample_rate,
        })
    }

    /// Native sample rate of the narration, before resampling
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode the next packet into interleaved stereo samples.
    ///
    /// Blocks until the next packet has been committed. Corrupt packets are
    /// skipped. Returns `None` once the stream has ended and every packet has
    /// been read, or once the buffer was detached.
    pub fn next_stereo(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Failed to read packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    samples.copy_interleaved_ref(decoded);
                    return Ok(Some(to_stereo(samples.samples(), spec.channels.count())));
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!("Skipping corrupt packet: {}", msg);
                    continue;
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Failed to decode packet: {}", e)));
                }
            }
        }
    }

    /// Seek to `position_secs` and return the position actually reached.
    ///
    /// The reached position is the start of the packet containing the
    /// target, so it can be slightly earlier than requested. Seeking forward
    /// past the committed bytes blocks until they arrive. A target past the
    /// end of an ended stream fails and leaves the reader at the end.
    ///
    /// The decoder is reset after a successful seek.
    pub fn seek(&mut self, position_secs: f64) -> Result<f64> {
        let position_secs = position_secs.max(0.0);
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(position_secs.trunc() as u64, position_secs.fract()),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Decode(format!("Seek to {:.2}s failed: {}", position_secs, e)))?;

        self.decoder.reset();

        let actual = self
            .time_base
            .map(|tb| {
                let time = tb.calc_time(seeked.actual_ts);
                time.seconds as f64 + time.frac
            })
            .unwrap_or(position_secs);

        debug!(requested = position_secs, actual, "Decoder seeked");
        Ok(actual)
    }
}

/// Fold any channel layout into interleaved stereo
///
/// Mono is duplicated; layouts wider than stereo keep their first two
/// channels.
pub fn to_stereo(interleaved: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.iter().flat_map(|&s| [s, s]).collect(),
        STEREO => interleaved.to_vec(),
        n => interleaved
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}
