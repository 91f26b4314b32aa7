//! Streaming sample rate conversion using rubato
//!
//! Input arrives in packet-sized pieces of interleaved stereo. Frames are
//! accumulated until rubato's fixed input chunk is full, so any packet size
//! works.

use super::STEREO;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Frames handed to rubato per call
pub const CHUNK_FRAMES: usize = 1024;

pub struct StreamResampler {
    /// None when input and output rates match
    inner: Option<FastFixedIn<f32>>,
    pending: [Vec<f32>; STEREO],
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        let inner = if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, resampling disabled", output_rate);
            None
        } else {
            debug!("Resampling narration from {}Hz to {}Hz", input_rate, output_rate);
            let resampler = FastFixedIn::<f32>::new(
                output_rate as f64 / input_rate as f64,
                1.0,
                PolynomialDegree::Septic,
                CHUNK_FRAMES,
                STEREO,
            )
            .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;
            Some(resampler)
        };

        Ok(Self {
            inner,
            pending: [Vec::new(), Vec::new()],
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Resample as many complete chunks as are available
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(interleaved.to_vec());
        };

        for frame in interleaved.chunks_exact(STEREO) {
            self.pending[0].push(frame[0]);
            self.pending[1].push(frame[1]);
        }

        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();
            let planar = resampler
                .process(&chunk, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            interleave_into(&planar, &mut output);
        }
        Ok(output)
    }

    /// Resample whatever is left at end of stream
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };
        if self.pending[0].is_empty() {
            return Ok(Vec::new());
        }

        let chunk: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
        let planar = resampler
            .process_partial(Some(&chunk), None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        let mut output = Vec::new();
        interleave_into(&planar, &mut output);
        Ok(output)
    }

    /// Drop buffered input and filter state (after a seek)
    pub fn reset(&mut self) {
        if let Some(resampler) = self.inner.as_mut() {
            resampler.reset();
        }
        for channel in &mut self.pending {
            channel.clear();
        }
    }
}

/// [[L, L, ...], [R, R, ...]] -> [L, R, L, R, ...]
fn interleave_into(planar: &[Vec<f32>], output: &mut Vec<f32>) {
    let frames = planar.first().map_or(0, Vec::len);
    output.reserve(frames * planar.len());
    for i in 0..frames {
        for channel in planar {
            output.push(channel[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.5;
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_same_rate_is_passthrough() {
        let mut resampler = StreamResampler::new(44_100, 44_100).unwrap();
        assert!(resampler.is_passthrough());

        let input = sine(100, 44_100);
        assert_eq!(resampler.process(&input).unwrap(), input);
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_downsample_halves_frame_count() {
        let mut resampler = StreamResampler::new(48_000, 24_000).unwrap();
        let input = sine(48_000, 48_000);

        // Feed in uneven packet sizes like a decoder would
        let mut output = Vec::new();
        for packet in input.chunks(1152 * STEREO) {
            output.extend(resampler.process(packet).unwrap());
        }
        output.extend(resampler.flush().unwrap());

        let frames = output.len() / STEREO;
        assert_eq!(output.len() % STEREO, 0);
        assert!(
            (21_600..=26_400).contains(&frames),
            "expected ~24000 frames, got {}",
            frames
        );
    }

    #[test]
    fn test_small_packets_are_buffered() {
        let mut resampler = StreamResampler::new(22_050, 44_100).unwrap();
        let out = resampler.process(&sine(10, 22_050)).unwrap();
        assert!(out.is_empty());

        resampler.reset();
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_interleave() {
        let mut out = Vec::new();
        interleave_into(&[vec![1.0, 3.0], vec![2.0, 4.0]], &mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
