//! Audio output using cpal
//!
//! Opens the configured device (falling back to the system default) and
//! drives a per-frame callback from the device's real-time thread.

use super::AudioFrame;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Preferred output rate when the device supports it
const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// Audio output manager using cpal.
///
/// `cpal::Stream` is not `Send`, so an `AudioOutput` stays on the thread that
/// opened it.
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Linear gain applied in the callback
    volume: f32,
    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Names of available output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device.
    ///
    /// A requested device that cannot be found falls back to the default one.
    pub fn open(device_name: Option<&str>, volume: f32) -> Result<Self> {
        let host = cpal::default_host();

        let requested = match device_name {
            Some(name) => {
                let found = host
                    .output_devices()
                    .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
                    .find(|d| d.name().ok().as_deref() == Some(name));
                if found.is_none() {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                }
                found
            }
            None => None,
        };

        let device = match requested {
            Some(device) => device,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        let (config, sample_format) = Self::best_config(&device)?;

        info!(
            device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?sample_format,
            "Audio output opened"
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            volume: volume.clamp(0.0, 1.0),
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Prefer stereo f32 at 44.1kHz, otherwise the device default
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(config) = preferred {
            let format = config.sample_format();
            let config = config
                .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
                .config();
            return Ok((config, format));
        }

        let default = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        Ok((default.config(), default.sample_format()))
    }

    /// Start the stream.
    ///
    /// `next_frame` runs on the real-time audio thread once per output frame
    /// and must not block.
    pub fn start<F>(&mut self, next_frame: F) -> Result<()>
    where
        F: FnMut() -> AudioFrame + Send + 'static,
    {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32, F>(next_frame)?,
            SampleFormat::I16 => self.build_stream::<i16, F>(next_frame)?,
            SampleFormat::U16 => self.build_stream::<u16, F>(next_frame)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        debug!("Audio stream started");
        Ok(())
    }

    fn build_stream<T, F>(&self, mut next_frame: F) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
        F: FnMut() -> AudioFrame + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let gain = self.volume;
        let error_flag = Arc::clone(&self.error_flag);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let AudioFrame { left, right } = next_frame().scaled(gain);
                        match frame {
                            [mono] => *mono = T::from_sample((left + right) * 0.5),
                            [l, r, rest @ ..] => {
                                *l = T::from_sample(left);
                                *r = T::from_sample(right);
                                for extra in rest {
                                    *extra = T::EQUILIBRIUM;
                                }
                            }
                            [] => {}
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
            debug!("Audio stream stopped");
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// True once the device reported a stream error
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
