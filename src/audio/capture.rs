//! Real microphone capture using CPAL.
//!
//! Captures 16-bit PCM at 16 kHz mono. Tries the preferred format first,
//! then the device's default config with software conversion (channel
//! mixing + resampling) for backends that only expose native formats.

use crate::audio::recorder::{AudioSource, AudioSourceConfig};
use crate::audio::wav::transcode_to_mono_16k;
use crate::error::{Result, VocoachError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only accessed through the Mutex in
/// CpalAudioSource, one thread at a time.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone source backed by a CPAL input stream.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Mutex<Option<SendableStream>>,
    /// Callback-to-reader handoff; the callback must never block.
    chunk_tx: Sender<Vec<i16>>,
    chunk_rx: Receiver<Vec<i16>>,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Open the named input device, or the default input device when `None`.
    pub fn new(config: &AudioSourceConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = match config.device.as_deref() {
            Some(name) => {
                let devices = host
                    .input_devices()
                    .map_err(|e| VocoachError::AudioCapture {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                let mut found = None;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        found = Some(dev);
                        break;
                    }
                }

                found.ok_or_else(|| VocoachError::AudioDeviceNotFound {
                    device: name.to_string(),
                })?
            }
            None => host
                .default_input_device()
                .ok_or_else(|| VocoachError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })?,
        };

        let (chunk_tx, chunk_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            device,
            stream: Mutex::new(None),
            chunk_tx,
            chunk_rx,
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate: config.sample_rate,
        })
    }

    /// Build the input stream.
    ///
    /// Tries in order:
    /// 1. i16/16kHz/mono — preferred, zero-copy path
    /// 2. f32/16kHz/mono — for devices that only expose float formats
    /// 3. Device default config — native rate/channels with software conversion
    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::warn!("audio stream error: {}", err);
        };

        let tx = self.chunk_tx.clone();
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                let _ = tx.send(data.to_vec());
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let tx = self.chunk_tx.clone();
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                let chunk: Vec<i16> = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .collect();
                let _ = tx.send(chunk);
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Build a stream using the device's native config, converting in
    /// software. Some PipeWire-ALSA setups accept non-native configs but
    /// never deliver data, so this is the path of last resort.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| VocoachError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels();
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        tracing::info!(
            "using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let err_callback = |err| {
            tracing::warn!("audio stream error: {}", err);
        };

        let tx = self.chunk_tx.clone();
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let converted = transcode_to_mono_16k(data, native_rate, native_channels);
                        let _ = tx.send(converted);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VocoachError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {}", e),
                }),
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let i16_data: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let converted =
                            transcode_to_mono_16k(&i16_data, native_rate, native_channels);
                        let _ = tx.send(converted);
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VocoachError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {}", e),
                }),
            fmt => Err(VocoachError::AudioCapture {
                message: format!(
                    "Unsupported native sample format: {:?}. Try configuring audio.device.",
                    fmt
                ),
            }),
        }
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        let stream = self.build_stream()?;
        stream.play().map_err(|e| VocoachError::MicrophoneDenied {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        let mut guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the stream closes the device handle.
        let mut guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
        guard.take();
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let active = {
            let guard = self.stream.lock().unwrap_or_else(|e| e.into_inner());
            guard.is_some()
        };
        if !active {
            return Err(VocoachError::AudioCapture {
                message: "source not started".to_string(),
            });
        }

        let mut samples = Vec::new();
        for chunk in self.chunk_rx.try_iter() {
            samples.extend(chunk);
        }
        Ok(samples)
    }
}
