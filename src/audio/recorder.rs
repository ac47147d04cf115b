use crate::defaults;
use crate::error::{Result, VocoachError};
use std::collections::VecDeque;

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real microphone vs mock).
/// One source instance backs at most one capture session or barge-in tap;
/// exclusivity across sessions is enforced by the turn controller.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    ///
    /// Must be safe to call when already stopped.
    fn stop(&mut self) -> Result<()>;

    /// Read the next frame of 16-bit PCM samples.
    ///
    /// Returns an empty vector when no samples are ready yet.
    fn read_samples(&mut self) -> Result<Vec<i16>>;
}

/// Configuration for audio source initialization
#[derive(Debug, Clone)]
pub struct AudioSourceConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
}

impl Default for AudioSourceConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// Accumulates captured frames for the session artifact.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    pub fn append(&mut self, frame: &[i16]) {
        self.samples.extend_from_slice(frame);
    }

    /// Buffered duration in milliseconds, from sample count.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

/// Mock audio source for testing
#[derive(Debug, Clone, Default)]
pub struct MockAudioSource {
    is_started: bool,
    frames: VecDeque<Vec<i16>>,
    should_fail_start: bool,
    fail_after_frames: Option<usize>,
    frames_read: usize,
    error_message: String,
}

impl MockAudioSource {
    /// Create a new mock audio source with no queued frames.
    pub fn new() -> Self {
        Self {
            error_message: "mock audio error".to_string(),
            ..Self::default()
        }
    }

    /// Queue a frame to be returned by the next `read_samples` call.
    pub fn push_frame(&mut self, frame: Vec<i16>) {
        self.frames.push_back(frame);
    }

    /// Queue a sequence of frames.
    pub fn with_frames(mut self, frames: Vec<Vec<i16>>) -> Self {
        self.frames = frames.into();
        self
    }

    /// Configure the mock to fail on start (microphone denied).
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail reads after N frames (device loss).
    pub fn with_device_loss_after(mut self, frames: usize) -> Self {
        self.fail_after_frames = Some(frames);
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(VocoachError::MicrophoneDenied {
                message: self.error_message.clone(),
            });
        }
        self.is_started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if !self.is_started {
            return Err(VocoachError::AudioCapture {
                message: "source not started".to_string(),
            });
        }
        if let Some(limit) = self.fail_after_frames
            && self.frames_read >= limit
        {
            return Err(VocoachError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        self.frames_read += 1;
        Ok(self.frames.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_source_returns_queued_frames_in_order() {
        let mut source =
            MockAudioSource::new().with_frames(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        source.start().unwrap();

        assert_eq!(source.read_samples().unwrap(), vec![1, 2, 3]);
        assert_eq!(source.read_samples().unwrap(), vec![4, 5, 6]);
        // Exhausted: empty frames, not errors
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn mock_source_start_failure_is_microphone_denied() {
        let mut source = MockAudioSource::new().with_start_failure();
        let err = source.start().unwrap_err();
        assert!(matches!(err, VocoachError::MicrophoneDenied { .. }));
        assert!(!source.is_started());
    }

    #[test]
    fn mock_source_read_before_start_fails() {
        let mut source = MockAudioSource::new();
        assert!(source.read_samples().is_err());
    }

    #[test]
    fn mock_source_device_loss_after_n_frames() {
        let mut source = MockAudioSource::new()
            .with_frames(vec![vec![1], vec![2], vec![3]])
            .with_device_loss_after(2);
        source.start().unwrap();

        assert!(source.read_samples().is_ok());
        assert!(source.read_samples().is_ok());
        assert!(source.read_samples().is_err());
    }

    #[test]
    fn mock_source_stop_is_idempotent() {
        let mut source = MockAudioSource::new();
        source.start().unwrap();
        source.stop().unwrap();
        source.stop().unwrap();
        assert!(!source.is_started());
    }

    #[test]
    fn sample_buffer_tracks_duration() {
        let mut buffer = SampleBuffer::new(16000);
        assert_eq!(buffer.duration_ms(), 0);
        assert!(buffer.is_empty());

        // 16000 samples at 16 kHz = 1000 ms
        buffer.append(&vec![0i16; 16000]);
        assert_eq!(buffer.duration_ms(), 1000);

        buffer.append(&vec![0i16; 8000]);
        assert_eq!(buffer.duration_ms(), 1500);
    }

    #[test]
    fn sample_buffer_into_samples_preserves_order() {
        let mut buffer = SampleBuffer::new(16000);
        buffer.append(&[1, 2]);
        buffer.append(&[3]);
        assert_eq!(buffer.into_samples(), vec![1, 2, 3]);
    }
}
