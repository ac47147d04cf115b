//! Voice-activity detection primitives.
//!
//! Classifies analysis frames as speech or silence from two parallel
//! loudness measures: a time-domain RMS and a frequency-domain magnitude
//! average. A frame counts as speech when either measure exceeds the
//! configured threshold; quiet fricatives show up in the spectrum before
//! they move the RMS needle, and low hums do the opposite.

use crate::defaults;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use std::time::Instant;

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Per-frame loudness measures, both normalized to 0.0..1.0.
#[derive(Debug, Clone, Copy)]
pub struct FrameLoudness {
    /// Time-domain root mean square.
    pub rms: f32,
    /// Average FFT bin magnitude over the positive-frequency half.
    pub spectral_avg: f32,
}

impl FrameLoudness {
    /// The level reported to UI listeners: the louder of the two measures.
    pub fn level(&self) -> f32 {
        self.rms.max(self.spectral_avg)
    }

    /// Whether this frame counts as speech at the given threshold.
    pub fn is_speech(&self, threshold: f32) -> bool {
        self.rms > threshold || self.spectral_avg > threshold
    }
}

/// Computes both loudness measures for successive analysis frames.
///
/// Holds a planned FFT so per-frame analysis allocates nothing beyond its
/// scratch buffer.
pub struct LoudnessAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    frame_size: usize,
}

impl LoudnessAnalyzer {
    /// Creates an analyzer for the default analysis frame size.
    pub fn new() -> Self {
        Self::with_frame_size(defaults::FRAME_SIZE)
    }

    /// Creates an analyzer for a specific frame size (power of two).
    pub fn with_frame_size(frame_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        Self { fft, frame_size }
    }

    /// Analyze one frame of 16-bit PCM samples.
    ///
    /// Frames shorter than the FFT size are zero-padded; longer frames use
    /// the first `frame_size` samples for the spectral measure while the RMS
    /// covers everything.
    pub fn analyze(&self, samples: &[i16]) -> FrameLoudness {
        let rms = calculate_rms(samples);
        let spectral_avg = self.spectral_average(samples);
        FrameLoudness { rms, spectral_avg }
    }

    fn spectral_average(&self, samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .take(self.frame_size)
            .map(|&s| Complex::new(s as f32 / i16::MAX as f32, 0.0))
            .collect();
        buffer.resize(self.frame_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        // Positive-frequency half, skipping the DC bin so a constant offset
        // (badly biased hardware) does not read as loudness.
        let half = self.frame_size / 2;
        let sum: f32 = buffer[1..half].iter().map(|c| c.norm()).sum();
        // norm() of a full-scale sine concentrates frame_size/2 in one bin;
        // dividing by that puts the average back on the 0..1 scale.
        sum / (half.saturating_sub(1) as f32) / (self.frame_size as f32 / 2.0)
    }
}

impl Default for LoudnessAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// Normalized so 0.0 is silence and ~0.707 is a full-scale sine wave.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// Mock clock for tests, allowing manual time advancement.
///
/// Public (like the other mock seams) so integration tests can drive
/// silence-stop timing without real sleeps.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<std::sync::Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(std::sync::Mutex::new(Instant::now())),
        }
    }

    /// Advances the mock clock by the given duration.
    pub fn advance(&self, duration: std::time::Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_silence(count: usize) -> Vec<i16> {
        vec![0i16; count]
    }

    fn make_tone(count: usize, amplitude: f32) -> Vec<i16> {
        // 1 kHz sine at 16 kHz sample rate
        (0..count)
            .map(|i| {
                let t = i as f32 / 16000.0;
                (amplitude * (2.0 * std::f32::consts::PI * 1000.0 * t).sin() * i16::MAX as f32)
                    as i16
            })
            .collect()
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(calculate_rms(&make_silence(512)), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_one() {
        let max_signal = vec![i16::MAX; 512];
        let rms = calculate_rms(&max_signal);
        assert!((rms - 1.0).abs() < 0.001, "RMS should be ~1.0, got {}", rms);
    }

    #[test]
    fn rms_of_negative_samples_matches_positive() {
        let negative = vec![i16::MIN; 512];
        assert!(calculate_rms(&negative) > 0.99);
    }

    #[test]
    fn rms_empty_samples_is_zero() {
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn spectral_average_of_silence_is_zero() {
        let analyzer = LoudnessAnalyzer::new();
        let loudness = analyzer.analyze(&make_silence(512));
        assert_eq!(loudness.spectral_avg, 0.0);
    }

    #[test]
    fn tone_is_speech_at_default_threshold() {
        let analyzer = LoudnessAnalyzer::new();
        let loudness = analyzer.analyze(&make_tone(512, 0.3));
        assert!(
            loudness.is_speech(defaults::SPEECH_THRESHOLD),
            "0.3 amplitude tone should exceed threshold: rms={} spectral={}",
            loudness.rms,
            loudness.spectral_avg
        );
    }

    #[test]
    fn ambient_noise_floor_is_not_speech() {
        let analyzer = LoudnessAnalyzer::new();
        // Quiet pseudo-noise well under the threshold
        let noise: Vec<i16> = (0..512).map(|i| ((i * 31) % 64) as i16 - 32).collect();
        let loudness = analyzer.analyze(&noise);
        assert!(!loudness.is_speech(defaults::SPEECH_THRESHOLD));
    }

    #[test]
    fn either_measure_triggers_speech() {
        let high_rms = FrameLoudness {
            rms: 0.5,
            spectral_avg: 0.0,
        };
        let high_spectral = FrameLoudness {
            rms: 0.0,
            spectral_avg: 0.5,
        };
        let quiet = FrameLoudness {
            rms: 0.01,
            spectral_avg: 0.01,
        };

        assert!(high_rms.is_speech(0.015));
        assert!(high_spectral.is_speech(0.015));
        assert!(!quiet.is_speech(0.015));
    }

    #[test]
    fn level_reports_louder_measure() {
        let loudness = FrameLoudness {
            rms: 0.2,
            spectral_avg: 0.4,
        };
        assert_eq!(loudness.level(), 0.4);
    }

    #[test]
    fn short_frame_is_zero_padded() {
        let analyzer = LoudnessAnalyzer::new();
        let loudness = analyzer.analyze(&make_tone(100, 0.3));
        assert!(loudness.spectral_avg > 0.0);
    }

    #[test]
    fn mock_clock_advances() {
        let clock = MockClock::new();
        let before = clock.now();
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now().duration_since(before).as_millis(), 500);
    }
}
