//! Recorded-audio artifact handling.
//!
//! The speech-understanding sidecar consumes a file path to mono 16 kHz
//! 16-bit PCM audio. Captures from devices running at other rates or
//! channel counts are transcoded here before the handoff.

use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, VocoachError};
use std::path::Path;

/// Downmix and resample raw capture data to the artifact format.
pub fn transcode_to_mono_16k(samples: &[i16], source_rate: u32, channels: u16) -> Vec<i16> {
    let mono = if channels == 2 {
        samples
            .chunks_exact(2)
            .map(|chunk| {
                let left = chunk[0] as i32;
                let right = chunk[1] as i32;
                ((left + right) / 2) as i16
            })
            .collect()
    } else {
        samples.to_vec()
    };

    if source_rate != SAMPLE_RATE {
        resample(&mono, source_rate, SAMPLE_RATE)
    } else {
        mono
    }
}

/// Write mono 16 kHz samples to a WAV artifact at `path`.
pub fn write_artifact(path: &Path, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| {
        VocoachError::AudioCapture {
            message: format!("Failed to create WAV artifact: {}", e),
        }
    })?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| VocoachError::AudioCapture {
                message: format!("Failed to write WAV sample: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| VocoachError::AudioCapture {
        message: format!("Failed to finalize WAV artifact: {}", e),
    })?;

    Ok(())
}

/// Read a WAV artifact back as mono 16 kHz samples, transcoding if needed.
pub fn read_artifact(path: &Path) -> Result<Vec<i16>> {
    let mut reader = hound::WavReader::open(path).map_err(|e| VocoachError::AudioCapture {
        message: format!("Failed to open WAV file: {}", e),
    })?;

    let spec = reader.spec();
    let raw: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| VocoachError::AudioCapture {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

    Ok(transcode_to_mono_16k(&raw, spec.sample_rate, spec.channels))
}

/// Linear-interpolation resampler.
///
/// Good enough for speech being handed to a recognizer; not meant for
/// playback-quality conversion.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = pos - idx as f64;

        let a = samples[idx.min(samples.len() - 1)] as f64;
        let b = samples[(idx + 1).min(samples.len() - 1)] as f64;
        out.push((a + (b - a) * frac) as i16);
    }

    out
}
