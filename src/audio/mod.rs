//! Audio capture, loudness analysis, and artifact handling.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod recorder;
pub mod vad;
pub mod wav;
