//! Default configuration constants for vocoach.
//!
//! Shared constants used across configuration types so tuning values live in
//! one place instead of being scattered through call sites.

use std::time::Duration;

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and is the format the
/// speech-understanding sidecar expects for recorded artifacts.
pub const SAMPLE_RATE: u32 = 16000;

/// Default speech loudness threshold (0.0 to 1.0).
///
/// A frame counts as speech when either the time-domain RMS or the
/// frequency-domain average exceeds this. 0.015 sits above typical
/// ambient-noise floors while catching quiet speakers.
pub const SPEECH_THRESHOLD: f32 = 0.015;

/// Default silence duration in milliseconds before a turn auto-stops.
pub const SILENCE_STOP_MS: u32 = 1000;

/// Lower clamp bound for the silence-stop duration.
pub const SILENCE_STOP_MIN_MS: u32 = 900;

/// Upper clamp bound for the silence-stop duration.
pub const SILENCE_STOP_MAX_MS: u32 = 1200;

/// Minimum recording duration in milliseconds before auto-stop may fire.
///
/// Protects slow starters: silence-stop never truncates a capture shorter
/// than this, regardless of how long the silence has lasted.
pub const MIN_CAPTURE_MS: u32 = 1000;

/// Analysis frame size in samples (~32 ms at 16kHz, power of two for the FFT).
pub const FRAME_SIZE: usize = 512;

/// Wake-signal socket port (fixed contract with the wake-word sidecar).
pub const WAKE_PORT: u16 = 8765;

/// Preferred speech-synthesis engine port (soprano sidecar).
pub const SYNTH_PORT: u16 = 8001;

/// Speech-understanding sidecar port.
pub const STT_PORT: u16 = 8766;

/// Maximum wake-socket reconnect attempts before giving up.
///
/// After this many failures the client stops retrying and push-to-talk
/// becomes the only way to start a turn. Fixed, not user-configurable.
pub const WAKE_MAX_RETRIES: u32 = 5;

/// Initial wake-socket reconnect delay; doubles on each failed attempt.
pub const WAKE_RETRY_BASE: Duration = Duration::from_secs(1);

/// Bounded startup timer for engine subprocesses.
///
/// If no ready marker appears on the engine's output within this window the
/// process is killed and marked Unavailable.
pub const ENGINE_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for engine health probes.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for one transcription request.
pub const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for one synthesis request.
pub const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Default speech-recognition model size selector.
pub const DEFAULT_STT_MODEL: &str = "base";

/// Default synthesis voice identifier.
pub const DEFAULT_VOICE: &str = "default";

/// Score at or above which difficulty escalates and the next phase is Challenge.
pub const SCORE_ESCALATE: u32 = 70;

/// Score below which the engine simplifies and teaches the concept again.
pub const SCORE_SIMPLIFY: u32 = 50;

/// Score below which a graded attempt marks its concept as weak.
pub const SCORE_WEAK: u32 = 60;

/// Number of Adapt steps between spaced-review opportunities.
pub const SPACED_REVIEW_EVERY: u32 = 4;

/// Clamp a configured silence-stop duration into the supported range.
///
/// Values outside [900, 1200] ms either clip words (too short) or feel
/// unresponsive (too long), so out-of-range configuration is corrected
/// rather than honored.
pub fn clamp_silence_stop(ms: u32) -> u32 {
    ms.clamp(SILENCE_STOP_MIN_MS, SILENCE_STOP_MAX_MS)
}
