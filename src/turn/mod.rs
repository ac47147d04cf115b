//! Audio turn management: capture sessions, silence-stop, barge-in.

pub mod barge_in;
pub mod controller;

pub use barge_in::BargeInMonitor;
pub use controller::{CaptureSession, FrameVerdict, TurnConfig, TurnController};

use std::path::PathBuf;

/// How a capture session was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Push-to-talk button.
    Manual,
    /// Wake-word trigger.
    Wake,
    /// Auto-started after a question was spoken.
    Auto,
    /// User interrupted synthesis playback.
    BargeIn,
}

/// Which stream an amplitude sample was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmplitudeSource {
    /// Frame from an active capture session.
    Microphone,
    /// Frame from the barge-in tap while synthesis output is playing.
    Output,
}

/// Per-frame loudness reading for UI feedback.
///
/// Timestamps are milliseconds since session start and are monotonically
/// non-decreasing within one session.
#[derive(Debug, Clone, Copy)]
pub struct AmplitudeSample {
    pub level: f32,
    pub source: AmplitudeSource,
    pub elapsed_ms: u64,
}

/// Why a capture session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Silence-stop gate fired.
    Silence,
    /// Explicit `cancel_capture` (manual button, timeout, or barge-in).
    Cancelled,
    /// The device disappeared mid-capture; treated as an implicit cancel.
    DeviceLost,
}

/// Result payload of a finished capture session.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub mode: CaptureMode,
    pub reason: StopReason,
    /// Recorded-audio artifact (mono 16 kHz 16-bit PCM WAV), if any audio
    /// was captured and finalized.
    pub artifact: Option<PathBuf>,
    pub duration_ms: u64,
}

/// Acknowledgement of a `cancel_capture` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelAck {
    /// True when no capture was active; the call was a no-op, not an error.
    pub already_stopped: bool,
}
