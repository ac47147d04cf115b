//! Step descriptors handed to the caller after each advance.

use std::time::Duration;

/// Pause before a teaching step auto-advances, once speech has finished.
pub const AUTO_ADVANCE_PAUSE: Duration = Duration::from_secs(2);

/// What the caller should do next: speak this text, then either open a
/// capture for an answer or advance on its own after a pause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorStep {
    /// Text to synthesize. Empty for pure status steps.
    pub text: String,
    /// Set when the step asks a question and expects an answer.
    pub question_id: Option<String>,
    /// Begin a capture automatically once synthesis finishes.
    pub auto_capture: bool,
    /// Advance without an answer after this pause (teaching steps).
    pub auto_advance_after: Option<Duration>,
    /// User-visible status line, set on degraded or aborted steps.
    pub status: Option<String>,
}

impl TutorStep {
    /// A step that teaches and then moves on by itself.
    pub fn teach(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            question_id: None,
            auto_capture: false,
            auto_advance_after: Some(AUTO_ADVANCE_PAUSE),
            status: None,
        }
    }

    /// A step that asks a question and waits for a spoken answer.
    pub fn ask(text: impl Into<String>, question_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            question_id: Some(question_id.into()),
            auto_capture: true,
            auto_advance_after: None,
            status: None,
        }
    }

    /// A non-fatal status step: nothing to speak, nothing to capture.
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            question_id: None,
            auto_capture: false,
            auto_advance_after: None,
            status: Some(message.into()),
        }
    }

    /// A transient status step. Unlike [`TutorStep::status`], the session
    /// moves on after a short pause instead of waiting for outside input.
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            auto_advance_after: Some(AUTO_ADVANCE_PAUSE),
            ..Self::status(message)
        }
    }
}
