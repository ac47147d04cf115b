//! Speech collaborators: transcription and synthesis clients.

mod stt;
mod synth;

pub use stt::{transcribe_with_timeout, HttpTranscriber, MockTranscriber, Transcriber};
pub use synth::{SynthClient, SynthEngine};
