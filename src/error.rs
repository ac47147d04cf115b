//! Error types for vocoach.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VocoachError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Microphone access denied: {message}")]
    MicrophoneDenied { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("A capture session is already active")]
    CaptureBusy,

    // Engine supervision errors
    #[error("Engine {name} failed to spawn: {message}")]
    EngineSpawn { name: String, message: String },

    #[error("Engine {name} did not become ready within {timeout_secs}s")]
    EngineStartupTimeout { name: String, timeout_secs: u64 },

    #[error("Unknown engine: {name}")]
    EngineUnknown { name: String },

    // Wake socket errors
    #[error("Wake socket connection failed: {message}")]
    WakeConnection { message: String },

    #[error("Wake socket gave up after {attempts} attempts")]
    WakeRetriesExhausted { attempts: u32 },

    // Speech collaborator errors
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Transcription timed out after {timeout_secs}s")]
    TranscriptionTimeout { timeout_secs: u64 },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("No synthesis engine available: {suggestion}")]
    SynthesisUnavailable { suggestion: String },

    // Conversation errors
    #[error("No content available for this step: {message}")]
    NoContent { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VocoachError>;
