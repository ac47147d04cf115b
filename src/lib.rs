//! Voice-turn orchestration for a local spoken-dialogue tutor.
//!
//! The crate captures microphone audio with silence-based turn detection,
//! supervises locally-run inference sidecars (wake-word spotting, speech
//! synthesis, speech understanding), relays wake triggers from a signal
//! socket, and drives a teach / check / challenge / grade / adapt
//! conversation cycle over the resulting transcripts.
//!
//! Components couple only through the [`bus::EventBus`]; the audio turn
//! controller owns the microphone, the supervisor owns the sidecar
//! processes, and the conversation engine owns no I/O at all.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
pub mod bus;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod engines;
pub mod error;
pub mod speech;
pub mod turn;
pub mod tutor;
pub mod wake;

pub use config::Config;
pub use error::{Result, VocoachError};

/// Package version plus git short hash when built from a checkout.
pub fn version_string() -> String {
    match option_env!("GIT_HASH") {
        Some(hash) => format!("{} ({hash})", env!("CARGO_PKG_VERSION")),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_includes_package_version() {
        assert!(version_string().starts_with(env!("CARGO_PKG_VERSION")));
    }
}
