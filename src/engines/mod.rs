//! Supervision of external inference engine subprocesses.
//!
//! Each engine (wake-word spotter, speech-synthesis servers, the combined
//! speech-understanding service) runs as an independent local process
//! reached over a local port. The supervisor owns their lifecycle; it never
//! auto-restarts a crashed engine — a crash is surfaced as `Exited` and the
//! caller decides whether to start it again.

pub mod readiness;
pub mod spec;
pub mod supervisor;

pub use readiness::{HttpProbe, ReadinessProbe};
pub use spec::{known_engines, EngineSpec};
pub use supervisor::EngineSupervisor;

/// Supervisor-tracked lifecycle stage of an engine process.
///
/// Transitions are one-directional (`Starting → Ready/Unavailable`,
/// `* → Exited`) except that `Ready` may still move to `Exited` when the
/// process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Not started yet (or never started).
    NotStarted,
    /// Process spawned, waiting for a ready marker.
    Starting,
    /// Ready marker seen, or the port was already serving.
    Ready,
    /// Startup timed out; the process was killed.
    Unavailable,
    /// Process exited (crash or normal); no process handle remains.
    Exited,
}

impl EngineState {
    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: EngineState) -> bool {
        use EngineState::*;
        match (self, next) {
            (NotStarted, Starting) | (NotStarted, Ready) => true,
            (Starting, Ready) | (Starting, Unavailable) | (Starting, Exited) => true,
            (Ready, Exited) => true,
            (Unavailable, Exited) => true,
            // Restarting after exit is an explicit new lifecycle.
            (Exited, Starting) | (Exited, Ready) => true,
            (Unavailable, Starting) => true,
            _ => false,
        }
    }
}
