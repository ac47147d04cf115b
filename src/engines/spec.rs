//! Static descriptions of the known engine sidecars.

use crate::defaults;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Description of one supervisable engine process.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    /// Logical engine name, unique within a supervisor.
    pub name: String,
    /// Candidate script paths, checked in order; the first that exists wins.
    pub script_candidates: Vec<PathBuf>,
    /// Interpreter used to launch the script.
    pub interpreter: String,
    /// Extra arguments after the script path (listen port, thread count).
    pub args: Vec<String>,
    /// Environment variables set for the child.
    pub env: Vec<(String, String)>,
    /// Local port the engine serves on.
    pub port: u16,
    /// Stdout/stderr substrings that mean the engine is ready.
    pub ready_markers: Vec<String>,
    /// How long to wait for a ready marker before giving up.
    pub startup_timeout: Duration,
}

impl EngineSpec {
    /// The first candidate script that exists on disk, if any.
    pub fn locate_script(&self) -> Option<PathBuf> {
        self.script_candidates.iter().find(|p| p.exists()).cloned()
    }

    /// Whether a line of engine output matches any ready marker.
    pub fn matches_ready_marker(&self, line: &str) -> bool {
        self.ready_markers.iter().any(|m| line.contains(m.as_str()))
    }
}

/// The engines this tutor knows how to run, with candidate script locations
/// under `sidecar_dir`.
pub fn known_engines(sidecar_dir: &Path) -> Vec<EngineSpec> {
    vec![
        EngineSpec {
            name: "wake".to_string(),
            script_candidates: vec![
                sidecar_dir.join("wake_service.py"),
                sidecar_dir.join("wake-word").join("wake_service.py"),
            ],
            interpreter: "python3".to_string(),
            args: vec![],
            env: vec![],
            port: defaults::WAKE_PORT,
            ready_markers: vec!["Wake word service started".to_string()],
            startup_timeout: defaults::ENGINE_STARTUP_TIMEOUT,
        },
        EngineSpec {
            name: "soprano".to_string(),
            script_candidates: vec![
                sidecar_dir.join("soprano_server.py"),
                sidecar_dir.join("tts").join("soprano_server.py"),
            ],
            interpreter: "python3".to_string(),
            args: vec![],
            env: vec![
                ("SOPRANO_PORT".to_string(), defaults::SYNTH_PORT.to_string()),
                ("SOPRANO_HOST".to_string(), "127.0.0.1".to_string()),
            ],
            port: defaults::SYNTH_PORT,
            ready_markers: vec![
                "Uvicorn running".to_string(),
                "Starting Soprano TTS server".to_string(),
            ],
            startup_timeout: defaults::ENGINE_STARTUP_TIMEOUT,
        },
        EngineSpec {
            name: "espeak-server".to_string(),
            script_candidates: vec![sidecar_dir.join("espeak_server.py")],
            interpreter: "python3".to_string(),
            args: vec!["--port".to_string(), "8002".to_string()],
            env: vec![],
            port: 8002,
            ready_markers: vec!["espeak server listening".to_string()],
            startup_timeout: defaults::ENGINE_STARTUP_TIMEOUT,
        },
        EngineSpec {
            name: "speech-understanding".to_string(),
            script_candidates: vec![
                sidecar_dir.join("hubert_llama_service.py"),
                sidecar_dir.join("stt").join("hubert_llama_service.py"),
            ],
            interpreter: "python3".to_string(),
            args: vec![
                "--port".to_string(),
                defaults::STT_PORT.to_string(),
                "--threads".to_string(),
                "4".to_string(),
            ],
            env: vec![],
            port: defaults::STT_PORT,
            // Model loading dominates startup for this one.
            ready_markers: vec!["Models loaded".to_string(), "Service ready".to_string()],
            startup_timeout: Duration::from_secs(60),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn locate_script_prefers_first_existing_candidate() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.py");
        let second = dir.path().join("b.py");
        std::fs::write(&second, "#").unwrap();

        let spec = EngineSpec {
            name: "test".to_string(),
            script_candidates: vec![first.clone(), second.clone()],
            interpreter: "python3".to_string(),
            args: vec![],
            env: vec![],
            port: 9999,
            ready_markers: vec![],
            startup_timeout: Duration::from_secs(1),
        };

        assert_eq!(spec.locate_script(), Some(second.clone()));

        std::fs::write(&first, "#").unwrap();
        assert_eq!(spec.locate_script(), Some(first));
    }

    #[test]
    fn locate_script_returns_none_when_nothing_exists() {
        let dir = TempDir::new().unwrap();
        let spec = EngineSpec {
            name: "test".to_string(),
            script_candidates: vec![dir.path().join("missing.py")],
            interpreter: "python3".to_string(),
            args: vec![],
            env: vec![],
            port: 9999,
            ready_markers: vec![],
            startup_timeout: Duration::from_secs(1),
        };
        assert_eq!(spec.locate_script(), None);
    }

    #[test]
    fn ready_marker_matching_is_substring_based() {
        let spec = EngineSpec {
            name: "wake".to_string(),
            script_candidates: vec![],
            interpreter: "python3".to_string(),
            args: vec![],
            env: vec![],
            port: 8765,
            ready_markers: vec!["Wake word service started".to_string()],
            startup_timeout: Duration::from_secs(1),
        };

        assert!(spec.matches_ready_marker(
            "Wake word service started on ws://localhost:8765"
        ));
        assert!(!spec.matches_ready_marker("loading model..."));
    }

    #[test]
    fn known_engines_cover_the_expected_set() {
        let dir = TempDir::new().unwrap();
        let engines = known_engines(dir.path());
        let names: Vec<&str> = engines.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"wake"));
        assert!(names.contains(&"soprano"));
        assert!(names.contains(&"espeak-server"));
        assert!(names.contains(&"speech-understanding"));
    }
}
