use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub synth: SynthConfig,
    pub wake: WakeConfig,
}

/// Audio capture and turn-detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Loudness threshold above which a frame counts as speech.
    pub speech_threshold: f32,
    /// Silence duration before a turn auto-stops. Clamped to [900, 1200] ms.
    pub silence_stop_ms: u32,
}

/// Speech-to-text collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// Model size selector passed to the speech-understanding sidecar.
    pub model: String,
}

/// Speech-synthesis collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthConfig {
    /// Preferred engine name ("soprano" or "espeak-server").
    pub engine: String,
    pub voice: String,
    /// Engine-specific synthesis preset.
    pub preset: String,
}

/// Wake-word sidecar configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WakeConfig {
    pub host: String,
    pub port: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            speech_threshold: defaults::SPEECH_THRESHOLD,
            silence_stop_ms: defaults::SILENCE_STOP_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_STT_MODEL.to_string(),
        }
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            engine: "soprano".to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            preset: "standard".to_string(),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: defaults::WAKE_PORT,
        }
    }
}

impl AudioConfig {
    /// Silence-stop duration with the [900, 1200] ms clamp applied.
    ///
    /// The raw field keeps whatever the file said so round-tripping the
    /// config does not rewrite user values; consumers go through this.
    pub fn effective_silence_stop_ms(&self) -> u32 {
        defaults::clamp_silence_stop(self.silence_stop_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOCOACH_STT_MODEL → stt.model
    /// - VOCOACH_VOICE → synth.voice
    /// - VOCOACH_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VOCOACH_STT_MODEL")
            && !model.is_empty()
        {
            self.stt.model = model;
        }

        if let Ok(voice) = std::env::var("VOCOACH_VOICE")
            && !voice.is_empty()
        {
            self.synth.voice = voice;
        }

        if let Ok(device) = std::env::var("VOCOACH_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/vocoach/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vocoach")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_vocoach_env() {
        remove_env("VOCOACH_STT_MODEL");
        remove_env("VOCOACH_VOICE");
        remove_env("VOCOACH_AUDIO_DEVICE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.speech_threshold, 0.015);
        assert_eq!(config.audio.silence_stop_ms, 1000);

        assert_eq!(config.stt.model, "base");

        assert_eq!(config.synth.engine, "soprano");
        assert_eq!(config.synth.voice, "default");

        assert_eq!(config.wake.host, "127.0.0.1");
        assert_eq!(config.wake.port, 8765);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [audio]
            device = "hw:0,0"
            sample_rate = 48000
            speech_threshold = 0.03
            silence_stop_ms = 1100

            [stt]
            model = "large"

            [synth]
            engine = "espeak-server"
            voice = "en-us-2"
            preset = "fast"

            [wake]
            host = "127.0.0.1"
            port = 9765
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.audio.device, Some("hw:0,0".to_string()));
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.speech_threshold, 0.03);
        assert_eq!(config.audio.silence_stop_ms, 1100);

        assert_eq!(config.stt.model, "large");
        assert_eq!(config.synth.engine, "espeak-server");
        assert_eq!(config.synth.voice, "en-us-2");
        assert_eq!(config.wake.port, 9765);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [stt]
            model = "small"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.stt.model, "small");

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.silence_stop_ms, 1000);
        assert_eq!(config.synth.engine, "soprano");
        assert_eq!(config.wake.port, 8765);
    }

    #[test]
    fn test_effective_silence_stop_clamps_low() {
        let mut config = Config::default();
        config.audio.silence_stop_ms = 300;
        assert_eq!(config.audio.effective_silence_stop_ms(), 900);
    }

    #[test]
    fn test_effective_silence_stop_clamps_high() {
        let mut config = Config::default();
        config.audio.silence_stop_ms = 10_000;
        assert_eq!(config.audio.effective_silence_stop_ms(), 1200);
    }

    #[test]
    fn test_effective_silence_stop_passes_in_range() {
        let mut config = Config::default();
        config.audio.silence_stop_ms = 950;
        assert_eq!(config.audio.effective_silence_stop_ms(), 950);
    }

    #[test]
    fn test_env_override_model() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocoach_env();

        set_env("VOCOACH_STT_MODEL", "tiny");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.stt.model, "tiny");
        assert_eq!(config.synth.voice, "default"); // Not overridden

        clear_vocoach_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocoach_env();

        set_env("VOCOACH_STT_MODEL", "medium");
        set_env("VOCOACH_VOICE", "calm");
        set_env("VOCOACH_AUDIO_DEVICE", "pulse");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.stt.model, "medium");
        assert_eq!(config.synth.voice, "calm");
        assert_eq!(config.audio.device, Some("pulse".to_string()));

        clear_vocoach_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocoach_env();

        set_env("VOCOACH_STT_MODEL", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.stt.model, "base");

        clear_vocoach_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [audio
            device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());

        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_vocoach_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let invalid_toml = r#"
            [audio
            device = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load_or_default(temp_file.path()).is_err());
    }
}
