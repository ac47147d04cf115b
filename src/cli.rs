//! Command-line surface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vocoach", version, about = "Local spoken-dialogue tutor")]
pub struct Cli {
    /// Path to the config file (defaults to the platform config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a tutoring session (the default).
    Run {
        /// Course file (TOML with lessons and questions).
        #[arg(long)]
        course: PathBuf,
        /// Directory holding the engine sidecar scripts.
        #[arg(long)]
        sidecars: Option<PathBuf>,
    },
    /// Show each known engine and whether its port is serving.
    Engines {
        #[arg(long)]
        sidecars: Option<PathBuf>,
    },
    /// Print the effective configuration.
    Config,
}

/// Default location of the engine sidecar scripts.
pub fn default_sidecar_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vocoach")
        .join("engines")
}

/// Directory recorded turn artifacts are written to.
pub fn artifact_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vocoach")
        .join("turns")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_course() {
        let cli = Cli::parse_from(["vocoach", "run", "--course", "rust.toml"]);
        match cli.command {
            Some(Command::Run { course, sidecars }) => {
                assert_eq!(course, PathBuf::from("rust.toml"));
                assert!(sidecars.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_bare_invocation() {
        let cli = Cli::parse_from(["vocoach"]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_accepts_global_config_flag() {
        let cli = Cli::parse_from(["vocoach", "--config", "/tmp/v.toml", "config"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/v.toml")));
        assert!(matches!(cli.command, Some(Command::Config)));
    }
}
