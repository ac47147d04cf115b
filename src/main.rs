#[cfg(feature = "cli")]
mod cli_main {
    use clap::Parser;
    use std::path::PathBuf;
    use std::sync::Arc;
    use vocoach::app::App;
    use vocoach::audio::recorder::{AudioSource, AudioSourceConfig};
    use vocoach::cli::{artifact_dir, default_sidecar_dir, Cli, Command};
    use vocoach::config::Config;
    use vocoach::defaults;
    use vocoach::engines::{known_engines, HttpProbe, ReadinessProbe};
    use vocoach::error::Result;
    use vocoach::speech::HttpTranscriber;
    use vocoach::tutor::{CourseFile, HttpGrader};

    pub async fn run() -> anyhow::Result<()> {
        let cli = Cli::parse();

        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();

        let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
        let config = Config::load_or_default(&config_path)?.with_env_overrides();

        match cli.command {
            Some(Command::Run { course, sidecars }) => {
                run_session(config, course, sidecars).await?;
            }
            Some(Command::Engines { sidecars }) => {
                show_engines(sidecars).await;
            }
            Some(Command::Config) | None => {
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Ok(())
    }

    async fn run_session(
        config: Config,
        course: PathBuf,
        sidecars: Option<PathBuf>,
    ) -> anyhow::Result<()> {
        let course = CourseFile::load(&course)?;
        let sidecar_dir = sidecars.unwrap_or_else(default_sidecar_dir);
        let artifacts = artifact_dir();
        std::fs::create_dir_all(&artifacts)?;

        let transcriber = Arc::new(HttpTranscriber::new("127.0.0.1", defaults::STT_PORT));
        let grader = Arc::new(HttpGrader::new("127.0.0.1", defaults::STT_PORT));

        let source_config = AudioSourceConfig {
            device: config.audio.device.clone(),
            sample_rate: config.audio.sample_rate,
        };
        #[cfg(feature = "cpal-audio")]
        let source_factory = Box::new(move || -> Result<Box<dyn AudioSource>> {
            let source = vocoach::audio::capture::CpalAudioSource::new(&source_config)?;
            Ok(Box::new(source))
        });
        #[cfg(not(feature = "cpal-audio"))]
        let source_factory = {
            let _ = source_config;
            Box::new(|| -> Result<Box<dyn AudioSource>> {
                Err(vocoach::VocoachError::AudioCapture {
                    message: "built without the cpal-audio feature".to_string(),
                })
            })
        };

        eprintln!("vocoach {} starting", vocoach::version_string());
        let app = App::new(
            config,
            sidecar_dir,
            artifacts,
            course,
            transcriber,
            grader,
            source_factory,
        );
        app.run().await?;
        Ok(())
    }

    async fn show_engines(sidecars: Option<PathBuf>) {
        let sidecar_dir = sidecars.unwrap_or_else(default_sidecar_dir);
        let probe = HttpProbe::new();
        for spec in known_engines(&sidecar_dir) {
            let script = match spec.locate_script() {
                Some(path) => path.display().to_string(),
                None => "missing".to_string(),
            };
            let serving = probe.is_alive(spec.port).await;
            println!(
                "{:<22} port {:<5} {:<8} script: {}",
                spec.name,
                spec.port,
                if serving { "serving" } else { "down" },
                script,
            );
        }
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli_main::run().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("vocoach was built without the `cli` feature; nothing to run");
    std::process::exit(1);
}
