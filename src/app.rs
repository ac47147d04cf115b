//! Composition root: wires the bus, engines, wake client, turn controller,
//! speech collaborators, and the conversation engine into one session loop.

use crate::audio::recorder::AudioSource;
use crate::bus::{BusEvent, EventBus, Subscription, Topic};
use crate::config::Config;
use crate::defaults;
use crate::engines::{known_engines, EngineSupervisor, HttpProbe};
use crate::error::{Result, VocoachError};
use crate::speech::{transcribe_with_timeout, SynthClient, SynthEngine, Transcriber};
use crate::turn::{BargeInMonitor, CaptureMode, CaptureOutcome, TurnConfig, TurnController};
use crate::tutor::{
    ConversationEngine, CourseFile, GradedAttempt, Grader, QuestionPool, SessionContext, TutorStep,
};
use crate::wake::WakeClient;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Work items forwarded from bus subscriptions to the session loop; bus
/// handlers are synchronous, the reactions are not.
enum SessionCommand {
    WakeCapture,
    TurnFinished(CaptureOutcome),
    BargeIn,
    SocketDown { permanent: bool },
}

/// Builds an audio source for one capture attempt.
pub type SourceFactory = Box<dyn Fn() -> Result<Box<dyn AudioSource>> + Send>;

pub struct App {
    config: Config,
    bus: EventBus,
    supervisor: Arc<EngineSupervisor>,
    wake: Arc<WakeClient>,
    turn: Arc<TurnController>,
    barge_in: Arc<BargeInMonitor>,
    synth: Arc<SynthClient>,
    transcriber: Arc<dyn Transcriber>,
    grader: Arc<dyn Grader>,
    source_factory: SourceFactory,
    course: CourseFile,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        sidecar_dir: PathBuf,
        artifact_dir: PathBuf,
        course: CourseFile,
        transcriber: Arc<dyn Transcriber>,
        grader: Arc<dyn Grader>,
        source_factory: SourceFactory,
    ) -> Self {
        let bus = EventBus::new();
        let supervisor = Arc::new(EngineSupervisor::new(
            bus.clone(),
            known_engines(&sidecar_dir),
            Arc::new(HttpProbe::new()),
        ));
        let wake = Arc::new(WakeClient::new(
            bus.clone(),
            &config.wake.host,
            config.wake.port,
        ));
        let turn = Arc::new(TurnController::new(
            bus.clone(),
            TurnConfig::from_audio(&config.audio, artifact_dir),
        ));
        let barge_in = Arc::new(BargeInMonitor::new(
            bus.clone(),
            turn.mic_in_use_flag(),
            config.audio.speech_threshold,
        ));
        let synth = Arc::new(SynthClient::new(
            bus.clone(),
            vec![
                SynthEngine::new("soprano", "127.0.0.1", defaults::SYNTH_PORT),
                SynthEngine::new("espeak-server", "127.0.0.1", defaults::SYNTH_PORT + 1),
            ],
            &config.synth,
        ));
        Self {
            config,
            bus,
            supervisor,
            wake,
            turn,
            barge_in,
            synth,
            transcriber,
            grader,
            source_factory,
            course,
        }
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Run the tutoring session until the conversation channel closes or
    /// ctrl-c arrives.
    pub async fn run(self) -> Result<()> {
        let started = self.supervisor.start_all().await;
        eprintln!("vocoach: engines up: {}", started.join(", "));
        if let Err(e) = self.wake.start() {
            eprintln!("vocoach: wake socket unavailable ({e}); push-to-talk only");
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subs = self.forward_bus_events(&tx);

        let mut tutor = ConversationEngine::new(
            self.course.lessons.clone(),
            QuestionPool::new(self.course.questions.clone()),
        )
        .with_session(SessionContext {
            course: self.course.course.clone(),
        });

        // Open the session: speak steps until one waits for an answer.
        self.drive(&mut tutor).await;

        loop {
            let command = tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                command = rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                SessionCommand::WakeCapture => self.begin_capture(CaptureMode::Wake),
                SessionCommand::BargeIn => self.begin_capture(CaptureMode::BargeIn),
                SessionCommand::TurnFinished(outcome) => {
                    self.handle_turn(&mut tutor, outcome).await;
                }
                SessionCommand::SocketDown { permanent } => {
                    if permanent {
                        eprintln!("vocoach: wake word unavailable; push-to-talk still works");
                    }
                }
            }
        }

        self.wake.stop();
        self.barge_in.stop();
        self.turn.cancel_capture();
        self.supervisor.stop_all();
        Ok(())
    }

    fn forward_bus_events(
        &self,
        tx: &mpsc::UnboundedSender<SessionCommand>,
    ) -> Vec<Subscription> {
        let forward = |topic, make: fn(&BusEvent) -> Option<SessionCommand>| {
            let tx = tx.clone();
            self.bus.subscribe(topic, move |event| {
                if let Some(command) = make(event) {
                    let _ = tx.send(command);
                }
            })
        };
        vec![
            forward(Topic::WakeTriggered, |_| Some(SessionCommand::WakeCapture)),
            forward(Topic::BargeIn, |_| Some(SessionCommand::BargeIn)),
            forward(Topic::CaptureStopped, |event| {
                if let BusEvent::CaptureStopped { outcome } = event {
                    Some(SessionCommand::TurnFinished(outcome.clone()))
                } else {
                    None
                }
            }),
            forward(Topic::WakeSocketDown, |event| {
                if let BusEvent::WakeSocketDown { permanent } = event {
                    Some(SessionCommand::SocketDown {
                        permanent: *permanent,
                    })
                } else {
                    None
                }
            }),
        ]
    }

    fn begin_capture(&self, mode: CaptureMode) {
        let source = match (self.source_factory)() {
            Ok(source) => source,
            Err(e) => {
                eprintln!("vocoach: microphone unavailable: {e}");
                return;
            }
        };
        match self.turn.begin_capture(mode, source) {
            Ok(()) => {}
            Err(VocoachError::CaptureBusy) => {
                tracing::debug!("capture already active, ignoring {:?} trigger", mode)
            }
            Err(e) => eprintln!("vocoach: could not start listening: {e}"),
        }
    }

    /// A finished turn: transcribe, grade against the waiting question,
    /// then speak the next steps.
    async fn handle_turn(&self, tutor: &mut ConversationEngine, outcome: CaptureOutcome) {
        let Some(artifact) = outcome.artifact else {
            tracing::debug!("turn ended with no audio, nothing to grade");
            return;
        };
        let Some(question_id) = tutor.active_question().map(str::to_string) else {
            tracing::debug!("turn ended outside a question, dropping transcript");
            return;
        };

        let transcript = match transcribe_with_timeout(
            self.transcriber.as_ref(),
            &artifact,
            &self.config.stt.model,
            defaults::TRANSCRIPTION_TIMEOUT,
        )
        .await
        {
            Ok(transcript) => transcript,
            Err(e) => {
                let step = tutor.step_failed(&e.to_string());
                self.report(&step).await;
                return;
            }
        };
        tracing::info!("heard: {}", transcript);

        let graded = match self.grade(&question_id, &transcript).await {
            Ok(graded) => graded,
            Err(e) => {
                let step = tutor.step_failed(&e.to_string());
                self.report(&step).await;
                return;
            }
        };
        if let Err(e) = tutor.record_attempt(graded) {
            tracing::warn!("could not record attempt: {}", e);
            return;
        }

        self.drive(tutor).await;
    }

    async fn grade(&self, question_id: &str, transcript: &str) -> Result<GradedAttempt> {
        let question = self
            .course
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| VocoachError::NoContent {
                message: format!("unknown question {question_id}"),
            })?;
        self.grader.grade(question, transcript).await
    }

    /// Advance the conversation, speaking each step, until one waits for
    /// a spoken answer or has nothing further to do.
    async fn drive(&self, tutor: &mut ConversationEngine) {
        loop {
            let step = tutor.advance();
            self.report(&step).await;
            if step.auto_capture {
                self.begin_capture(CaptureMode::Auto);
                return;
            }
            match step.auto_advance_after {
                Some(pause) => tokio::time::sleep(pause).await,
                None => return,
            }
        }
    }

    async fn report(&self, step: &TutorStep) {
        if let Some(status) = &step.status {
            eprintln!("vocoach: {status}");
        }
        if step.text.is_empty() {
            return;
        }

        // The barge-in tap runs only for the duration of playback; the
        // shared mic flag keeps it out of the way of real captures.
        match (self.source_factory)() {
            Ok(tap) => {
                if let Err(e) = self.barge_in.start(tap) {
                    tracing::debug!("barge-in monitor not started: {}", e);
                }
            }
            Err(e) => tracing::debug!("no barge-in tap: {}", e),
        }

        let spoken = self.synth.speak(&step.text).await;
        self.barge_in.stop();

        match spoken {
            Ok(engine) => tracing::debug!(engine = %engine, "spoke step"),
            Err(e) => eprintln!("vocoach: {e}"),
        }
    }
}
