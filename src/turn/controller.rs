//! The audio turn controller.
//!
//! Manages exactly one microphone capture at a time, runs per-frame loudness
//! analysis for voice-activity detection, and decides when a turn ends. The
//! silence-stop gate is the core correctness property here: auto-stop fires
//! only when silence has lasted long enough AND the recording has passed its
//! minimum-duration floor, so a slow starter is never truncated.

use crate::audio::recorder::{AudioSource, SampleBuffer};
use crate::audio::vad::{Clock, LoudnessAnalyzer, SystemClock};
use crate::audio::wav;
use crate::bus::{BusEvent, EventBus};
use crate::defaults;
use crate::error::{Result, VocoachError};
use crate::turn::{
    AmplitudeSample, AmplitudeSource, CancelAck, CaptureMode, CaptureOutcome, StopReason,
};
use crate::wake::FrameFanout;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Tuning for a capture session, derived from [`crate::config::AudioConfig`].
#[derive(Debug, Clone)]
pub struct TurnConfig {
    pub speech_threshold: f32,
    /// Already clamped to [900, 1200] ms by the config layer.
    pub silence_stop_ms: u32,
    pub min_capture_ms: u32,
    pub sample_rate: u32,
    /// Directory recorded-audio artifacts are written to.
    pub artifact_dir: PathBuf,
}

impl TurnConfig {
    pub fn from_audio(audio: &crate::config::AudioConfig, artifact_dir: PathBuf) -> Self {
        Self {
            speech_threshold: audio.speech_threshold,
            silence_stop_ms: audio.effective_silence_stop_ms(),
            min_capture_ms: defaults::MIN_CAPTURE_MS,
            sample_rate: audio.sample_rate,
            artifact_dir,
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            speech_threshold: defaults::SPEECH_THRESHOLD,
            silence_stop_ms: defaults::SILENCE_STOP_MS,
            min_capture_ms: defaults::MIN_CAPTURE_MS,
            sample_rate: defaults::SAMPLE_RATE,
            artifact_dir: std::env::temp_dir(),
        }
    }
}

/// What one processed frame tells the capture loop.
#[derive(Debug, Clone, Copy)]
pub struct FrameVerdict {
    pub sample: AmplitudeSample,
    pub is_speech: bool,
    /// Both silence-stop conditions are met; the session should end.
    pub auto_stop: bool,
}

/// The synchronous core of one capture attempt.
///
/// Owns the buffered recording and the silence-stop bookkeeping; knows
/// nothing about devices or tasks, which makes the gate testable with a
/// mock clock and scripted frames.
pub struct CaptureSession<C: Clock = SystemClock> {
    mode: CaptureMode,
    clock: C,
    analyzer: LoudnessAnalyzer,
    config: TurnConfig,
    started_at: Instant,
    last_sound: Instant,
    last_elapsed_ms: u64,
    buffer: SampleBuffer,
}

impl<C: Clock> CaptureSession<C> {
    pub fn with_clock(mode: CaptureMode, config: TurnConfig, clock: C) -> Self {
        let now = clock.now();
        let sample_rate = config.sample_rate;
        Self {
            mode,
            clock,
            analyzer: LoudnessAnalyzer::new(),
            config,
            started_at: now,
            // A session that never hears speech still silence-stops,
            // measured from its start.
            last_sound: now,
            last_elapsed_ms: 0,
            buffer: SampleBuffer::new(sample_rate),
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Total recording duration so far.
    pub fn duration(&self) -> Duration {
        self.clock.now().duration_since(self.started_at)
    }

    /// Process one analysis frame: buffer it, measure loudness, and apply
    /// the two-condition silence-stop gate.
    pub fn process_frame(&mut self, frame: &[i16]) -> FrameVerdict {
        self.buffer.append(frame);

        let loudness = self.analyzer.analyze(frame);
        let is_speech = loudness.is_speech(self.config.speech_threshold);
        let now = self.clock.now();

        if is_speech {
            self.last_sound = now;
        }

        let silence_elapsed = now.duration_since(self.last_sound);
        let total = now.duration_since(self.started_at);

        // The floor gate always wins: never stop before min_capture_ms,
        // regardless of how long the silence has lasted.
        let auto_stop = silence_elapsed
            > Duration::from_millis(self.config.silence_stop_ms as u64)
            && total >= Duration::from_millis(self.config.min_capture_ms as u64);

        // Amplitude timestamps are monotonic within a session.
        let elapsed_ms = (total.as_millis() as u64).max(self.last_elapsed_ms);
        self.last_elapsed_ms = elapsed_ms;

        FrameVerdict {
            sample: AmplitudeSample {
                level: loudness.level(),
                source: AmplitudeSource::Microphone,
                elapsed_ms,
            },
            is_speech,
            auto_stop,
        }
    }

    /// Finalize the session into an outcome, writing the WAV artifact when
    /// any audio was captured.
    pub fn finish(self, reason: StopReason) -> CaptureOutcome {
        let duration_ms = self.duration().as_millis() as u64;
        let artifact = if self.buffer.is_empty() {
            None
        } else {
            let path = self
                .config
                .artifact_dir
                .join(format!("turn-{}.wav", nanos_now()));
            match wav::write_artifact(&path, self.buffer.samples()) {
                Ok(()) => Some(path),
                Err(e) => {
                    tracing::warn!("failed to write capture artifact: {}", e);
                    None
                }
            }
        };

        CaptureOutcome {
            mode: self.mode,
            reason,
            artifact,
            duration_ms,
        }
    }
}

impl CaptureSession<SystemClock> {
    pub fn new(mode: CaptureMode, config: TurnConfig) -> Self {
        Self::with_clock(mode, config, SystemClock)
    }
}

fn nanos_now() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

struct ActiveCapture {
    cancel_tx: watch::Sender<bool>,
}

/// Owns the microphone and the at-most-one-session invariant.
///
/// `begin_capture` spawns a frame loop that publishes amplitude samples and
/// ends the session on silence, cancellation, or device loss. The device is
/// released before the `CaptureStopped` event is published, so a listener
/// that immediately starts a new capture never contends for a still-held
/// microphone.
pub struct TurnController {
    bus: EventBus,
    config: TurnConfig,
    mic_in_use: Arc<AtomicBool>,
    active: Arc<std::sync::Mutex<Option<ActiveCapture>>>,
    frame_taps: Arc<FrameFanout>,
}

impl TurnController {
    pub fn new(bus: EventBus, config: TurnConfig) -> Self {
        Self {
            bus,
            config,
            mic_in_use: Arc::new(AtomicBool::new(false)),
            active: Arc::new(std::sync::Mutex::new(None)),
            frame_taps: Arc::new(FrameFanout::new()),
        }
    }

    /// The shared "microphone in use" flag; the barge-in monitor checks it
    /// so its tap never runs concurrently with a real capture.
    pub fn mic_in_use_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.mic_in_use)
    }

    /// Registry of raw-frame listeners; every captured frame is broadcast
    /// to whatever is attached (streaming recognizers, level meters).
    pub fn frame_taps(&self) -> Arc<FrameFanout> {
        Arc::clone(&self.frame_taps)
    }

    pub fn is_capturing(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Start a capture session in the given mode.
    ///
    /// Fails fast with `CaptureBusy` if one is already active, and with a
    /// structured microphone failure (no partial session) if the source
    /// cannot start.
    pub fn begin_capture(
        &self,
        mode: CaptureMode,
        mut source: Box<dyn AudioSource>,
    ) -> Result<()> {
        if self
            .mic_in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VocoachError::CaptureBusy);
        }

        if let Err(e) = source.start() {
            // No partial state: release the flag before surfacing the error.
            self.mic_in_use.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            *active = Some(ActiveCapture { cancel_tx });
        }

        self.bus.publish(BusEvent::CaptureStarted { mode });

        let session = CaptureSession::new(mode, self.config.clone());
        let bus = self.bus.clone();
        let mic_in_use = Arc::clone(&self.mic_in_use);
        let active = Arc::clone(&self.active);
        let taps = Arc::clone(&self.frame_taps);

        tokio::spawn(async move {
            run_capture_loop(session, source, bus, mic_in_use, active, taps, cancel_rx).await;
        });

        Ok(())
    }

    /// Request the active capture to stop.
    ///
    /// Idempotent: with no capture active it reports `already_stopped`
    /// instead of erroring. Cleanup and the `CaptureStopped` event happen on
    /// the capture task.
    pub fn cancel_capture(&self) -> CancelAck {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(capture) => {
                // Send failure means the loop already exited; still a stop.
                let _ = capture.cancel_tx.send(true);
                CancelAck {
                    already_stopped: false,
                }
            }
            None => CancelAck {
                already_stopped: true,
            },
        }
    }
}

/// Frame pacing interval (~33 Hz, within the 30-60 Hz UI feedback target).
const FRAME_INTERVAL: Duration = Duration::from_millis(30);

async fn run_capture_loop(
    mut session: CaptureSession,
    mut source: Box<dyn AudioSource>,
    bus: EventBus,
    mic_in_use: Arc<AtomicBool>,
    active: Arc<std::sync::Mutex<Option<ActiveCapture>>>,
    taps: Arc<FrameFanout>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let reason = loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    break StopReason::Cancelled;
                }
            }
            _ = ticker.tick() => {
                let frame = match source.read_samples() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("device lost mid-capture: {}", e);
                        break StopReason::DeviceLost;
                    }
                };
                if frame.is_empty() {
                    continue;
                }
                taps.broadcast(&frame);

                let verdict = session.process_frame(&frame);
                bus.publish(BusEvent::Amplitude { sample: verdict.sample });

                if verdict.auto_stop {
                    break StopReason::Silence;
                }
            }
        }
    };

    // Release the device and the session slot before publishing, so a
    // listener that immediately begins a new capture does not race the
    // still-held microphone.
    if let Err(e) = source.stop() {
        tracing::warn!("audio source stop failed: {}", e);
    }
    drop(source);
    {
        let mut guard = active.lock().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }
    mic_in_use.store(false, Ordering::SeqCst);

    let outcome = session.finish(reason);
    bus.publish(BusEvent::CaptureStopped { outcome });
}
