//! Barge-in detection.
//!
//! While synthesis audio is playing and no capture session is active, a
//! lightweight monitoring tap watches microphone loudness without
//! recording. A threshold crossing publishes a `BargeIn` event; the
//! expected external reaction is to stop playback and immediately begin a
//! real capture in barge-in mode. The monitor never stops playback itself.
//! Tap levels are republished as `Amplitude` samples tagged as output-side
//! so level meters keep moving during playback.

use crate::audio::recorder::AudioSource;
use crate::audio::vad::LoudnessAnalyzer;
use crate::bus::{BusEvent, EventBus};
use crate::error::Result;
use crate::turn::{AmplitudeSample, AmplitudeSource};
use std::time::Instant;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

const TAP_INTERVAL: Duration = Duration::from_millis(30);

/// Playback-time interrupt monitor.
///
/// Shares the turn controller's "microphone in use" flag: the tap refuses
/// to start while a capture session holds the microphone, and shuts itself
/// down if one starts mid-monitoring.
pub struct BargeInMonitor {
    bus: EventBus,
    mic_in_use: Arc<AtomicBool>,
    threshold: f32,
    running: Arc<AtomicBool>,
    cancel: std::sync::Mutex<Option<watch::Sender<bool>>>,
}

impl BargeInMonitor {
    pub fn new(bus: EventBus, mic_in_use: Arc<AtomicBool>, threshold: f32) -> Self {
        Self {
            bus,
            mic_in_use,
            threshold,
            running: Arc::new(AtomicBool::new(false)),
            cancel: std::sync::Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start monitoring on the given tap source.
    ///
    /// Returns `Ok(false)` without side effects when the microphone is held
    /// by a capture session or a monitor is already running.
    pub fn start(&self, mut source: Box<dyn AudioSource>) -> Result<bool> {
        if self.mic_in_use.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        if let Err(e) = source.start() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        {
            let mut guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
            *guard = Some(cancel_tx);
        }

        let bus = self.bus.clone();
        let mic_in_use = Arc::clone(&self.mic_in_use);
        let running = Arc::clone(&self.running);
        let threshold = self.threshold;

        tokio::spawn(async move {
            let analyzer = LoudnessAnalyzer::new();
            let started = Instant::now();
            let mut ticker = tokio::time::interval(TAP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            let interrupted = loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break false;
                        }
                    }
                    _ = ticker.tick() => {
                        // A capture session took the microphone; stand down.
                        if mic_in_use.load(Ordering::SeqCst) {
                            break false;
                        }
                        let frame = match source.read_samples() {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::debug!("barge-in tap lost its source: {}", e);
                                break false;
                            }
                        };
                        if frame.is_empty() {
                            continue;
                        }
                        let loudness = analyzer.analyze(&frame);
                        bus.publish(BusEvent::Amplitude {
                            sample: AmplitudeSample {
                                level: loudness.level(),
                                source: AmplitudeSource::Output,
                                elapsed_ms: started.elapsed().as_millis() as u64,
                            },
                        });
                        if loudness.is_speech(threshold) {
                            break true;
                        }
                    }
                }
            };

            // Release the tap before publishing so the reaction (begin a
            // real capture) never contends for the microphone.
            if let Err(e) = source.stop() {
                tracing::debug!("barge-in tap stop failed: {}", e);
            }
            drop(source);
            running.store(false, Ordering::SeqCst);

            if interrupted {
                bus.publish(BusEvent::BargeIn);
            }
        });

        Ok(true)
    }

    /// Stop monitoring. Idempotent; safe to call when nothing is running.
    pub fn stop(&self) {
        let guard = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cancel_tx) = guard.as_ref() {
            let _ = cancel_tx.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::recorder::MockAudioSource;
    use crate::bus::Topic;
    use crate::defaults;
    use std::sync::atomic::AtomicUsize;

    fn loud_frame() -> Vec<i16> {
        vec![6000i16; 480]
    }

    fn quiet_frame() -> Vec<i16> {
        vec![0i16; 480]
    }

    async fn wait_for(hits: &Arc<AtomicUsize>, expected: usize) {
        for _ in 0..100 {
            if hits.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn loudness_crossing_publishes_barge_in() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let sub = bus.subscribe(Topic::BargeIn, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mic_in_use = Arc::new(AtomicBool::new(false));
        let monitor = BargeInMonitor::new(bus, mic_in_use, defaults::SPEECH_THRESHOLD);

        let source = MockAudioSource::new().with_frames(vec![
            quiet_frame(),
            quiet_frame(),
            loud_frame(),
        ]);
        assert!(monitor.start(Box::new(source)).unwrap());

        wait_for(&hits, 1).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_running());
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn monitor_refuses_to_start_while_mic_in_use() {
        let bus = EventBus::new();
        let mic_in_use = Arc::new(AtomicBool::new(true));
        let monitor = BargeInMonitor::new(bus, mic_in_use, defaults::SPEECH_THRESHOLD);

        let started = monitor.start(Box::new(MockAudioSource::new())).unwrap();
        assert!(!started);
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn monitor_stands_down_when_capture_takes_microphone() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        let sub = bus.subscribe(Topic::BargeIn, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mic_in_use = Arc::new(AtomicBool::new(false));
        let monitor = BargeInMonitor::new(bus, Arc::clone(&mic_in_use), defaults::SPEECH_THRESHOLD);

        // Quiet frames only, so the exit has to come from the mic flag.
        let source = MockAudioSource::new().with_frames(vec![quiet_frame(); 200]);
        assert!(monitor.start(Box::new(source)).unwrap());

        mic_in_use.store(true, Ordering::SeqCst);
        for _ in 0..50 {
            if !monitor.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!monitor.is_running());
        assert_eq!(hits.load(Ordering::SeqCst), 0, "no interrupt expected");
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let bus = EventBus::new();
        let mic_in_use = Arc::new(AtomicBool::new(false));
        let monitor = BargeInMonitor::new(bus, mic_in_use, defaults::SPEECH_THRESHOLD);

        // Nothing running: both calls are no-ops.
        monitor.stop();
        monitor.stop();

        let source = MockAudioSource::new().with_frames(vec![quiet_frame(); 100]);
        assert!(monitor.start(Box::new(source)).unwrap());
        monitor.stop();
        monitor.stop();

        for _ in 0..50 {
            if !monitor.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn second_start_while_running_is_a_no_op() {
        let bus = EventBus::new();
        let mic_in_use = Arc::new(AtomicBool::new(false));
        let monitor = BargeInMonitor::new(bus, mic_in_use, defaults::SPEECH_THRESHOLD);

        let source = MockAudioSource::new().with_frames(vec![quiet_frame(); 100]);
        assert!(monitor.start(Box::new(source)).unwrap());
        assert!(!monitor.start(Box::new(MockAudioSource::new())).unwrap());

        monitor.stop();
    }
}
