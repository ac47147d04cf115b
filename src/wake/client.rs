//! Reconnecting client for the wake-word sidecar's signal socket.
//!
//! The sidecar pushes one JSON object per line over a local TCP socket.
//! Disconnects trigger exponential backoff with a hard retry cap; once the
//! cap is hit the client declares the socket permanently down and refuses
//! to restart until the process is restarted or a new client is built.

use crate::bus::{BusEvent, EventBus, Subscription, Topic};
use crate::defaults;
use crate::error::{Result, VocoachError};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

/// One line from the wake sidecar.
#[derive(Debug, Deserialize)]
struct WakeSignal {
    #[serde(default)]
    triggered: bool,
    #[serde(default)]
    persona: Option<String>,
}

/// Backoff delay before reconnect attempt `attempt` (1-based).
///
/// Doubles from the base each attempt: 1 s, 2 s, 4 s, 8 s, 16 s.
pub fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(defaults::WAKE_MAX_RETRIES - 1);
    defaults::WAKE_RETRY_BASE * 2u32.pow(exponent)
}

struct Shared {
    bus: EventBus,
    host: String,
    port: u16,
    /// Set while synthesis plays; wake triggers are suppressed, not queued.
    paused: AtomicBool,
    running: AtomicBool,
    exhausted: AtomicBool,
}

/// Client for the wake sidecar's trigger socket.
pub struct WakeClient {
    shared: Arc<Shared>,
    cancel: Mutex<Option<watch::Sender<bool>>>,
    pause_subs: Mutex<Vec<Subscription>>,
}

impl WakeClient {
    pub fn new(bus: EventBus, host: &str, port: u16) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                host: host.to_string(),
                port,
                paused: AtomicBool::new(false),
                running: AtomicBool::new(false),
                exhausted: AtomicBool::new(false),
            }),
            cancel: Mutex::new(None),
            pause_subs: Mutex::new(Vec::new()),
        }
    }

    /// Connect and relay wake triggers onto the bus.
    ///
    /// Returns immediately; the connection loop runs in a background task.
    /// After retry exhaustion the client is permanently down and this fails
    /// without touching the network again.
    pub fn start(&self) -> Result<()> {
        if self.shared.exhausted.load(Ordering::SeqCst) {
            return Err(VocoachError::WakeRetriesExhausted {
                attempts: defaults::WAKE_MAX_RETRIES,
            });
        }
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        {
            let mut subs = self.pause_subs.lock().unwrap_or_else(|e| e.into_inner());
            let shared = Arc::clone(&self.shared);
            subs.push(self.shared.bus.subscribe(Topic::SpeechStarted, move |_| {
                shared.paused.store(true, Ordering::SeqCst);
            }));
            let shared = Arc::clone(&self.shared);
            subs.push(self.shared.bus.subscribe(Topic::SpeechEnded, move |_| {
                shared.paused.store(false, Ordering::SeqCst);
            }));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel_tx);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            run_loop(shared, cancel_rx).await;
        });
        Ok(())
    }

    /// Stop relaying. Idempotent.
    pub fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = cancel.send(true);
        }
        let subs: Vec<Subscription> = self
            .pause_subs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for sub in subs {
            sub.unsubscribe();
        }
        self.shared.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.shared.exhausted.load(Ordering::SeqCst)
    }
}

async fn run_loop(shared: Arc<Shared>, mut cancel: watch::Receiver<bool>) {
    let addr = format!("{}:{}", shared.host, shared.port);
    let mut attempt = 0u32;

    loop {
        let stream = tokio::select! {
            _ = cancel.changed() => break,
            result = TcpStream::connect(&addr) => result,
        };

        match stream {
            Ok(stream) => {
                tracing::info!(addr = %addr, "wake socket connected");
                attempt = 0;
                read_signals(&shared, stream, &mut cancel).await;
                if *cancel.borrow() {
                    break;
                }
                shared
                    .bus
                    .publish(BusEvent::WakeSocketDown { permanent: false });
            }
            Err(e) => {
                tracing::debug!(addr = %addr, "wake socket connect failed: {}", e);
            }
        }

        // The initial connect is not a retry; only reconnect attempts count
        // toward the cap, so every delay in the schedule gets slept.
        if attempt >= defaults::WAKE_MAX_RETRIES {
            tracing::warn!(
                addr = %addr,
                "wake socket unreachable after {} reconnect attempts; giving up",
                attempt
            );
            shared.exhausted.store(true, Ordering::SeqCst);
            shared
                .bus
                .publish(BusEvent::WakeSocketDown { permanent: true });
            break;
        }

        attempt += 1;
        let delay = retry_delay(attempt);
        tracing::debug!(addr = %addr, "reconnecting in {:?} (attempt {})", delay, attempt);
        tokio::select! {
            _ = cancel.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.running.store(false, Ordering::SeqCst);
}

/// Read lines until disconnect or cancel, relaying triggers onto the bus.
async fn read_signals(shared: &Shared, stream: TcpStream, cancel: &mut watch::Receiver<bool>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.changed() => return,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => match serde_json::from_str::<WakeSignal>(&line) {
                Ok(signal) if signal.triggered => {
                    if shared.paused.load(Ordering::SeqCst) {
                        tracing::debug!("wake trigger suppressed during playback");
                        continue;
                    }
                    shared.bus.publish(BusEvent::WakeTriggered {
                        persona: signal.persona.unwrap_or_default(),
                    });
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("dropping malformed wake line: {}", e),
            },
            Ok(None) => return,
            Err(e) => {
                tracing::debug!("wake socket read failed: {}", e);
                return;
            }
        }
    }
}
