//! The engine process supervisor.
//!
//! Owns spawn, readiness tracking, and teardown for the engine sidecars.
//! Exit (crash or normal) flips an engine to `Exited` and drops the process
//! handle; there is no auto-restart. A restart storm on a broken local
//! model install is worse than a clear "unavailable" signal, so restarting
//! is always an explicit caller decision.

use crate::bus::{BusEvent, EventBus};
use crate::engines::readiness::ReadinessProbe;
use crate::engines::spec::EngineSpec;
use crate::engines::EngineState;
use crate::error::{Result, VocoachError};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::Command;
use tokio::sync::watch;

struct Entry {
    spec: EngineSpec,
    state: EngineState,
    started_at: Option<Instant>,
    /// Present while a monitor task supervises a live child process.
    kill_tx: Option<watch::Sender<bool>>,
}

type EntryMap = Arc<Mutex<HashMap<String, Entry>>>;

/// Supervisor for the external engine sidecars.
pub struct EngineSupervisor {
    bus: EventBus,
    probe: Arc<dyn ReadinessProbe>,
    engines: EntryMap,
}

impl EngineSupervisor {
    pub fn new(bus: EventBus, specs: Vec<EngineSpec>, probe: Arc<dyn ReadinessProbe>) -> Self {
        let engines = specs
            .into_iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    Entry {
                        spec,
                        state: EngineState::NotStarted,
                        started_at: None,
                        kill_tx: None,
                    },
                )
            })
            .collect();
        Self {
            bus,
            probe,
            engines: Arc::new(Mutex::new(engines)),
        }
    }

    /// Start an engine by name.
    ///
    /// Returns `Ok(false)` when no candidate script exists — the engine is
    /// optional and its absence is status, not an error. When the engine's
    /// port already answers a probe, another instance is serving; the
    /// engine is marked Ready without spawning a duplicate.
    pub async fn start(&self, name: &str) -> Result<bool> {
        let (spec, state) = {
            let engines = self.engines.lock().unwrap_or_else(|e| e.into_inner());
            let entry = engines.get(name).ok_or_else(|| VocoachError::EngineUnknown {
                name: name.to_string(),
            })?;
            (entry.spec.clone(), entry.state)
        };

        if matches!(state, EngineState::Starting | EngineState::Ready) {
            return Ok(true);
        }

        // Port already serving: treat "already bound" as proof of liveness.
        if self.probe.is_alive(spec.port).await {
            tracing::info!(engine = %name, port = spec.port, "port already serving; adopting as ready");
            set_state(&self.engines, &self.bus, name, EngineState::Ready);
            return Ok(true);
        }

        let Some(script) = spec.locate_script() else {
            tracing::debug!(engine = %name, "no engine script found; skipping");
            return Ok(false);
        };

        let mut command = Command::new(&spec.interpreter);
        command
            .arg(&script)
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| VocoachError::EngineSpawn {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        let stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        let stderr = child.stderr.take().map(|s| BufReader::new(s).lines());

        let (kill_tx, kill_rx) = watch::channel(false);
        {
            let mut engines = self.engines.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = engines.get_mut(name) {
                entry.state = EngineState::Starting;
                entry.started_at = Some(Instant::now());
                entry.kill_tx = Some(kill_tx);
            }
        }
        self.bus.publish(BusEvent::EngineState {
            name: name.to_string(),
            state: EngineState::Starting,
        });

        let engines = Arc::clone(&self.engines);
        let bus = self.bus.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            monitor_engine(child, spec, stdout, stderr, kill_rx, engines, bus, name).await;
        });

        Ok(true)
    }

    /// Start every known engine, in declaration order.
    ///
    /// Returns the names that actually started (or were adopted as Ready).
    pub async fn start_all(&self) -> Vec<String> {
        let names: Vec<String> = {
            let engines = self.engines.lock().unwrap_or_else(|e| e.into_inner());
            engines.keys().cloned().collect()
        };
        let mut started = Vec::new();
        for name in names {
            match self.start(&name).await {
                Ok(true) => started.push(name),
                Ok(false) => {}
                Err(e) => tracing::warn!("engine {} failed to start: {}", name, e),
            }
        }
        started
    }

    /// Request termination of an engine's process.
    ///
    /// Idempotent and infallible: stopping an engine that is not running
    /// does nothing.
    pub fn stop(&self, name: &str) {
        let kill_tx = {
            let mut engines = self.engines.lock().unwrap_or_else(|e| e.into_inner());
            engines.get_mut(name).and_then(|entry| entry.kill_tx.take())
        };
        if let Some(kill_tx) = kill_tx {
            // Monitor may already have exited; nothing to do then.
            let _ = kill_tx.send(true);
        }
    }

    /// Stop every supervised engine.
    pub fn stop_all(&self) {
        let names: Vec<String> = {
            let engines = self.engines.lock().unwrap_or_else(|e| e.into_inner());
            engines.keys().cloned().collect()
        };
        for name in names {
            self.stop(&name);
        }
    }

    /// Pure query: is the engine Ready right now?
    pub fn is_ready(&self, name: &str) -> bool {
        self.state(name) == Some(EngineState::Ready)
    }

    /// Pure query: current readiness state, if the engine is known.
    pub fn state(&self, name: &str) -> Option<EngineState> {
        let engines = self.engines.lock().unwrap_or_else(|e| e.into_inner());
        engines.get(name).map(|entry| entry.state)
    }

    /// Pure query: the engine's listen port, if the engine is known.
    pub fn port(&self, name: &str) -> Option<u16> {
        let engines = self.engines.lock().unwrap_or_else(|e| e.into_inner());
        engines.get(name).map(|entry| entry.spec.port)
    }
}

fn set_state(engines: &EntryMap, bus: &EventBus, name: &str, next: EngineState) {
    let changed = {
        let mut engines = engines.lock().unwrap_or_else(|e| e.into_inner());
        match engines.get_mut(name) {
            Some(entry) if entry.state.can_transition_to(next) => {
                entry.state = next;
                if matches!(next, EngineState::Exited | EngineState::Unavailable) {
                    entry.kill_tx = None;
                }
                true
            }
            Some(entry) => {
                tracing::debug!(
                    engine = %name,
                    "ignoring illegal state transition {:?} -> {:?}",
                    entry.state,
                    next
                );
                false
            }
            None => false,
        }
    };
    if changed {
        bus.publish(BusEvent::EngineState {
            name: name.to_string(),
            state: next,
        });
    }
}

/// Poll the next line from an optional line stream; pends forever on None
/// so exhausted streams can be disabled inside `select!`.
async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Option<Lines<R>>) -> Option<String> {
    match lines {
        Some(l) => match l.next_line().await {
            Ok(Some(line)) => Some(line),
            _ => None,
        },
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn monitor_engine(
    mut child: tokio::process::Child,
    spec: EngineSpec,
    mut stdout: Option<Lines<BufReader<tokio::process::ChildStdout>>>,
    mut stderr: Option<Lines<BufReader<tokio::process::ChildStderr>>>,
    mut kill_rx: watch::Receiver<bool>,
    engines: EntryMap,
    bus: EventBus,
    name: String,
) {
    let mut ready = false;
    let startup = tokio::time::sleep(spec.startup_timeout);
    tokio::pin!(startup);

    loop {
        tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => {
                match line {
                    Some(line) => {
                        tracing::debug!(engine = %name, "stdout: {}", line);
                        if !ready && spec.matches_ready_marker(&line) {
                            ready = true;
                            set_state(&engines, &bus, &name, EngineState::Ready);
                        }
                    }
                    None => stdout = None,
                }
            }
            line = next_line(&mut stderr), if stderr.is_some() => {
                match line {
                    Some(line) => {
                        tracing::debug!(engine = %name, "stderr: {}", line);
                        if !ready && spec.matches_ready_marker(&line) {
                            ready = true;
                            set_state(&engines, &bus, &name, EngineState::Ready);
                        }
                    }
                    None => stderr = None,
                }
            }
            _ = &mut startup, if !ready => {
                tracing::warn!(
                    engine = %name,
                    "no ready marker within {:?}; killing",
                    spec.startup_timeout
                );
                let _ = child.start_kill();
                let _ = child.wait().await;
                set_state(&engines, &bus, &name, EngineState::Unavailable);
                return;
            }
            changed = kill_rx.changed() => {
                if changed.is_err() || *kill_rx.borrow() {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    set_state(&engines, &bus, &name, EngineState::Exited);
                    return;
                }
            }
            status = child.wait() => {
                match status {
                    Ok(status) => tracing::info!(engine = %name, "exited with {}", status),
                    Err(e) => tracing::warn!(engine = %name, "wait failed: {}", e),
                }
                set_state(&engines, &bus, &name, EngineState::Exited);
                return;
            }
        }
    }
}
