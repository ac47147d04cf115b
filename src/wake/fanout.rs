//! Best-effort fan-out of captured audio frames.
//!
//! Mirrors the wake sidecar's listener registry: every attached listener
//! receives each inbound frame, and a listener that has gone away is pruned
//! on the next broadcast. Delivery is best-effort; nothing is replayed.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A shareable frame of mono PCM samples.
pub type Frame = Arc<[i16]>;

/// Registry of frame listeners.
#[derive(Default)]
pub struct FrameFanout {
    senders: Mutex<Vec<mpsc::UnboundedSender<Frame>>>,
}

impl FrameFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener. The returned receiver yields every frame
    /// broadcast after this call; dropping it detaches the listener.
    pub fn attach(&self) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Send a frame to every live listener, pruning dead ones.
    pub fn broadcast(&self, samples: &[i16]) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        if senders.is_empty() {
            return;
        }
        let frame: Frame = Arc::from(samples);
        senders.retain(|tx| tx.send(Arc::clone(&frame)).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.senders.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
