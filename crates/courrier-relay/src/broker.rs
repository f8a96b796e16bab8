//! Named queue registry with fire-and-forget publishing.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::consumer::Consumer;
use crate::error::RelayError;

struct Queue {
    tx: mpsc::UnboundedSender<Bytes>,
    // Held until a consumer claims the queue.
    rx: Option<mpsc::UnboundedReceiver<Bytes>>,
}

/// Registry of named queues. Constructed once at process start and shared
/// by reference between the pipeline (publisher) and the consumers.
pub struct Broker {
    queues: Mutex<HashMap<String, Queue>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Broker {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queues: Mutex::new(HashMap::new()),
            shutdown_tx,
        }
    }

    /// Declare a queue. Idempotent; declaring an existing queue is a no-op.
    pub fn declare(&self, name: &str) {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        queues.entry(name.to_string()).or_insert_with(|| {
            debug!(queue = name, "declared queue");
            let (tx, rx) = mpsc::unbounded_channel();
            Queue { tx, rx: Some(rx) }
        });
    }

    /// Enqueue an envelope. Returns once the queue has accepted it, not
    /// once a consumer has processed it.
    pub fn publish(&self, queue: &str, envelope: Bytes) -> Result<(), RelayError> {
        let queues = self.queues.lock().expect("broker lock poisoned");
        let entry = queues
            .get(queue)
            .ok_or_else(|| RelayError::UnknownQueue(queue.to_string()))?;

        entry
            .tx
            .send(envelope)
            .map_err(|_| RelayError::QueueClosed(queue.to_string()))?;

        debug!(queue, "published envelope");
        Ok(())
    }

    /// Claim the consuming end of a queue. Each queue supports exactly one
    /// in-process consumer; a second claim fails.
    pub fn consume(&self, queue: &str) -> Result<Consumer, RelayError> {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        let entry = queues
            .get_mut(queue)
            .ok_or_else(|| RelayError::UnknownQueue(queue.to_string()))?;

        let rx = entry
            .rx
            .take()
            .ok_or_else(|| RelayError::AlreadyConsuming(queue.to_string()))?;

        Ok(Consumer::new(
            queue.to_string(),
            rx,
            self.shutdown_tx.subscribe(),
        ))
    }

    /// Number of envelopes sitting in a queue that no consumer has claimed
    /// yet. Returns zero once the receiving end has been handed out.
    pub fn depth(&self, queue: &str) -> Result<usize, RelayError> {
        let queues = self.queues.lock().expect("broker lock poisoned");
        let entry = queues
            .get(queue)
            .ok_or_else(|| RelayError::UnknownQueue(queue.to_string()))?;
        Ok(entry.rx.as_ref().map(|rx| rx.len()).unwrap_or(0))
    }

    /// Signal every consumer to stop. Consumers finish their in-flight
    /// handler invocation before exiting; queued envelopes are left behind.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}
