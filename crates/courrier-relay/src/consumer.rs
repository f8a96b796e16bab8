//! Consume loop with an explicit start/stop lifecycle.
//!
//! Every delivered envelope is removed from the queue whether or not the
//! handler succeeded: a handler failure is logged and the envelope is
//! discarded rather than redelivered. This trades durability of a single
//! envelope for queue hygiene and is the as-built relay policy; a bounded
//! retry would slot into [`Consumer::run`] without touching handlers.

use std::future::Future;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// Single-queue consumer. Obtained from [`Broker::consume`] and driven by
/// [`run`](Consumer::run) on a dedicated task.
///
/// [`Broker::consume`]: crate::Broker::consume
pub struct Consumer {
    queue: String,
    rx: mpsc::UnboundedReceiver<Bytes>,
    shutdown: watch::Receiver<bool>,
}

impl Consumer {
    pub(crate) fn new(
        queue: String,
        rx: mpsc::UnboundedReceiver<Bytes>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            rx,
            shutdown,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Run until the broker signals shutdown or the queue closes.
    ///
    /// A shutdown signal stops the intake of new envelopes immediately,
    /// but an in-flight `handler` invocation always runs to completion;
    /// no delivered envelope is abandoned mid-handling.
    pub async fn run<H, Fut>(mut self, mut handler: H)
    where
        H: FnMut(Bytes) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        info!(queue = %self.queue, "consumer started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }

                delivery = self.rx.recv() => {
                    match delivery {
                        Some(envelope) => {
                            // Acknowledged regardless of the handler outcome.
                            if let Err(e) = handler(envelope).await {
                                error!(
                                    queue = %self.queue,
                                    error = %e,
                                    "envelope handler failed, discarding envelope"
                                );
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        info!(queue = %self.queue, "consumer stopped");
    }
}
