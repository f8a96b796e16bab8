use thiserror::Error;

/// Errors produced by the relay layer.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Publish or consume against a queue that was never declared.
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// The consuming side of the queue is gone.
    #[error("Queue closed: {0}")]
    QueueClosed(String),

    /// A queue supports exactly one in-process consumer.
    #[error("Queue already has a consumer: {0}")]
    AlreadyConsuming(String),
}
