//! # courrier-relay
//!
//! Publish/consume abstraction over the named queues that decouple the
//! ingest pipeline from its side effects. Envelopes are opaque serialized
//! bytes; the broker neither parses nor re-orders them.
//!
//! The in-process realization runs each queue over a tokio mpsc channel.
//! The [`Broker`] publish/consume surface is the seam where an external
//! broker client would slot in without touching any consumer logic.

pub mod broker;
pub mod consumer;

mod error;

pub use broker::Broker;
pub use consumer::Consumer;
pub use error::RelayError;
