//! Per-user realtime session registry and best-effort push fanout.
//!
//! The hub provides no durability: a push to a user with zero live sessions
//! is a silent no-op and nothing is buffered for later delivery. The store
//! is the durability mechanism; this layer only mirrors fresh events to
//! whoever happens to be connected.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

pub type SessionId = Uuid;

/// Receiving half of one live session. Frames are serialized event JSON,
/// ready to hand to whatever transport carries the session.
pub struct Session {
    pub id: SessionId,
    pub rx: mpsc::UnboundedReceiver<String>,
}

/// Concurrent registry of live sessions, `user id -> session senders`.
/// A user may hold zero, one, or many concurrent sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Vec<(SessionId, mpsc::UnboundedSender<String>)>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new live session for `user_id`.
    pub async fn connect(&self, user_id: &str) -> Session {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut guard = self.inner.write().await;
        guard.entry(user_id.to_string()).or_default().push((id, tx));

        debug!(user = user_id, session = %id, "session connected");
        Session { id, rx }
    }

    /// Remove one session of `user_id`. Unknown ids are ignored.
    pub async fn disconnect(&self, user_id: &str, session: SessionId) {
        let mut guard = self.inner.write().await;
        if let Some(sessions) = guard.get_mut(user_id) {
            sessions.retain(|(id, _)| *id != session);
            if sessions.is_empty() {
                guard.remove(user_id);
            }
        }
        debug!(user = user_id, session = %session, "session disconnected");
    }

    /// Fan an event out to every live session of `user_id`.
    ///
    /// Zero registered sessions is a silent no-op; dead senders are pruned
    /// on the way through.
    pub async fn push<T: Serialize>(&self, user_id: &str, event: &str, args: &T) {
        let frame = match serde_json::to_string(&serde_json::json!({
            "event": event,
            "args": args,
        })) {
            Ok(frame) => frame,
            Err(e) => {
                error!(event, error = %e, "failed to serialize push frame");
                return;
            }
        };

        let mut guard = self.inner.write().await;
        if let Some(sessions) = guard.get_mut(user_id) {
            sessions.retain(|(_, tx)| tx.send(frame.clone()).is_ok());
            if sessions.is_empty() {
                guard.remove(user_id);
            }
        }
    }

    /// Number of live sessions for `user_id`.
    pub async fn session_count(&self, user_id: &str) -> usize {
        self.inner
            .read()
            .await
            .get(user_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
