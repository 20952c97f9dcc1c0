use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flightdesk_core::domain::session::{Session, SessionId, SessionSnapshot};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

pub type SessionHandle = Arc<Mutex<Session>>;

/// Keyed store of live conversations. Each session sits behind its own mutex; the
/// orchestrator holds that lock for a whole turn so one session never runs two turns
/// at once while different sessions proceed in parallel.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn get_or_create(&self, id: &SessionId, now: DateTime<Utc>) -> SessionHandle {
        if let Some(existing) = self.get(id).await {
            return existing;
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(id.clone()).or_insert_with(|| {
            info!(event_name = "session.created", session_id = %id, "session created");
            Arc::new(Mutex::new(Session::new(id.clone(), now)))
        }))
    }

    /// Locks the live session for `id`, creating it when absent. A handle that was
    /// evicted, removed or replaced while this caller waited for its lock is dropped
    /// and the lookup starts over, so a turn never runs on a detached session.
    pub async fn lock_current(&self, id: &SessionId, now: DateTime<Utc>) -> OwnedMutexGuard<Session> {
        loop {
            let handle = self.get_or_create(id, now).await;
            let guard = Arc::clone(&handle).lock_owned().await;
            if self.is_current(id, &handle).await {
                return guard;
            }
            debug!(
                event_name = "session.handle_superseded",
                session_id = %id,
                "session handle changed while waiting for its lock, retrying"
            );
        }
    }

    /// Whether `handle` is still the registered session for `id`.
    pub async fn is_current(&self, id: &SessionId, handle: &SessionHandle) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Installs a session rebuilt from `snapshot`, replacing any live session with the
    /// same id.
    pub async fn restore(&self, snapshot: SessionSnapshot) -> SessionHandle {
        let session = Session::from_snapshot(snapshot);
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id.clone(), Arc::clone(&handle));
        info!(event_name = "session.restored", session_id = %id, "session restored from snapshot");
        handle
    }

    pub async fn remove(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(event_name = "session.removed", session_id = %id, "session removed");
        }
        removed
    }

    /// Drops sessions idle for at least `timeout`. Sessions busy with a turn are
    /// skipped; their activity is refreshed when the turn finishes.
    pub async fn evict_idle(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let mut evicted = Vec::new();

        sessions.retain(|id, handle| {
            let Ok(session) = handle.try_lock() else {
                return true;
            };
            if session.ended || session.is_idle(now, timeout) {
                evicted.push(id.clone());
                return false;
            }
            true
        });

        for id in &evicted {
            info!(event_name = "session.evicted", session_id = %id, "idle session evicted");
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
