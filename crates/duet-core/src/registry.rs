use duet_models::gateway::ServerEvent;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Gateway session id (uuid v4 string).
pub type SessionId = String;

struct SessionHandle {
    user_id: i64,
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<i64>,
}

#[derive(Default)]
struct Inner {
    /// room id -> sessions subscribed to it.
    rooms: HashMap<i64, HashSet<SessionId>>,
    /// session id -> handle (owning the reverse room set).
    sessions: HashMap<SessionId, SessionHandle>,
}

/// Room multicast groups. Both directions of the room↔session mapping
/// live behind one lock, and deliveries happen while it is held: a
/// session observed removed has already been dropped from every group,
/// and a session mid-broadcast cannot be half-removed. Outbound sends go
/// through unbounded per-session queues, so nothing blocks under the
/// lock.
pub struct RoomRegistry {
    inner: Mutex<Inner>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a live session. Must precede any join for that session.
    pub fn register(
        &self,
        session_id: &str,
        user_id: i64,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut inner = self.lock();
        inner.sessions.insert(
            session_id.to_string(),
            SessionHandle {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
    }

    /// Remove a session from every group it joined, atomically with
    /// respect to broadcasts. Returns the rooms it was subscribed to.
    pub fn unregister(&self, session_id: &str) -> Vec<i64> {
        let mut inner = self.lock();
        let Some(handle) = inner.sessions.remove(session_id) else {
            return Vec::new();
        };
        let rooms: Vec<i64> = handle.rooms.iter().copied().collect();
        for room_id in &rooms {
            if let Some(group) = inner.rooms.get_mut(room_id) {
                group.remove(session_id);
                if group.is_empty() {
                    inner.rooms.remove(room_id);
                }
            }
        }
        rooms
    }

    /// Subscribe a session to a room. Idempotent: re-joining is a no-op
    /// and can never produce duplicate delivery. Returns false when the
    /// session is not registered.
    ///
    /// Participation in the room directory is the caller's check; the
    /// registry only manages live membership.
    pub fn join(&self, session_id: &str, room_id: i64) -> bool {
        let mut inner = self.lock();
        let Some(handle) = inner.sessions.get_mut(session_id) else {
            return false;
        };
        handle.rooms.insert(room_id);
        inner
            .rooms
            .entry(room_id)
            .or_default()
            .insert(session_id.to_string());
        true
    }

    /// Unsubscribe. Leaving a room never joined is a no-op.
    pub fn leave(&self, session_id: &str, room_id: i64) {
        let mut inner = self.lock();
        if let Some(handle) = inner.sessions.get_mut(session_id) {
            handle.rooms.remove(&room_id);
        }
        if let Some(group) = inner.rooms.get_mut(&room_id) {
            group.remove(session_id);
            if group.is_empty() {
                inner.rooms.remove(&room_id);
            }
        }
    }

    pub fn is_subscribed(&self, session_id: &str, room_id: i64) -> bool {
        let inner = self.lock();
        inner
            .sessions
            .get(session_id)
            .is_some_and(|handle| handle.rooms.contains(&room_id))
    }

    /// Deliver an event to every session in the room's group except the
    /// excluded one. A closed receiver is a best-effort no-op for that
    /// one delivery; its cleanup happens on disconnect. Returns how many
    /// queues accepted the event.
    pub fn broadcast(&self, room_id: i64, event: &ServerEvent, exclude: Option<&str>) -> usize {
        let inner = self.lock();
        let Some(group) = inner.rooms.get(&room_id) else {
            return 0;
        };
        let mut delivered = 0;
        for session_id in group {
            if exclude.is_some_and(|ex| ex == session_id.as_str()) {
                continue;
            }
            let Some(handle) = inner.sessions.get(session_id) else {
                continue;
            };
            if handle.tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(session_id, room_id, "dropping delivery to closed session");
            }
        }
        delivered
    }

    /// Direct delivery to one session (acks, errors).
    pub fn send_to(&self, session_id: &str, event: ServerEvent) -> bool {
        let inner = self.lock();
        inner
            .sessions
            .get(session_id)
            .is_some_and(|handle| handle.tx.send(event).is_ok())
    }

    pub fn session_user(&self, session_id: &str) -> Option<i64> {
        let inner = self.lock();
        inner.sessions.get(session_id).map(|handle| handle.user_id)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
