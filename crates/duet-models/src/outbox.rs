//! Client-side reconciliation of optimistic sends.
//!
//! A client shows a message the moment the user hits enter, before the
//! server has confirmed it. Each provisional entry carries a client-chosen
//! nonce; the server echoes it back in `message_sent` (success) or
//! `message_error` (failure), and the entry transitions pending →
//! confirmed or pending → removed. Correlation is by nonce, never by
//! delivery order.

use crate::gateway::ServerEvent;
use crate::message::{MessageKind, MessagePayload};

/// A provisional, locally-rendered message awaiting server confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub nonce: String,
    pub room_id: i64,
    pub content: String,
    pub kind: MessageKind,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalMessage {
    Pending(PendingSend),
    Confirmed(MessagePayload),
}

impl LocalMessage {
    fn pending_nonce(&self) -> Option<&str> {
        match self {
            Self::Pending(send) => Some(send.nonce.as_str()),
            Self::Confirmed(_) => None,
        }
    }
}

/// Ordered local message list for one room view.
#[derive(Debug, Default)]
pub struct Outbox {
    entries: Vec<LocalMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a provisional entry immediately.
    pub fn push_pending(&mut self, draft: PendingSend) {
        self.entries.push(LocalMessage::Pending(draft));
    }

    /// A confirmed record arrived out-of-band (e.g. `message_received`
    /// from another user); appended as-is.
    pub fn push_confirmed(&mut self, payload: MessagePayload) {
        self.entries.push(LocalMessage::Confirmed(payload));
    }

    /// `message_sent` arrived: replace the matching provisional entry with
    /// the canonical server record, in place, keeping display order.
    /// Returns false when no pending entry carries that nonce.
    pub fn confirm(&mut self, nonce: &str, canonical: MessagePayload) -> bool {
        match self.position(nonce) {
            Some(idx) => {
                self.entries[idx] = LocalMessage::Confirmed(canonical);
                true
            }
            None => false,
        }
    }

    /// `message_error` arrived: drop the provisional entry rather than
    /// leaving it rendered as stale. Returns false for unknown nonces.
    pub fn reject(&mut self, nonce: &str) -> bool {
        match self.position(nonce) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Route a server event into the outbox. Events without a nonce (or
    /// with a nonce no pending entry owns) leave the outbox untouched.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::MessageSent(payload) => {
                if let Some(nonce) = payload.nonce.clone() {
                    self.confirm(&nonce, payload.clone());
                }
            }
            ServerEvent::MessageError {
                nonce: Some(nonce), ..
            } => {
                self.reject(nonce);
            }
            _ => {}
        }
    }

    pub fn entries(&self) -> &[LocalMessage] {
        &self.entries
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, LocalMessage::Pending(_)))
            .count()
    }

    fn position(&self, nonce: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.pending_nonce() == Some(nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::UserSummary;
    use chrono::Utc;

    fn draft(nonce: &str) -> PendingSend {
        PendingSend {
            nonce: nonce.to_string(),
            room_id: 1,
            content: "hello".to_string(),
            kind: MessageKind::Text,
            attachment_url: None,
        }
    }

    fn canonical(nonce: &str) -> MessagePayload {
        MessagePayload {
            id: 99,
            room_id: 1,
            sender: UserSummary {
                id: 2,
                username: "ada".to_string(),
                avatar_hash: None,
            },
            content: "hello".to_string(),
            kind: MessageKind::Text,
            attachment_url: None,
            nonce: Some(nonce.to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn pending_transitions_to_confirmed_in_place() {
        let mut outbox = Outbox::new();
        outbox.push_pending(draft("a"));
        outbox.push_pending(draft("b"));

        assert!(outbox.confirm("a", canonical("a")));
        assert_eq!(outbox.pending_count(), 1);
        assert!(matches!(
            &outbox.entries()[0],
            LocalMessage::Confirmed(payload) if payload.id == 99
        ));
        // Order preserved: "b" still second.
        assert!(matches!(
            &outbox.entries()[1],
            LocalMessage::Pending(send) if send.nonce == "b"
        ));
    }

    #[test]
    fn pending_transitions_to_removed_on_error() {
        let mut outbox = Outbox::new();
        outbox.push_pending(draft("a"));
        assert!(outbox.reject("a"));
        assert!(outbox.entries().is_empty());
    }

    #[test]
    fn unknown_nonce_is_a_no_op() {
        let mut outbox = Outbox::new();
        outbox.push_pending(draft("a"));
        assert!(!outbox.confirm("zzz", canonical("zzz")));
        assert!(!outbox.reject("zzz"));
        assert_eq!(outbox.pending_count(), 1);
    }

    #[test]
    fn confirmed_entries_are_never_rematched() {
        let mut outbox = Outbox::new();
        outbox.push_pending(draft("a"));
        assert!(outbox.confirm("a", canonical("a")));
        // A duplicate ack for the same nonce must not match the
        // already-confirmed entry.
        assert!(!outbox.confirm("a", canonical("a")));
        assert!(!outbox.reject("a"));
    }

    #[test]
    fn apply_routes_by_correlation_not_order() {
        let mut outbox = Outbox::new();
        outbox.push_pending(draft("first"));
        outbox.push_pending(draft("second"));

        // Acks arrive out of order.
        outbox.apply(&ServerEvent::MessageSent(canonical("second")));
        outbox.apply(&ServerEvent::MessageError {
            reason: "ValidationError".to_string(),
            nonce: Some("first".to_string()),
        });

        assert_eq!(outbox.entries().len(), 1);
        assert!(matches!(
            &outbox.entries()[0],
            LocalMessage::Confirmed(payload) if payload.nonce.as_deref() == Some("second")
        ));
    }
}
