use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{MessageKind, MessagePayload};

/// Everything a client may send over the gateway socket, as one closed
/// enum. The authenticated-state guard and payload validation live in one
/// place instead of being re-derived per handler.
///
/// Wire shape: `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Handshake credential, legal only as the first frame.
    Authenticate { token: String },
    JoinRoom {
        #[serde(with = "crate::id_str")]
        room_id: i64,
    },
    LeaveRoom {
        #[serde(with = "crate::id_str")]
        room_id: i64,
    },
    SendMessage(SendMessage),
    Typing {
        #[serde(with = "crate::id_str")]
        room_id: i64,
        is_typing: bool,
    },
    MarkRead {
        #[serde(with = "crate::id_str")]
        room_id: i64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    #[serde(with = "crate::id_str")]
    pub room_id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    /// Client-chosen correlation value, echoed back in `message_sent` and
    /// `message_error` so the client can reconcile its optimistic copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Everything the server may push down the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// New message, delivered to the room minus the sender.
    MessageReceived(MessagePayload),
    /// Acknowledgment carrying the canonical record, sender only.
    MessageSent(MessagePayload),
    /// Operation-local failure, sender only. The connection stays open.
    MessageError {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        nonce: Option<String>,
    },
    MessagesRead {
        #[serde(with = "crate::id_str")]
        user_id: i64,
        #[serde(with = "crate::id_str")]
        room_id: i64,
    },
    UserTyping {
        #[serde(with = "crate::id_str")]
        user_id: i64,
        username: String,
        is_typing: bool,
    },
    UserStatus {
        #[serde(with = "crate::id_str")]
        user_id: i64,
        is_online: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },
    /// Handshake rejection; the server closes the socket right after.
    AuthError { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frames_parse() {
        let frame = r#"{"event":"send_message","data":{"room_id":"42","content":"hi","nonce":"n-1"}}"#;
        let event: ClientEvent = serde_json::from_str(frame).expect("parse");
        match event {
            ClientEvent::SendMessage(send) => {
                assert_eq!(send.room_id, 42);
                assert_eq!(send.content, "hi");
                assert_eq!(send.kind, MessageKind::Text);
                assert_eq!(send.nonce.as_deref(), Some("n-1"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let frame = r#"{"event":"typing","data":{"room_id":"7","is_typing":true}}"#;
        let event: ClientEvent = serde_json::from_str(frame).expect("parse");
        assert!(matches!(
            event,
            ClientEvent::Typing { room_id: 7, is_typing: true }
        ));
    }

    #[test]
    fn unknown_event_names_are_rejected() {
        let frame = r#"{"event":"voice_state_update","data":{}}"#;
        assert!(serde_json::from_str::<ClientEvent>(frame).is_err());
    }

    #[test]
    fn outbound_status_omits_absent_last_seen() {
        let json = serde_json::to_value(ServerEvent::UserStatus {
            user_id: 5,
            is_online: true,
            last_seen: None,
        })
        .expect("serialize");
        assert_eq!(json["event"], "user_status");
        assert_eq!(json["data"]["user_id"], "5");
        assert!(json["data"].get("last_seen").is_none());
    }
}
