use axum::extract::ws::{CloseFrame, Message, WebSocket};
use duet_core::auth;
use duet_core::AppState;
use duet_db::users::UserRow;
use duet_models::gateway::{ClientEvent, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::session::Session;

enum Handshake {
    Accepted(UserRow),
    Rejected(&'static str),
    /// Socket closed or errored before any credential arrived.
    Gone,
}

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &ServerEvent,
) -> Result<(), ()> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(%err, "failed to serialize outbound event");
            return Ok(());
        }
    };
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

async fn send_close(
    sender: &mut (impl SinkExt<Message> + Unpin),
    code: u16,
    reason: &str,
) -> Result<(), ()> {
    sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
        .map_err(|_| ())
}

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // The first meaningful frame must be `authenticate`. Anything else
    // arriving before it is discarded, not buffered.
    let handshake_timeout = Duration::from_secs(state.config.handshake_timeout_secs);
    let user = match tokio::time::timeout(
        handshake_timeout,
        wait_for_authenticate(&mut receiver, &state),
    )
    .await
    {
        Ok(Handshake::Accepted(user)) => user,
        Ok(Handshake::Rejected(reason)) => {
            let _ = send_event(
                &mut sender,
                &ServerEvent::AuthError {
                    reason: reason.to_string(),
                },
            )
            .await;
            let _ = send_close(&mut sender, 1008, "authentication failed").await;
            return;
        }
        Ok(Handshake::Gone) => return,
        Err(_) => {
            let _ = send_event(
                &mut sender,
                &ServerEvent::AuthError {
                    reason: "HandshakeTimeout".to_string(),
                },
            )
            .await;
            let _ = send_close(&mut sender, 1008, "handshake timed out").await;
            return;
        }
    };

    let session = Session::new(user.id, user.username);
    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .registry
        .register(&session.session_id, session.user_id, tx);

    // Auto-subscribe to every room the user participates in; joins and
    // leaves over the socket adjust from there.
    let rooms = match duet_db::rooms::rooms_for_user(&state.db, session.user_id).await {
        Ok(rooms) => rooms,
        Err(err) => {
            tracing::warn!(user_id = session.user_id, %err, "failed to load rooms at connect");
            state.registry.unregister(&session.session_id);
            let _ = send_close(&mut sender, 1011, "internal error").await;
            return;
        }
    };
    for &room_id in &rooms {
        state.registry.join(&session.session_id, room_id);
    }

    if state.presence.connect(session.user_id) {
        if let Err(err) = duet_db::users::set_online(&state.db, session.user_id).await {
            tracing::warn!(user_id = session.user_id, %err, "failed to persist online status");
        }
        let online = ServerEvent::UserStatus {
            user_id: session.user_id,
            is_online: true,
            last_seen: None,
        };
        for &room_id in &rooms {
            state
                .registry
                .broadcast(room_id, &online, Some(&session.session_id));
        }
    }

    tracing::info!(
        user_id = session.user_id,
        session_id = %session.session_id,
        rooms = rooms.len(),
        "gateway session established"
    );

    let disconnect_reason = run_session(&mut sender, &mut receiver, &mut rx, &session, &state).await;

    state.registry.unregister(&session.session_id);
    if state.presence.disconnect(session.user_id) {
        let last_seen = chrono::Utc::now();
        if let Err(err) = duet_db::users::set_offline(&state.db, session.user_id, last_seen).await {
            tracing::warn!(user_id = session.user_id, %err, "failed to persist offline status");
        }
        let offline = ServerEvent::UserStatus {
            user_id: session.user_id,
            is_online: false,
            last_seen: Some(last_seen),
        };
        match duet_db::rooms::rooms_for_user(&state.db, session.user_id).await {
            Ok(rooms) => {
                for room_id in rooms {
                    state.registry.broadcast(room_id, &offline, None);
                }
            }
            Err(err) => {
                tracing::warn!(user_id = session.user_id, %err, "failed to load rooms at disconnect");
            }
        }
    }

    tracing::info!(
        user_id = session.user_id,
        session_id = %session.session_id,
        "gateway session closed: {disconnect_reason}"
    );
}

async fn wait_for_authenticate(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    state: &AppState,
) -> Handshake {
    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return Handshake::Gone,
            Ok(_) => continue,
            Err(_) => return Handshake::Gone,
        };
        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::Authenticate { token }) => {
                return match auth::resolve_identity(&state.db, &token, &state.config.jwt_secret)
                    .await
                {
                    Ok(user) => Handshake::Accepted(user),
                    Err(err) => Handshake::Rejected(err.reason()),
                };
            }
            Ok(other) => {
                tracing::debug!(event = ?other, "discarding frame sent before authentication");
            }
            Err(err) => {
                tracing::debug!(%err, "discarding unparseable pre-auth frame");
            }
        }
    }
    Handshake::Gone
}

async fn run_session(
    sender: &mut (impl SinkExt<Message> + Unpin),
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    rx: &mut mpsc::UnboundedReceiver<ServerEvent>,
    session: &Session,
    state: &AppState,
) -> String {
    let mut ping_interval = tokio::time::interval(Duration::from_secs(20));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => event,
                            Err(err) => {
                                tracing::debug!(
                                    user_id = session.user_id,
                                    %err,
                                    "discarding malformed frame"
                                );
                                continue;
                            }
                        };
                        if let Some(reply) = handle_client_event(event, session, state).await {
                            if send_event(sender, &reply).await.is_err() {
                                break "websocket send error".to_string();
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => format!(
                                "client close frame (code={}, reason={})",
                                frame.code, frame.reason
                            ),
                            None => "client close frame (no code/reason)".to_string(),
                        };
                    }
                    Some(Err(err)) => break format!("websocket receive error: {err}"),
                    None => break "websocket stream ended".to_string(),
                    _ => {}
                }
            }
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if send_event(sender, &event).await.is_err() {
                            break "websocket send error".to_string();
                        }
                    }
                    None => break "delivery channel closed".to_string(),
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    }
}

/// Dispatch one authenticated frame. The returned event, if any, goes
/// back to the originating session only; room-wide effects are pushed
/// through the registry by the operations themselves.
async fn handle_client_event(
    event: ClientEvent,
    session: &Session,
    state: &AppState,
) -> Option<ServerEvent> {
    match event {
        ClientEvent::Authenticate { .. } => {
            tracing::debug!(user_id = session.user_id, "ignoring repeat authenticate");
            None
        }
        ClientEvent::JoinRoom { room_id } => {
            match duet_core::rooms::ensure_participant(&state.db, room_id, session.user_id).await {
                Ok(()) => {
                    state.registry.join(&session.session_id, room_id);
                    None
                }
                Err(err) => Some(ServerEvent::MessageError {
                    reason: err.reason().to_string(),
                    nonce: None,
                }),
            }
        }
        ClientEvent::LeaveRoom { room_id } => {
            state.registry.leave(&session.session_id, room_id);
            None
        }
        ClientEvent::SendMessage(draft) => {
            let nonce = draft.nonce.clone();
            match duet_core::message::send_message(state, &session.session_id, session.user_id, draft)
                .await
            {
                Ok(payload) => Some(ServerEvent::MessageSent(payload)),
                Err(err) => {
                    tracing::debug!(user_id = session.user_id, %err, "send_message rejected");
                    Some(ServerEvent::MessageError {
                        reason: err.reason().to_string(),
                        nonce,
                    })
                }
            }
        }
        ClientEvent::Typing { room_id, is_typing } => {
            // Ephemeral relay: no persistence, and silently dropped when
            // the session is not subscribed to the room.
            if state.registry.is_subscribed(&session.session_id, room_id) {
                state.registry.broadcast(
                    room_id,
                    &ServerEvent::UserTyping {
                        user_id: session.user_id,
                        username: session.username.clone(),
                        is_typing,
                    },
                    Some(&session.session_id),
                );
            } else {
                tracing::debug!(
                    user_id = session.user_id,
                    room_id,
                    "typing for unsubscribed room dropped"
                );
            }
            None
        }
        ClientEvent::MarkRead { room_id } => {
            match duet_core::receipts::mark_read(state, &session.session_id, session.user_id, room_id)
                .await
            {
                Ok(_) => None,
                Err(err) => Some(ServerEvent::MessageError {
                    reason: err.reason().to_string(),
                    nonce: None,
                }),
            }
        }
    }
}
