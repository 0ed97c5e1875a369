use crate::error::SessionError;
use crate::rooms::ensure_participant;
use crate::AppState;
use duet_models::gateway::{SendMessage, ServerEvent};
use duet_models::message::{MessageKind, MessagePayload};
use duet_models::user::UserSummary;
use duet_util::snowflake;

/// Reject drafts that would persist as garbage. Text and gif messages
/// need non-blank content; image messages need an attachment URL and may
/// carry an empty caption.
fn validate(draft: &SendMessage) -> Result<(), SessionError> {
    match draft.kind {
        MessageKind::Text | MessageKind::Gif => {
            if draft.content.trim().is_empty() {
                return Err(SessionError::Validation(
                    "message content must not be empty".into(),
                ));
            }
        }
        MessageKind::Image => {
            let has_url = draft
                .attachment_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty());
            if !has_url {
                return Err(SessionError::Validation(
                    "image messages require an attachment url".into(),
                ));
            }
        }
    }
    Ok(())
}

fn payload_from_row(row: duet_db::messages::MessageRow, sender: UserSummary) -> MessagePayload {
    MessagePayload {
        id: row.id,
        room_id: row.room_id,
        sender,
        content: row.content,
        kind: row.kind.parse().unwrap_or_default(),
        attachment_url: row.attachment_url,
        nonce: row.nonce,
        timestamp: row.created_at,
    }
}

/// The ingest pipeline: validate, gate on participation, persist, then
/// fan out to the room minus the originating session. The caller sends
/// the returned payload back as the `message_sent` ack; any error maps to
/// a `message_error` carrying the draft's nonce.
///
/// Sender enrichment happens before the insert so a lookup failure cannot
/// strand a persisted row that was never announced.
pub async fn send_message(
    state: &AppState,
    session_id: &str,
    user_id: i64,
    draft: SendMessage,
) -> Result<MessagePayload, SessionError> {
    validate(&draft)?;
    ensure_participant(&state.db, draft.room_id, user_id).await?;
    let sender = state.user_summary(user_id).await?;

    let message_id = snowflake::generate(state.config.worker_id);
    let row = duet_db::messages::create_message(
        &state.db,
        message_id,
        draft.room_id,
        user_id,
        &draft.content,
        draft.kind.as_str(),
        draft.attachment_url.as_deref(),
        draft.nonce.as_deref(),
    )
    .await?;

    // The room's last-message pointer is a denormalized convenience; a
    // failed update must not fail a message that is already durable.
    if let Err(err) = duet_db::rooms::set_last_message(&state.db, draft.room_id, message_id).await {
        tracing::warn!(room_id = draft.room_id, %err, "failed to advance last-message pointer");
    }

    let payload = payload_from_row(row, sender);
    state.registry.broadcast(
        draft.room_id,
        &ServerEvent::MessageReceived(payload.clone()),
        Some(session_id),
    );
    Ok(payload)
}
