use crate::error::SessionError;
use crate::rooms::ensure_participant;
use crate::AppState;
use duet_models::gateway::ServerEvent;

/// Mark every unread message in the room as read by `user_id` and, when
/// anything actually changed, announce it to the rest of the room. The
/// participation gate runs on every call, not just the first; membership
/// can be revoked between calls.
///
/// Returns the number of messages newly marked. Zero means the repeat
/// call was absorbed silently and no event went out.
pub async fn mark_read(
    state: &AppState,
    session_id: &str,
    user_id: i64,
    room_id: i64,
) -> Result<u64, SessionError> {
    ensure_participant(&state.db, room_id, user_id).await?;

    let changed = duet_db::messages::mark_room_read(&state.db, room_id, user_id).await?;
    if changed > 0 {
        state.registry.broadcast(
            room_id,
            &ServerEvent::MessagesRead { user_id, room_id },
            Some(session_id),
        );
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::send_message;
    use crate::AppConfig;
    use duet_db::{create_pool, run_migrations};
    use duet_models::gateway::SendMessage;
    use duet_models::message::MessageKind;
    use tokio::sync::mpsc::unbounded_channel;

    async fn setup() -> AppState {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        duet_db::users::create_user(&pool, 1, "ada", None)
            .await
            .expect("user");
        duet_db::users::create_user(&pool, 2, "brin", None)
            .await
            .expect("user");
        duet_db::rooms::create_room(&pool, 10, None, false, &[1, 2])
            .await
            .expect("room");
        AppState::new(pool, AppConfig::default())
    }

    async fn send_text(state: &AppState, session_id: &str, user_id: i64, content: &str) -> i64 {
        let payload = send_message(
            state,
            session_id,
            user_id,
            SendMessage {
                room_id: 10,
                content: content.to_string(),
                kind: MessageKind::Text,
                attachment_url: None,
                nonce: None,
            },
        )
        .await
        .expect("send");
        payload.id
    }

    #[tokio::test]
    async fn marks_unread_notifies_room_and_absorbs_repeats() {
        let state = setup().await;
        let (tx_sender, mut rx_sender) = unbounded_channel();
        let (tx_reader, mut rx_reader) = unbounded_channel();
        state.registry.register("s1", 1, tx_sender);
        state.registry.register("s2", 2, tx_reader);
        state.registry.join("s1", 10);
        state.registry.join("s2", 10);

        let first = send_text(&state, "s1", 1, "one").await;
        let second = send_text(&state, "s1", 1, "two").await;
        // Drain the fanout the reader session received for both sends.
        rx_reader.try_recv().expect("fanout one");
        rx_reader.try_recv().expect("fanout two");

        let changed = mark_read(&state, "s2", 2, 10).await.expect("mark");
        assert_eq!(changed, 2);
        match rx_sender.try_recv().expect("room notice") {
            ServerEvent::MessagesRead { user_id, room_id } => {
                assert_eq!(user_id, 2);
                assert_eq!(room_id, 10);
            }
            other => panic!("unexpected event {other:?}"),
        }
        // The reader's own session gets nothing back.
        assert!(rx_reader.try_recv().is_err());

        for id in [first, second] {
            let readers = duet_db::messages::read_by(&state.db, id)
                .await
                .expect("read_by");
            assert_eq!(readers, vec![1, 2]);
        }

        // Nothing left unread: no change, no event.
        let changed = mark_read(&state, "s2", 2, 10).await.expect("repeat");
        assert_eq!(changed, 0);
        assert!(rx_sender.try_recv().is_err());
    }

    #[tokio::test]
    async fn own_messages_never_count_as_unread() {
        let state = setup().await;
        send_text(&state, "s1", 1, "note to self").await;

        let changed = mark_read(&state, "s1", 1, 10).await.expect("mark");
        assert_eq!(changed, 0);
    }

    #[tokio::test]
    async fn outsider_cannot_mark_a_room_read() {
        let state = setup().await;
        duet_db::users::create_user(&state.db, 3, "eve", None)
            .await
            .expect("user");

        let err = mark_read(&state, "s3", 3, 10).await.expect_err("must fail");
        assert_eq!(err.reason(), "NotAParticipant");
    }
}
