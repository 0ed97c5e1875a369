use crate::error::SessionError;
use duet_db::DbPool;

/// Participation gate shared by every room-scoped operation. A room that
/// does not exist reads the same as one the user is not in; callers never
/// learn which.
pub async fn ensure_participant(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
) -> Result<(), SessionError> {
    if duet_db::rooms::is_participant(pool, room_id, user_id).await? {
        Ok(())
    } else {
        Err(SessionError::NotAParticipant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_db::{create_pool, run_migrations};

    async fn setup() -> DbPool {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn participant_passes_outsider_and_missing_room_fail() {
        let pool = setup().await;
        duet_db::users::create_user(&pool, 1, "ada", None)
            .await
            .expect("user");
        duet_db::users::create_user(&pool, 2, "brin", None)
            .await
            .expect("user");
        duet_db::rooms::create_room(&pool, 10, None, false, &[1])
            .await
            .expect("room");

        assert!(ensure_participant(&pool, 10, 1).await.is_ok());
        assert!(matches!(
            ensure_participant(&pool, 10, 2).await,
            Err(SessionError::NotAParticipant)
        ));
        assert!(matches!(
            ensure_participant(&pool, 999, 1).await,
            Err(SessionError::NotAParticipant)
        ));
    }
}
