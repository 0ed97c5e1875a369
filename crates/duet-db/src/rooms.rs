use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    pub id: i64,
    pub name: Option<String>,
    pub is_group: bool,
    pub last_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Create a room with its participant set in one transaction. Rooms are
/// normally created by the external pairing flow; this exists for that
/// glue and for tests.
pub async fn create_room(
    pool: &DbPool,
    id: i64,
    name: Option<&str>,
    is_group: bool,
    participant_ids: &[i64],
) -> Result<RoomRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, RoomRow>(
        "INSERT INTO rooms (id, name, is_group)
         VALUES (?1, ?2, ?3)
         RETURNING id, name, is_group, last_message_id, created_at",
    )
    .bind(id)
    .bind(name)
    .bind(is_group)
    .fetch_one(&mut *tx)
    .await?;

    for user_id in participant_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO room_participants (room_id, user_id) VALUES (?1, ?2)",
        )
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(row)
}

pub async fn get_room(pool: &DbPool, id: i64) -> Result<Option<RoomRow>, DbError> {
    let row = sqlx::query_as::<_, RoomRow>(
        "SELECT id, name, is_group, last_message_id, created_at FROM rooms WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// The room directory check: is this identity among the room's stored
/// participants? Missing rooms read as "no".
pub async fn is_participant(pool: &DbPool, room_id: i64, user_id: i64) -> Result<bool, DbError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
    )
    .bind(room_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn participant_ids(pool: &DbPool, room_id: i64) -> Result<Vec<i64>, DbError> {
    let ids: Vec<i64> =
        sqlx::query_scalar("SELECT user_id FROM room_participants WHERE room_id = ?1")
            .bind(room_id)
            .fetch_all(pool)
            .await?;
    Ok(ids)
}

/// Every room the identity belongs to, per the room directory.
pub async fn rooms_for_user(pool: &DbPool, user_id: i64) -> Result<Vec<i64>, DbError> {
    let ids: Vec<i64> =
        sqlx::query_scalar("SELECT room_id FROM room_participants WHERE user_id = ?1")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
    Ok(ids)
}

pub async fn set_last_message(
    pool: &DbPool,
    room_id: i64,
    message_id: i64,
) -> Result<(), DbError> {
    sqlx::query("UPDATE rooms SET last_message_id = ?2 WHERE id = ?1")
        .bind(room_id)
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}
