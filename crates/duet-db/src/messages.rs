use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub kind: String,
    pub attachment_url: Option<String>,
    pub nonce: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert a message and seed its read-by set with the sender, atomically.
#[allow(clippy::too_many_arguments)]
pub async fn create_message(
    pool: &DbPool,
    id: i64,
    room_id: i64,
    sender_id: i64,
    content: &str,
    kind: &str,
    attachment_url: Option<&str>,
    nonce: Option<&str>,
) -> Result<MessageRow, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (id, room_id, sender_id, content, kind, attachment_url, nonce, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING id, room_id, sender_id, content, kind, attachment_url, nonce, created_at",
    )
    .bind(id)
    .bind(room_id)
    .bind(sender_id)
    .bind(content)
    .bind(kind)
    .bind(attachment_url)
    .bind(nonce)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO message_reads (message_id, user_id) VALUES (?1, ?2)")
        .bind(id)
        .bind(sender_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "SELECT id, room_id, sender_id, content, kind, attachment_url, nonce, created_at
         FROM messages WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_by_room(
    pool: &DbPool,
    room_id: i64,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRow>(
        "SELECT id, room_id, sender_id, content, kind, attachment_url, nonce, created_at
         FROM messages WHERE room_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )
    .bind(room_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Add `user_id` to the read-by set of every message in the room it has
/// not read and did not send. The set only grows; re-running is a no-op.
/// Returns how many messages actually changed.
pub async fn mark_room_read(
    pool: &DbPool,
    room_id: i64,
    user_id: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "INSERT INTO message_reads (message_id, user_id)
         SELECT m.id, ?2
         FROM messages m
         WHERE m.room_id = ?1
           AND m.sender_id <> ?2
           AND NOT EXISTS (
               SELECT 1 FROM message_reads r
               WHERE r.message_id = m.id AND r.user_id = ?2
           )",
    )
    .bind(room_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// The identities that have read a message, sender included.
pub async fn read_by(pool: &DbPool, message_id: i64) -> Result<Vec<i64>, DbError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT user_id FROM message_reads WHERE message_id = ?1 ORDER BY user_id",
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
