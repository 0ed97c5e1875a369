use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub avatar_hash: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    username: &str,
    avatar_hash: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, username, avatar_hash)
         VALUES (?1, ?2, ?3)
         RETURNING id, username, avatar_hash, is_online, last_seen, created_at",
    )
    .bind(id)
    .bind(username)
    .bind(avatar_hash)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, avatar_hash, is_online, last_seen, created_at
         FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Flip the online flag without touching last_seen; the previous value
/// stays meaningful ("last seen before this visit") while the user is
/// connected.
pub async fn set_online(pool: &DbPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE users SET is_online = 1 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_offline(
    pool: &DbPool,
    id: i64,
    last_seen: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE users SET is_online = 0, last_seen = ?2 WHERE id = ?1")
        .bind(id)
        .bind(last_seen)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    #[tokio::test]
    async fn online_flag_and_last_seen_round_trip() {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");

        let user = create_user(&pool, 1, "ada", None).await.expect("create");
        assert!(!user.is_online);
        assert!(user.last_seen.is_none());

        set_online(&pool, 1).await.expect("set online");
        let user = get_user_by_id(&pool, 1).await.expect("get").expect("exists");
        assert!(user.is_online);
        assert!(user.last_seen.is_none());

        let seen = Utc::now();
        set_offline(&pool, 1, seen).await.expect("set offline");
        let user = get_user_by_id(&pool, 1).await.expect("get").expect("exists");
        assert!(!user.is_online);
        let stored = user.last_seen.expect("last seen recorded");
        assert!((stored - seen).num_seconds().abs() < 2);
    }
}
