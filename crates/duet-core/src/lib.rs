pub mod auth;
pub mod error;
pub mod message;
pub mod presence;
pub mod receipts;
pub mod registry;
pub mod rooms;

use duet_db::DbPool;
use duet_models::user::UserSummary;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::error::SessionError;
use crate::presence::PresenceTracker;
use crate::registry::RoomRegistry;

/// Build the user summary cache: 5-minute TTL, 10k entries. Sender
/// summaries are embedded in every outbound message payload, so this
/// saves one lookup per send.
fn build_user_cache() -> moka::future::Cache<i64, UserSummary> {
    moka::future::Cache::builder()
        .max_capacity(10_000)
        .time_to_live(std::time::Duration::from_secs(300))
        .build()
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    /// Seconds a freshly opened socket may sit unauthenticated.
    pub handshake_timeout_secs: u64,
    /// Worker id baked into generated snowflakes.
    pub worker_id: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expiry_seconds: 86_400,
            handshake_timeout_secs: 30,
            worker_id: 0,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    /// Room multicast groups and live session handles.
    pub registry: Arc<RoomRegistry>,
    /// Live-session refcounts per identity.
    pub presence: Arc<PresenceTracker>,
    pub user_cache: moka::future::Cache<i64, UserSummary>,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            config,
            registry: Arc::new(RoomRegistry::new()),
            presence: Arc::new(PresenceTracker::new()),
            user_cache: build_user_cache(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Cached identity lookup for payload enrichment.
    pub async fn user_summary(&self, user_id: i64) -> Result<UserSummary, SessionError> {
        if let Some(hit) = self.user_cache.get(&user_id).await {
            return Ok(hit);
        }
        let row = duet_db::users::get_user_by_id(&self.db, user_id)
            .await?
            .ok_or(SessionError::Persistence(duet_db::DbError::NotFound))?;
        let summary = UserSummary {
            id: row.id,
            username: row.username,
            avatar_hash: row.avatar_hash,
        };
        self.user_cache.insert(user_id, summary.clone()).await;
        Ok(summary)
    }
}
