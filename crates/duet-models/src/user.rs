use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(with = "crate::id_str")]
    pub id: i64,
    pub username: String,
    pub avatar_hash: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The subset embedded in outbound event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(with = "crate::id_str")]
    pub id: i64,
    pub username: String,
    pub avatar_hash: Option<String>,
}
