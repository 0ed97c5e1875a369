/// One authenticated gateway connection. A user may hold several of
/// these at once; presence cares about the set, delivery cares about
/// each one individually.
pub struct Session {
    pub session_id: String,
    pub user_id: i64,
    pub username: String,
}

impl Session {
    pub fn new(user_id: i64, username: String) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            username,
        }
    }
}
