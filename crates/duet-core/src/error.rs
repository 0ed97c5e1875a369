use thiserror::Error;

/// Operation-local failures of an authenticated session. None of these
/// terminate the connection; they are reported to the originating session
/// as a `message_error` and nothing else.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not a participant of this room")]
    NotAParticipant,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("persistence failure: {0}")]
    Persistence(#[from] duet_db::DbError),
}

impl SessionError {
    /// Stable machine-readable reason carried on the wire.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotAParticipant => "NotAParticipant",
            Self::Validation(_) => "ValidationError",
            Self::Persistence(_) => "PersistenceError",
        }
    }
}
