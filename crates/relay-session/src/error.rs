/// Errors produced by the session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no session for key {key}")]
    NotFound { key: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
