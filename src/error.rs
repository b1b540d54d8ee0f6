//! Error taxonomy for the wordchain engine.
//!
//! Storage call sites inside the path finder and the consistency jobs catch
//! and log these; only [`Error::InvalidArgument`] is meant to reach the
//! immediate caller of the derivation functions.

/// Every failure the engine can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database could not be opened, migrated, or prepared.
    #[error("connection error: {0}")]
    Connection(String),

    /// A search query failed to execute.
    #[error("query failed: {source} (sql: {sql})")]
    Query {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Invalid input to a derivation function or store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A language-detection pattern exceeded its time budget.
    #[error("pattern `{pattern}` exceeded its budget ({elapsed_ms} ms)")]
    MatcherTimeout { pattern: String, elapsed_ms: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    /// A background worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
