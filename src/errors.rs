use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("no reply from server within the query timeout of {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Server error {code}: {message}")]
    Server { code: i32, message: String },
}

impl DbError {
    /// True for failures a caller may reasonably retry with a fresh request.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
