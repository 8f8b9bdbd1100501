use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the bot core
/// can handle failures consistently (user-facing notice vs fatal).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("rate limited; retry in {0:?}")]
    RateLimited(Duration),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("relay failed: {0}")]
    Relay(String),

    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
