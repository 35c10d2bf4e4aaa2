use std::path::PathBuf;

use crate::feed::QueryWindow;

/// Core error type.
///
/// Adapter crates should map their specific errors into this type so the
/// poller can handle failures consistently (fatal at startup vs retryable).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("security violation: {0}")]
    Security(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),

    /// The transport rejected our credentials. Retrying will not help.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single polling cycle.
///
/// None of these terminate the poller; they are logged and turned into a
/// retry-interval sleep.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("feed unavailable for {window} after {attempts} attempts (rate limited: {rate_limited})")]
    FetchTransient {
        window: QueryWindow,
        attempts: u32,
        rate_limited: bool,
    },

    #[error("feed request for {window} failed: {reason}")]
    FetchFatal { window: QueryWindow, reason: String },

    #[error("delivery of {id} failed: {source}")]
    Delivery {
        id: String,
        #[source]
        source: Error,
    },

    #[error("watermark storage failed: {source}")]
    Storage {
        #[source]
        source: Error,
    },
}
