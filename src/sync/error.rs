//! Sync error taxonomy.

use thiserror::Error;

/// Failure of a sync operation.
///
/// "No backup exists" is not an error; it drives the bootstrap path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Credential rejected even after one silent refresh. Needs interactive sign-in.
    #[error("authorization expired, please sign in again")]
    AuthExpired,

    /// The backup exists but its content is not a journal document.
    #[error("remote backup could not be read")]
    RemoteUnreadable,

    /// Network, timeout, or unexpected HTTP status.
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl SyncError {
    /// User-facing notification text.
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::AuthExpired => "Please sign in again",
            SyncError::RemoteUnreadable | SyncError::TransportFailure(_) => {
                "Sync failed, using local data"
            }
        }
    }
}

/// Failure reported by a remote document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// HTTP 401
    #[error("unauthorized")]
    Unauthorized,

    /// HTTP 404 for a document handle
    #[error("document not found")]
    NotFound,

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized => SyncError::AuthExpired,
            other => SyncError::TransportFailure(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            StoreError::Unauthorized
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}
