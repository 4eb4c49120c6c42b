//! Shared error types for the services crate.

use thiserror::Error;

use storage::StorageError;

/// Failures reported by a remote collaborator (conversation or archival service).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("remote request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("remote service rejected the request: {0}")]
    Rejected(String),
    #[error("malformed remote response: {0}")]
    MalformedResponse(String),
}

/// Errors emitted by `SessionSynchronizer`.
///
/// A `Remote` error never leaves local navigation history modified.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("remote {operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },
    #[error("answer cannot be empty")]
    EmptyAnswer,
    #[error("cannot undo {requested} step(s): only {available} answers recorded")]
    UndoOutOfRange { requested: usize, available: usize },
    #[error("no active remote session")]
    NoSession,
}

impl SyncError {
    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(RemoteError) -> Self {
        move |source| Self::Remote { operation, source }
    }
}

/// Errors emitted by `ExportPipeline` uploads.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExportError {
    #[error("upload failed: {0}")]
    Upload(#[from] RemoteError),
}

/// Errors emitted by `CollectionFlow`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollectionError {
    #[error("no collection in progress")]
    NotStarted,
    #[error("collection already finished")]
    Finished,
    #[error("phase {phase} is not open yet")]
    PhaseNotOpen { phase: u32 },
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
