//! Contract of the remote conversation backend.

mod http;

use async_trait::async_trait;
use collect_core::model::{ElementId, SessionId};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

pub use http::HttpConversationService;

/// Question currently posed by the remote session, with its answer choices.
///
/// `options` is empty for free-text questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTurn {
    pub question: String,
    pub options: Vec<String>,
}

/// Result of opening a remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub session_id: SessionId,
    pub turn: RemoteTurn,
}

/// What the remote service reports when a session is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub session_id: Option<SessionId>,
    pub total_questions_answered: u32,
    pub message: String,
}

/// Remote conversational backend supplying questions and accepting answers.
///
/// The session is a single mutable sequence on the remote side; callers must
/// not issue overlapping calls.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Open a new session, optionally pinned to one element.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport or domain failure.
    async fn start_session(&self, element_id: Option<ElementId>)
    -> Result<SessionStart, RemoteError>;

    /// Answer the active question and receive the next one.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport or domain failure.
    async fn submit_answer(&self, answer: &str) -> Result<RemoteTurn, RemoteError>;

    /// Roll back the last `steps` answers.
    ///
    /// A successful return means the remote session has moved back. Backends
    /// that report the question now active return it; `None` leaves the caller
    /// to recover it from its own record of the session.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport or domain failure, including asking
    /// for more steps than answers recorded.
    async fn undo(&self, steps: usize) -> Result<Option<RemoteTurn>, RemoteError>;

    /// Close the active session.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on transport failure or when no session is open.
    async fn complete_session(&self) -> Result<CompletionSummary, RemoteError>;
}
