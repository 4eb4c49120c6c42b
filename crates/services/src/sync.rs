use std::fmt;
use std::sync::Arc;

use collect_core::NavigationHistory;
use collect_core::model::{ElementId, NavigationState, SessionId};
use tracing::{debug, info, warn};

use crate::conversation::{CompletionSummary, ConversationService, RemoteTurn};
use crate::error::SyncError;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// Result of the best-effort completion attempted before every `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// A lingering session was closed.
    Completed(CompletionSummary),
    /// Nothing was closed; carries the remote's reason. Never an error for `start`.
    Skipped(String),
}

/// A freshly opened remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub turn: RemoteTurn,
    pub cleanup: CleanupOutcome,
}

/// How a forward move was reconciled with the remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replay {
    /// No entry ahead of the cursor.
    Nothing,
    /// The remote asked the stored question again; the cursor moved forward.
    Restored,
    /// The remote asked something else; the new turn replaced the stored future.
    Diverged,
}

//
// ─── SYNCHRONIZER ──────────────────────────────────────────────────────────────
//

/// Keeps a remote conversation session and a local `NavigationHistory` in step.
///
/// The remote side counts answers in the active session; the local side has a
/// cursor whose index equals that count. The coordinating operations
/// ([`advance`](Self::advance), [`rewind`](Self::rewind), [`replay`](Self::replay))
/// call the remote first and touch the history only after it succeeded, so a
/// failed call leaves both sides where they were.
///
/// Calls must not overlap: the remote session is one mutable sequence.
pub struct SessionSynchronizer {
    conversation: Arc<dyn ConversationService>,
    session_id: Option<SessionId>,
    answered: usize,
    last_cleanup: Option<CleanupOutcome>,
}

impl SessionSynchronizer {
    #[must_use]
    pub fn new(conversation: Arc<dyn ConversationService>) -> Self {
        Self {
            conversation,
            session_id: None,
            answered: 0,
            last_cleanup: None,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Answers the remote session currently holds.
    #[must_use]
    pub fn answered(&self) -> usize {
        self.answered
    }

    /// Outcome of the cleanup performed by the most recent `start`.
    #[must_use]
    pub fn last_cleanup(&self) -> Option<&CleanupOutcome> {
        self.last_cleanup.as_ref()
    }

    /// True when the local cursor and the remote answer count name the same question.
    #[must_use]
    pub fn is_aligned(&self, history: &NavigationHistory) -> bool {
        history.steps_behind() == self.answered
    }

    /// Open a new remote session, first closing whatever session may linger.
    ///
    /// The caller records the opening state into its history.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the new session cannot be opened. Failures of
    /// the preliminary completion are reported in `StartedSession::cleanup` only.
    pub async fn start(
        &mut self,
        element_id: Option<ElementId>,
    ) -> Result<StartedSession, SyncError> {
        let cleanup = self.complete_best_effort().await;

        let started = self
            .conversation
            .start_session(element_id)
            .await
            .map_err(SyncError::remote("start"))?;

        self.session_id = Some(started.session_id.clone());
        self.answered = 0;
        info!(
            session_id = %started.session_id,
            element_id = ?element_id.map(|id| id.value()),
            "remote session started"
        );

        Ok(StartedSession {
            session_id: started.session_id,
            turn: started.turn,
            cleanup,
        })
    }

    async fn complete_best_effort(&mut self) -> CleanupOutcome {
        let outcome = match self.conversation.complete_session().await {
            Ok(summary) => {
                debug!(answered = summary.total_questions_answered, "closed lingering session");
                CleanupOutcome::Completed(summary)
            }
            Err(err) => {
                debug!(error = %err, "no lingering session closed");
                CleanupOutcome::Skipped(err.to_string())
            }
        };
        self.session_id = None;
        self.answered = 0;
        self.last_cleanup = Some(outcome.clone());
        outcome
    }

    /// Forward `answer` to the remote session and return the next question.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::EmptyAnswer` for blank input, `SyncError::NoSession`
    /// before `start`, and `SyncError::Remote` if the remote call fails.
    pub async fn submit_answer(&mut self, answer: &str) -> Result<RemoteTurn, SyncError> {
        if answer.trim().is_empty() {
            return Err(SyncError::EmptyAnswer);
        }
        if self.session_id.is_none() {
            return Err(SyncError::NoSession);
        }

        let turn = self
            .conversation
            .submit_answer(answer)
            .await
            .map_err(SyncError::remote("submit_answer"))?;
        self.answered += 1;
        Ok(turn)
    }

    /// Roll the remote session back by `steps` answers.
    ///
    /// Once the remote accepts the undo it is committed; the returned turn is
    /// whatever the remote chose to report, which may be nothing. The caller
    /// must move its history back the same number of steps; prefer
    /// [`rewind`](Self::rewind), which does both.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::UndoOutOfRange` if more steps are requested than answers
    /// were submitted, `SyncError::NoSession` before `start`, and
    /// `SyncError::Remote` if the remote call fails.
    ///
    /// # Panics
    ///
    /// Panics if `steps` is zero.
    pub async fn undo(&mut self, steps: usize) -> Result<Option<RemoteTurn>, SyncError> {
        assert!(steps >= 1, "undo needs at least one step");
        if self.session_id.is_none() {
            return Err(SyncError::NoSession);
        }
        if steps > self.answered {
            return Err(SyncError::UndoOutOfRange {
                requested: steps,
                available: self.answered,
            });
        }

        let turn = self
            .conversation
            .undo(steps)
            .await
            .map_err(SyncError::remote("undo"))?;
        self.answered -= steps;
        debug!(steps, answered = self.answered, "remote answers undone");
        Ok(turn)
    }

    /// Close the active session. Without an active session this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the remote call fails; the session stays active.
    pub async fn complete(&mut self) -> Result<Option<CompletionSummary>, SyncError> {
        let Some(session_id) = self.session_id.clone() else {
            return Ok(None);
        };

        let summary = self
            .conversation
            .complete_session()
            .await
            .map_err(SyncError::remote("complete"))?;
        self.session_id = None;
        self.answered = 0;
        info!(
            session_id = %session_id,
            answered = summary.total_questions_answered,
            "remote session completed"
        );
        Ok(Some(summary))
    }

    /// Submit `answer` and push the state `build` derives from the current state
    /// and the remote's next question.
    ///
    /// # Errors
    ///
    /// Propagates `submit_answer` errors; the history is untouched on error.
    ///
    /// # Panics
    ///
    /// Panics if the history is empty or out of step with the remote session.
    pub async fn advance<F>(
        &mut self,
        history: &mut NavigationHistory,
        answer: &str,
        build: F,
    ) -> Result<(), SyncError>
    where
        F: FnOnce(&NavigationState, RemoteTurn) -> NavigationState,
    {
        assert!(!history.is_empty(), "advance needs an opening state");
        self.assert_aligned(history);

        let turn = self.submit_answer(answer).await?;
        if let Some(next) = history.current().map(|current| build(current, turn)) {
            history.push(next);
        }
        Ok(())
    }

    /// Undo `steps` answers remotely, then move the history back as many entries.
    ///
    /// The entry now at the cursor is the active question. The remote's own
    /// report of it, when it sends one, is only compared against it.
    ///
    /// # Errors
    ///
    /// Propagates `undo` errors; the history is untouched on error.
    ///
    /// # Panics
    ///
    /// Panics if `steps` is zero, exceeds the entries behind the cursor, or the
    /// history is out of step with the remote session.
    pub async fn rewind(
        &mut self,
        history: &mut NavigationHistory,
        steps: usize,
    ) -> Result<(), SyncError> {
        assert!(
            steps >= 1 && steps <= history.steps_behind(),
            "cannot rewind {steps} step(s) with {} entries behind the cursor",
            history.steps_behind()
        );
        self.assert_aligned(history);

        let reported = self.undo(steps).await?;
        for _ in 0..steps {
            history.back();
        }
        if let (Some(turn), Some(current)) = (reported, history.current()) {
            if current.question() != turn.question {
                warn!(
                    local = current.question(),
                    remote = %turn.question,
                    "remote question differs after undo"
                );
            }
        }
        Ok(())
    }

    /// Move forward by resubmitting the answer stored in the entry ahead.
    ///
    /// # Errors
    ///
    /// Propagates `submit_answer` errors; the history is untouched on error.
    ///
    /// # Panics
    ///
    /// Panics if the history is out of step with the remote session.
    pub async fn replay(&mut self, history: &mut NavigationHistory) -> Result<Replay, SyncError> {
        self.assert_aligned(history);
        let Some(record) = history
            .peek_forward()
            .and_then(NavigationState::last_answer)
            .cloned()
        else {
            return Ok(Replay::Nothing);
        };
        let Some(expected) = history.peek_forward().map(|next| next.question().to_owned()) else {
            return Ok(Replay::Nothing);
        };

        let turn = self.submit_answer(&record.answer).await?;
        if turn.question == expected {
            history.forward();
            return Ok(Replay::Restored);
        }

        debug!(stored = %expected, remote = %turn.question, "replay diverged");
        if let Some(next) = history
            .current()
            .map(|current| current.follow_up(record, turn.question, turn.options))
        {
            history.push(next);
        }
        Ok(Replay::Diverged)
    }

    fn assert_aligned(&self, history: &NavigationHistory) {
        assert!(
            self.is_aligned(history),
            "history cursor {} out of step with {} remote answers",
            history.cursor(),
            self.answered
        );
    }
}

impl fmt::Debug for SessionSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSynchronizer")
            .field("session_id", &self.session_id)
            .field("answered", &self.answered)
            .field("last_cleanup", &self.last_cleanup)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
