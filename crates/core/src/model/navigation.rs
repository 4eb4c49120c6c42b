use crate::model::{AnswerRecord, SessionId};

/// Immutable snapshot of one visited point in a phase.
///
/// States are built either as the opening of a phase or as the follow-up of a
/// previous state, so `question_history` and `options_history` always have the
/// same length and only ever grow within a phase.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationState {
    phase: u32,
    question_in_phase: u32,
    question: String,
    options: Vec<String>,
    session_id: Option<SessionId>,
    session_data: Vec<AnswerRecord>,
    question_history: Vec<String>,
    options_history: Vec<Vec<String>>,
}

impl NavigationState {
    /// First state of a phase, before any answer was given in its session.
    ///
    /// # Panics
    ///
    /// Panics if `phase` is zero.
    #[must_use]
    pub fn opening(
        phase: u32,
        question: impl Into<String>,
        options: Vec<String>,
        session_id: Option<SessionId>,
    ) -> Self {
        assert!(phase >= 1, "phase numbers start at 1");
        let question = question.into();
        Self {
            phase,
            question_in_phase: 1,
            question_history: vec![question.clone()],
            options_history: vec![options.clone()],
            question,
            options,
            session_id,
            session_data: Vec::new(),
        }
    }

    /// State reached by answering this one with `record` and receiving the next question.
    #[must_use]
    pub fn follow_up(
        &self,
        record: AnswerRecord,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        let question = question.into();
        let mut session_data = self.session_data.clone();
        session_data.push(record);
        let mut question_history = self.question_history.clone();
        question_history.push(question.clone());
        let mut options_history = self.options_history.clone();
        options_history.push(options.clone());

        Self {
            phase: self.phase,
            question_in_phase: u32::try_from(session_data.len() + 1).unwrap_or(u32::MAX),
            question,
            options,
            session_id: self.session_id.clone(),
            session_data,
            question_history,
            options_history,
        }
    }

    #[must_use]
    pub fn phase(&self) -> u32 {
        self.phase
    }

    #[must_use]
    pub fn question_in_phase(&self) -> u32 {
        self.question_in_phase
    }

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Answers collected in the current remote session up to this point.
    #[must_use]
    pub fn session_data(&self) -> &[AnswerRecord] {
        &self.session_data
    }

    /// Answer that led to this state, if any.
    #[must_use]
    pub fn last_answer(&self) -> Option<&AnswerRecord> {
        self.session_data.last()
    }

    #[must_use]
    pub fn question_history(&self) -> &[String] {
        &self.question_history
    }

    #[must_use]
    pub fn options_history(&self) -> &[Vec<String>] {
        &self.options_history
    }
}
