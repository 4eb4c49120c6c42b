use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::SessionId;

/// A single recorded answer.
///
/// Records are appended in the order answers are accepted and never edited
/// afterwards; export reproduces that order row for row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub participant_name: String,
    pub phase: u32,
    pub element_type: String,
    pub cycle_number: u32,
    pub question_number_in_phase: u32,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<SessionId>,
}

impl AnswerRecord {
    /// Timestamp in ISO-8601 with millisecond precision (`2023-11-14T22:13:20.000Z`).
    #[must_use]
    pub fn timestamp_iso(&self) -> String {
        self.timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}
