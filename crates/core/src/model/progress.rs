use serde::{Deserialize, Serialize};

use crate::model::{AnswerRecord, PersonalityCode};

/// Name used when no participant name was entered.
pub const ANONYMOUS_PARTICIPANT: &str = "anonymous";

/// Persisted state of a collection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionProgress {
    pub participant_name: String,
    pub personality_code: Option<PersonalityCode>,
    pub current_phase: u32,
    pub collected_data: Vec<AnswerRecord>,
}

impl CollectionProgress {
    /// Fresh progress at phase 1 with no answers.
    #[must_use]
    pub fn new(participant_name: impl Into<String>, personality_code: Option<PersonalityCode>) -> Self {
        Self {
            participant_name: participant_name.into().trim().to_string(),
            personality_code,
            current_phase: 1,
            collected_data: Vec::new(),
        }
    }

    /// Participant name, or `anonymous` when blank.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.participant_name.is_empty() {
            ANONYMOUS_PARTICIPANT
        } else {
            &self.participant_name
        }
    }

    /// Records belonging to `phase`, in insertion order.
    #[must_use]
    pub fn phase_records(&self, phase: u32) -> Vec<AnswerRecord> {
        self.collected_data
            .iter()
            .filter(|record| record.phase == phase)
            .cloned()
            .collect()
    }

    /// Index in `collected_data` where records of the current phase begin.
    #[must_use]
    pub fn current_phase_offset(&self) -> usize {
        self.collected_data
            .iter()
            .take_while(|record| record.phase < self.current_phase)
            .count()
    }

    /// Drop every record of the current phase.
    pub fn discard_current_phase(&mut self) {
        let offset = self.current_phase_offset();
        self.collected_data.truncate(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn record(phase: u32, answer: &str) -> AnswerRecord {
        AnswerRecord {
            participant_name: "p".into(),
            phase,
            element_type: "Energy (I/E)".into(),
            cycle_number: 1,
            question_number_in_phase: 1,
            question: "Q".into(),
            answer: answer.into(),
            timestamp: fixed_now(),
            session_id: None,
        }
    }

    #[test]
    fn blank_name_displays_as_anonymous() {
        assert_eq!(CollectionProgress::new("  ", None).display_name(), "anonymous");
        assert_eq!(CollectionProgress::new("Aki", None).display_name(), "Aki");
    }

    #[test]
    fn discard_current_phase_keeps_earlier_phases() {
        let mut progress = CollectionProgress::new("p", None);
        progress.collected_data = vec![record(1, "a"), record(1, "b"), record(2, "c")];
        progress.current_phase = 2;

        assert_eq!(progress.current_phase_offset(), 2);
        assert_eq!(progress.phase_records(1).len(), 2);

        progress.discard_current_phase();
        assert_eq!(progress.collected_data.len(), 2);
        assert!(progress.phase_records(2).is_empty());
    }
}
