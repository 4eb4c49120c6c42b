use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::model::ElementId;

//
// ─── CONSTANTS ─────────────────────────────────────────────────────────────────
//

/// Number of personality elements in the standard schedule.
pub const STANDARD_ELEMENTS: usize = 4;
/// Questions asked within a single phase.
pub const STANDARD_QUESTIONS_PER_PHASE: u32 = 10;
/// Times each element's question block is repeated.
pub const STANDARD_CYCLES: u32 = 5;

const STANDARD_LABELS: [&str; STANDARD_ELEMENTS] =
    ["Energy (I/E)", "Mind (N/S)", "Nature (T/F)", "Tactics (J/P)"];

/// Letter pairs a personality code may use per element, in element order.
const STANDARD_LETTER_PAIRS: [(char, char); STANDARD_ELEMENTS] =
    [('I', 'E'), ('N', 'S'), ('T', 'F'), ('J', 'P')];

//
// ─── PROGRESS INFO ─────────────────────────────────────────────────────────────
//

/// Snapshot of where a participant stands in the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub phase: u32,
    pub total_phases: u32,
    pub element_id: ElementId,
    pub element_type: String,
    pub cycle: u32,
    pub question_in_phase: u32,
    pub questions_per_phase: u32,
    pub overall_answered: u32,
    pub total_questions: u32,
    pub percentage: f64,
}

//
// ─── SCHEDULE ──────────────────────────────────────────────────────────────────
//

/// The fixed multi-phase collection schedule.
///
/// Phases are numbered from 1. Elements rotate round-robin across phases, so
/// phase `p` belongs to element `((p - 1) mod elements) + 1` and cycle
/// `((p - 1) div elements) + 1`. The arithmetic is total for every phase ≥ 1;
/// range checks against [`Schedule::total_phases`] are left to callers.
///
/// # Examples
///
/// ```
/// # use collect_core::schedule::Schedule;
/// let schedule = Schedule::standard();
/// assert_eq!(schedule.element_id(7).value(), 3);
/// assert_eq!(schedule.cycle(7), 2);
/// assert_eq!(schedule.element_type(20), "Tactics (J/P)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    element_types: Vec<String>,
    letter_pairs: Vec<(char, char)>,
    questions_per_phase: u32,
    cycles: u32,
}

impl Schedule {
    /// The 4 elements × 10 questions × 5 cycles schedule.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            element_types: STANDARD_LABELS.iter().map(|s| (*s).to_string()).collect(),
            letter_pairs: STANDARD_LETTER_PAIRS.to_vec(),
            questions_per_phase: STANDARD_QUESTIONS_PER_PHASE,
            cycles: STANDARD_CYCLES,
        }
    }

    /// Build a custom schedule.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::ConfigurationError` if `element_types` does not hold
    /// exactly `total_elements` labels, `ScheduleError::ZeroElements` when
    /// `total_elements` is zero, and `ScheduleError::EmptySchedule` when either
    /// count is zero.
    pub fn new(
        element_types: Vec<String>,
        total_elements: usize,
        questions_per_phase: u32,
        cycles: u32,
    ) -> Result<Self, ScheduleError> {
        if total_elements == 0 {
            return Err(ScheduleError::ZeroElements);
        }
        if element_types.len() != total_elements {
            return Err(ScheduleError::ConfigurationError {
                expected: total_elements,
                actual: element_types.len(),
            });
        }
        if questions_per_phase == 0 || cycles == 0 {
            return Err(ScheduleError::EmptySchedule);
        }
        let letter_pairs = if total_elements == STANDARD_ELEMENTS {
            STANDARD_LETTER_PAIRS.to_vec()
        } else {
            Vec::new()
        };
        Ok(Self {
            element_types,
            letter_pairs,
            questions_per_phase,
            cycles,
        })
    }

    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.element_types.len()
    }

    #[must_use]
    pub fn questions_per_phase(&self) -> u32 {
        self.questions_per_phase
    }

    #[must_use]
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    #[must_use]
    pub fn total_phases(&self) -> u32 {
        self.elements_u32().saturating_mul(self.cycles)
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_phases().saturating_mul(self.questions_per_phase)
    }

    /// Zero-based element index for a phase.
    ///
    /// # Panics
    ///
    /// Panics if `phase` is zero.
    #[must_use]
    pub fn element_index(&self, phase: u32) -> usize {
        assert!(phase >= 1, "phase numbers start at 1");
        ((phase - 1) % self.elements_u32()) as usize
    }

    /// One-based element id for a phase.
    ///
    /// # Panics
    ///
    /// Panics if `phase` is zero.
    #[must_use]
    pub fn element_id(&self, phase: u32) -> ElementId {
        let index = u32::try_from(self.element_index(phase)).unwrap_or(u32::MAX);
        ElementId::new(index + 1)
    }

    /// Element label for a phase.
    ///
    /// # Panics
    ///
    /// Panics if `phase` is zero.
    #[must_use]
    pub fn element_type(&self, phase: u32) -> &str {
        &self.element_types[self.element_index(phase)]
    }

    /// One-based repetition count for a phase.
    ///
    /// # Panics
    ///
    /// Panics if `phase` is zero.
    #[must_use]
    pub fn cycle(&self, phase: u32) -> u32 {
        assert!(phase >= 1, "phase numbers start at 1");
        (phase - 1) / self.elements_u32() + 1
    }

    /// Label for an element id, falling back to `Element <n>` outside the table.
    #[must_use]
    pub fn element_name(&self, element_id: ElementId) -> String {
        usize::try_from(element_id.value())
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| self.element_types.get(index))
            .cloned()
            .unwrap_or_else(|| format!("Element {element_id}"))
    }

    /// Allowed letters for an element index, if this schedule knows them.
    #[must_use]
    pub fn letter_pair(&self, element_index: usize) -> Option<(char, char)> {
        self.letter_pairs.get(element_index).copied()
    }

    #[must_use]
    pub fn is_final_phase(&self, phase: u32) -> bool {
        phase == self.total_phases()
    }

    /// True once `phase` has moved past the last scheduled phase.
    #[must_use]
    pub fn is_complete(&self, phase: u32) -> bool {
        phase > self.total_phases()
    }

    /// Progress summary for `phase` with `answered_in_phase` answers already given.
    ///
    /// # Panics
    ///
    /// Panics if `phase` is zero.
    #[must_use]
    pub fn progress_info(&self, phase: u32, answered_in_phase: u32) -> ProgressInfo {
        let answered_in_phase = answered_in_phase.min(self.questions_per_phase);
        let overall_answered = (phase - 1)
            .saturating_mul(self.questions_per_phase)
            .saturating_add(answered_in_phase);
        let total_questions = self.total_questions();
        let percentage = if total_questions == 0 {
            0.0
        } else {
            (f64::from(overall_answered) / f64::from(total_questions) * 100.0).min(100.0)
        };

        ProgressInfo {
            phase,
            total_phases: self.total_phases(),
            element_id: self.element_id(phase),
            element_type: self.element_type(phase).to_string(),
            cycle: self.cycle(phase),
            question_in_phase: (answered_in_phase + 1).min(self.questions_per_phase),
            questions_per_phase: self.questions_per_phase,
            overall_answered,
            total_questions,
            percentage,
        }
    }

    fn elements_u32(&self) -> u32 {
        u32::try_from(self.element_types.len()).unwrap_or(u32::MAX)
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn standard_schedule_maps_example_phases() {
        let schedule = Schedule::standard();
        assert_eq!(schedule.element_id(1).value(), 1);
        assert_eq!(schedule.cycle(1), 1);
        assert_eq!(schedule.element_id(7).value(), 3);
        assert_eq!(schedule.cycle(7), 2);
        assert_eq!(schedule.element_id(20).value(), 4);
        assert_eq!(schedule.cycle(20), 5);
        assert_eq!(schedule.total_phases(), 20);
        assert_eq!(schedule.total_questions(), 200);
    }

    #[test]
    fn mismatched_label_count_is_configuration_error() {
        let err = Schedule::new(vec!["a".into(), "b".into()], 4, 10, 5).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::ConfigurationError {
                expected: 4,
                actual: 2
            }
        );
        assert_eq!(
            Schedule::new(Vec::new(), 0, 10, 5).unwrap_err(),
            ScheduleError::ZeroElements
        );
    }

    #[test]
    fn element_name_falls_back_outside_table() {
        let schedule = Schedule::standard();
        assert_eq!(schedule.element_name(ElementId::new(2)), "Mind (N/S)");
        assert_eq!(schedule.element_name(ElementId::new(9)), "Element 9");
        assert_eq!(schedule.element_name(ElementId::new(0)), "Element 0");
    }

    #[test]
    fn progress_info_caps_percentage() {
        let schedule = Schedule::standard();
        let info = schedule.progress_info(3, 4);
        assert_eq!(info.overall_answered, 24);
        assert_eq!(info.question_in_phase, 5);
        assert!((info.percentage - 12.0).abs() < f64::EPSILON);

        let beyond = schedule.progress_info(25, 10);
        assert!((beyond.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn completion_flags_follow_total_phases() {
        let schedule = Schedule::standard();
        assert!(schedule.is_final_phase(20));
        assert!(!schedule.is_complete(20));
        assert!(schedule.is_complete(21));
    }

    proptest! {
        #[test]
        fn element_and_cycle_stay_in_range(phase in 1u32..100_000) {
            let schedule = Schedule::standard();
            let id = schedule.element_id(phase).value();
            prop_assert!((1..=4).contains(&id));
            prop_assert!(schedule.cycle(phase) >= 1);
        }

        #[test]
        fn element_type_is_periodic(phase in 1u32..100_000) {
            let schedule = Schedule::standard();
            prop_assert_eq!(schedule.element_type(phase), schedule.element_type(phase + 4));
            prop_assert_eq!(schedule.cycle(phase) + 1, schedule.cycle(phase + 4));
        }
    }
}
