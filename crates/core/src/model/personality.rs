use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schedule::Schedule;

/// Participant's personality code, one letter per element (e.g. `INTJ`).
///
/// Stored verbatim. Lookups tolerate codes that are too short so partially
/// known codes can still label exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalityCode(String);

impl PersonalityCode {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Letter labelling the element at `element_index`, if the code is long enough.
    #[must_use]
    pub fn letter_for(&self, element_index: usize) -> Option<char> {
        self.0.chars().nth(element_index)
    }

    /// True if the code has one letter per element, each drawn from that element's pair.
    #[must_use]
    pub fn is_well_formed(&self, schedule: &Schedule) -> bool {
        let letters: Vec<char> = self.0.chars().collect();
        if letters.len() != schedule.total_elements() {
            return false;
        }
        letters.iter().enumerate().all(|(index, letter)| {
            let upper = letter.to_ascii_uppercase();
            match schedule.letter_pair(index) {
                Some((a, b)) => upper == a || upper == b,
                None => letter.is_ascii_alphabetic(),
            }
        })
    }
}

impl fmt::Display for PersonalityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_lookup_tolerates_short_codes() {
        let code = PersonalityCode::new("IN");
        assert_eq!(code.letter_for(0), Some('I'));
        assert_eq!(code.letter_for(1), Some('N'));
        assert_eq!(code.letter_for(3), None);
    }

    #[test]
    fn well_formed_checks_letter_pairs() {
        let schedule = Schedule::standard();
        assert!(PersonalityCode::new("INTJ").is_well_formed(&schedule));
        assert!(PersonalityCode::new("esfp").is_well_formed(&schedule));
        assert!(!PersonalityCode::new("NITJ").is_well_formed(&schedule));
        assert!(!PersonalityCode::new("INT").is_well_formed(&schedule));
    }
}
