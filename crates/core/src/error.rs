use thiserror::Error;

/// Invalid schedule dimensions passed to `Schedule::new`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScheduleError {
    #[error("element type list has {actual} labels, expected {expected}")]
    ConfigurationError { expected: usize, actual: usize },
    #[error("schedule needs at least one element")]
    ZeroElements,
    #[error("schedule needs at least one question per phase and one cycle")]
    EmptySchedule,
}
