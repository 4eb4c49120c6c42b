#![forbid(unsafe_code)]

pub mod error;
pub mod history;
pub mod model;
pub mod schedule;
pub mod time;

pub use history::{NavigationHistory, Position};
pub use error::ScheduleError;
pub use schedule::{ProgressInfo, Schedule};
pub use time::Clock;
