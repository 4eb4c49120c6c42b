mod answer;
mod ids;
mod navigation;
mod personality;
mod progress;

pub use answer::AnswerRecord;
pub use ids::{ElementId, SessionId};
pub use navigation::NavigationState;
pub use personality::PersonalityCode;
pub use progress::{ANONYMOUS_PARTICIPANT, CollectionProgress};
