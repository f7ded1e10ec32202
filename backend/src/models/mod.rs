pub mod matches;
pub mod queue;
pub mod users;

pub use matches::{Match, MatchCompletion, MatchStatus};
pub use queue::{MatchPreference, QueueEntry, QueueStatus};
pub use users::UserProfile;
