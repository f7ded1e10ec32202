pub mod auto_closer;
pub mod matcher;

pub use auto_closer::{AutoCloser, SweepReport};
pub use matcher::{MatchOutcome, Matcher, MatcherSettings, QueueJoinEvent};
