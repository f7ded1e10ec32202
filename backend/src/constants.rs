// =============================================================================
// Side-Table Matching Constants
// =============================================================================
// This file contains all constants used throughout the backend to enable
// easy tuning and configuration from a single location.

// =============================================================================
// QUEUE & CANDIDATE LIMITS
// =============================================================================

/// Maximum waiting entries pulled into one matching attempt (oldest first)
pub const MAX_QUEUE_CANDIDATES: i64 = 50;

/// Maximum number of values a single "value in set" store query may carry
pub const MAX_IN_QUERY_VALUES: usize = 30;

/// Maximum accepted length of a user id on the queue-join endpoint
pub const MAX_USER_ID_LENGTH: usize = 128;

// =============================================================================
// TIME WINDOWS
// =============================================================================

/// No new matches are created this close (in minutes) to a slot
pub const TOO_CLOSE_TO_BREAK_MINUTES: i64 = 5;

/// Inside this many minutes of a slot, matching is forced
pub const URGENT_MATCHING_MINUTES: i64 = 15;

/// A match is closed this long after its meeting time
pub const MEETING_DURATION_MINUTES: i64 = 30;

/// Lookback for the rematch cooldown
pub const RECENT_MATCH_LOOKBACK_HOURS: i64 = 24;

// =============================================================================
// PAIR SCORING
// =============================================================================

/// Score every eligible pair starts from
pub const BASE_PAIR_SCORE: f64 = 100.0;

/// Subtracted when the pair met within the lookback window
pub const RECENT_MATCH_PENALTY: f64 = 80.0;

/// Points per minute of average wait
pub const WAIT_SCORE_PER_MINUTE: f64 = 2.0;

/// Cap on the wait-time contribution
pub const MAX_WAIT_SCORE: f64 = 40.0;

/// Bonus when both sides asked for same gender and got it
pub const SAME_GENDER_BONUS: f64 = 20.0;

/// Upper bound (exclusive) of the random tie-break
pub const MAX_SCORE_JITTER: f64 = 5.0;

// =============================================================================
// MATCH RECORDS
// =============================================================================

/// Match type written on every side-table match
pub const SIDE_TABLE_MATCH_TYPE: &str = "side_table";

/// Where matched pairs meet unless configured otherwise
pub const DEFAULT_MEETUP_LOCATION: &str = "Main Canteen";

// =============================================================================
// SCHEDULING
// =============================================================================

/// How often the auto-closer sweeps active matches
pub const AUTO_CLOSE_INTERVAL_SECS: u64 = 60;

/// Wall-clock budget for one matching invocation
pub const DEFAULT_MATCHING_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// SERVER CONFIGURATION
// =============================================================================

/// Default server port if not specified in environment
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Timezone slot tokens are interpreted in when SLOT_TIMEZONE is unset
pub const DEFAULT_SLOT_TIMEZONE: &str = "UTC";

// =============================================================================
// HELPER FUNCTIONS FOR VALIDATION
// =============================================================================

/// Validates a user id received from a client
pub fn is_valid_user_id(user_id: &str) -> bool {
    let trimmed = user_id.trim();
    !trimmed.is_empty() && trimmed.len() <= MAX_USER_ID_LENGTH
}
