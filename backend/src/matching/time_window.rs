//! Resolution of symbolic slot tokens ("12:30 PM") to absolute instants.
//!
//! Only the time-of-day parse is memoized. The absolute instant depends on
//! "now" and is recomputed on every call.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::constants::{TOO_CLOSE_TO_BREAK_MINUTES, URGENT_MATCHING_MINUTES};

static SLOT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,2}):(\d{2})\s*([AaPp][Mm])\s*$").expect("slot pattern is valid")
});

static TIME_OF_DAY_CACHE: Lazy<RwLock<HashMap<String, NaiveTime>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("unrecognised time slot {0:?}, expected \"H:MM AM\" or \"H:MM PM\"")]
    Malformed(String),

    #[error("time slot {slot:?} has no occurrence in {tz} after {after}")]
    Unresolvable {
        slot: String,
        tz: Tz,
        after: DateTime<Utc>,
    },
}

/// Parses a slot token into a time of day, consulting the process-wide cache.
pub fn parse_time_of_day(slot: &str) -> Result<NaiveTime, SlotError> {
    let key = cache_key(slot);
    if let Some(time) = TIME_OF_DAY_CACHE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Ok(*time);
    }

    let time = parse_uncached(slot)?;
    TIME_OF_DAY_CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key)
        .or_insert(time);
    Ok(time)
}

// Spacing and case variants the pattern accepts share one entry.
fn cache_key(slot: &str) -> String {
    let upper = slot.trim().to_ascii_uppercase();
    match upper.len().checked_sub(2).filter(|&i| upper.is_char_boundary(i)) {
        Some(i) => format!("{}{}", upper[..i].trim_end(), &upper[i..]),
        None => upper,
    }
}

fn parse_uncached(slot: &str) -> Result<NaiveTime, SlotError> {
    let malformed = || SlotError::Malformed(slot.to_string());
    let caps = SLOT_PATTERN.captures(slot).ok_or_else(malformed)?;

    let hours: u32 = caps[1].parse().map_err(|_| malformed())?;
    let minutes: u32 = caps[2].parse().map_err(|_| malformed())?;
    if !(1..=12).contains(&hours) {
        return Err(malformed());
    }

    let pm = caps[3].eq_ignore_ascii_case("pm");
    let hour24 = match (hours, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };

    NaiveTime::from_hms_opt(hour24, minutes, 0).ok_or_else(malformed)
}

/// Canonical rendering of a slot, e.g. "9:05 AM".
pub fn format_slot(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

/// Gating decisions for slots interpreted in one timezone.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    tz: Tz,
    too_close: Duration,
    urgent: Duration,
}

impl TimeWindow {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            too_close: Duration::minutes(TOO_CLOSE_TO_BREAK_MINUTES),
            urgent: Duration::minutes(URGENT_MATCHING_MINUTES),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// First instant strictly after `after` whose local wall clock reads `slot`.
    pub fn next_occurrence(&self, slot: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, SlotError> {
        let time = parse_time_of_day(slot)?;
        let start = after.with_timezone(&self.tz).date_naive();

        start
            .iter_days()
            .take(3)
            .filter_map(|date| self.localize(date.and_time(time)))
            .find(|candidate| *candidate > after)
            .ok_or_else(|| SlotError::Unresolvable {
                slot: slot.to_string(),
                tz: self.tz,
                after,
            })
    }

    pub fn time_until(&self, slot: &str, now: DateTime<Utc>) -> Result<Duration, SlotError> {
        Ok(self.next_occurrence(slot, now)? - now)
    }

    /// True when the slot is close enough that no new matches may be made.
    pub fn is_too_close_to_break(&self, slot: &str, now: DateTime<Utc>) -> Result<bool, SlotError> {
        Ok(self.time_until(slot, now)? <= self.too_close)
    }

    /// True when the slot is close enough that matching is forced.
    pub fn is_urgent_matching(&self, slot: &str, now: DateTime<Utc>) -> Result<bool, SlotError> {
        Ok(self.time_until(slot, now)? <= self.urgent)
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        // Wall-clock times skipped by a DST jump resolve to an hour later.
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| self.tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
            .map(|local| local.with_timezone(&Utc))
    }
}
