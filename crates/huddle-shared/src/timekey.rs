//! Server-assigned message time.
//!
//! A [`TimeKey`] wraps the integer the backend stamps on every message
//! (milliseconds since the Unix epoch). Sorting uses the full precision of
//! that integer; day grouping and header labels work at calendar-day
//! granularity in a channel-local UTC offset.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Header label layout, e.g. `Thu, 14 Sep 2017`.
const CHANNEL_HEADER_FORMAT: &str = "%a, %d %b %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeKey(i64);

impl TimeKey {
    /// Build a key from a server timestamp (Unix epoch millis).
    pub fn from_timestamp(millis: i64) -> Self {
        Self(millis)
    }

    /// Build a key from a calendar date-time.
    pub fn from_datetime(date: DateTime<Utc>) -> Self {
        Self(date.timestamp_millis())
    }

    /// Key for the current wall-clock instant.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// The raw ordinal written to the `date` field of a message record.
    pub fn timestamp(&self) -> i64 {
        self.0
    }

    /// Calendar date-time of this key. Ordinals outside chrono's range
    /// collapse to the Unix epoch.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Full-precision comparison, as used for feed ordering.
    pub fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }

    /// Calendar day of this key as seen from `offset`.
    pub fn local_date(&self, offset: &FixedOffset) -> NaiveDate {
        self.to_datetime().with_timezone(offset).date_naive()
    }

    /// Day-granularity comparison in the channel-local offset.
    pub fn day_cmp(&self, other: &Self, offset: &FixedOffset) -> Ordering {
        self.local_date(offset).cmp(&other.local_date(offset))
    }

    /// Label shown above the first message of each day in a channel feed.
    pub fn format_channel_header(&self, offset: &FixedOffset) -> String {
        self.to_datetime()
            .with_timezone(offset)
            .format(CHANNEL_HEADER_FORMAT)
            .to_string()
    }
}

impl From<DateTime<Utc>> for TimeKey {
    fn from(date: DateTime<Utc>) -> Self {
        Self::from_datetime(date)
    }
}
