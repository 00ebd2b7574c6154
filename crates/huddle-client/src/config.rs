//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so a session can be opened with zero
//! configuration.

use chrono::{FixedOffset, Offset, Utc};

use huddle_shared::constants::DEFAULT_BACKLOG_LIMIT;

/// Capacity of the UI event channel unless overridden.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Chat client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Offset used to bucket messages into days and label day headers.
    /// Env: `HUDDLE_HEADER_UTC_OFFSET` (seconds east of UTC)
    /// Default: UTC
    pub header_offset: FixedOffset,

    /// Capacity of the channel carrying [`ChatEvent`]s to the UI.
    /// Env: `HUDDLE_EVENT_BUFFER`
    /// Default: `256`
    ///
    /// [`ChatEvent`]: crate::events::ChatEvent
    pub event_buffer: usize,

    /// Tail limit used when a session is opened with a backlog size of 0.
    /// Env: `HUDDLE_DEFAULT_BACKLOG`
    /// Default: `25`
    pub default_backlog: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            header_offset: Utc.fix(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            default_backlog: DEFAULT_BACKLOG_LIMIT,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Invalid values are
    /// logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("HUDDLE_HEADER_UTC_OFFSET") {
            match val.trim().parse::<i32>().ok().and_then(FixedOffset::east_opt) {
                Some(offset) => config.header_offset = offset,
                None => tracing::warn!(
                    value = %val,
                    "Invalid HUDDLE_HEADER_UTC_OFFSET, using UTC"
                ),
            }
        }

        if let Some(val) = lookup("HUDDLE_EVENT_BUFFER") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.event_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid HUDDLE_EVENT_BUFFER, using default"),
            }
        }

        if let Some(val) = lookup("HUDDLE_DEFAULT_BACKLOG") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.default_backlog = n,
                _ => tracing::warn!(value = %val, "Invalid HUDDLE_DEFAULT_BACKLOG, using default"),
            }
        }

        config
    }
}
