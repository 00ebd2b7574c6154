/// Tail limit used when a channel view is opened without a known backlog size.
pub const DEFAULT_BACKLOG_LIMIT: usize = 25;

/// Longest delay (seconds) before the loading indicator is dismissed.
pub const LOADING_STOP_CAP_SECS: f64 = 0.75;

/// Backlog size is divided by this to get the dismissal delay in seconds.
pub const LOADING_STOP_DIVISOR: f64 = 32.0;

/// Root collection holding every live channel.
pub const CHANNELS_PATH: &str = "channels";

/// Child path of a channel holding its ordered message log.
pub const MESSAGES_PATH: &str = "messages";

/// Child path of a channel holding the typing presence map.
pub const TYPING_PATH: &str = "typingIndicator";

/// Wire field names of a message record.
pub const FIELD_UID: &str = "uid";
pub const FIELD_TEXT: &str = "text";
pub const FIELD_DATE: &str = "date";
