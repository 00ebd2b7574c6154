use thiserror::Error;

use huddle_store::StoreError;

/// Failures surfaced by the synchronization core.
///
/// Malformed log events and senders without a display name are not errors:
/// they are dropped where they are detected.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The channel was deleted; the UI is expected to unwind.
    #[error("This channel does not exist anymore")]
    ChannelGone,

    #[error("Cannot send an empty message")]
    EmptyMessage,

    /// Subscribe, write or lookup failure reported by the backend.
    #[error("Backend error: {0}")]
    Store(#[from] StoreError),

    #[error("Chat session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
