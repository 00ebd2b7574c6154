//! Domain model structs persisted by the local realtime backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use huddle_shared::types::{ChannelId, LogKey, ParticipantId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A directory entry used to resolve message senders to display names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub uid: ParticipantId,
    /// `None` while the user has not completed their profile.
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A conversation channel. Its presence under `channels` is what the
/// liveness gate checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    /// Human-readable channel name.
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// One entry of a channel's message log, exactly as written. The payload is
/// not validated by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub key: LogKey,
    pub payload: Value,
}
