use huddle_shared::types::{ChannelId, ParticipantId};

/// Identity and channel a chat session runs for, injected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// The local participant; owner of outgoing messages and of the local
    /// presence entry.
    pub sender_id: ParticipantId,
    pub sender_display_name: String,
    pub channel_id: ChannelId,
    /// Shown by the UI as the view title.
    pub channel_name: String,
}

impl SessionContext {
    pub fn new(
        sender_id: ParticipantId,
        sender_display_name: impl Into<String>,
        channel_id: ChannelId,
        channel_name: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            sender_display_name: sender_display_name.into(),
            channel_id,
            channel_name: channel_name.into(),
        }
    }
}
