use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CHANNELS_PATH, MESSAGES_PATH, TYPING_PATH};

/// Opaque channel identifier as stored under the `channels` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the channel's ordered message log.
    pub fn messages_path(&self) -> String {
        format!("{CHANNELS_PATH}/{}/{MESSAGES_PATH}", self.0)
    }

    /// Path of the channel's typing presence map.
    pub fn typing_path(&self) -> String {
        format!("{CHANNELS_PATH}/{}/{TYPING_PATH}", self.0)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Participant identity = the auth provider's opaque uid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of one entry in a channel's message log.
///
/// Generated keys are UUIDv7 strings, so lexical order follows creation
/// order. Keys received from a backend are kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct LogKey(pub String);

impl LogKey {
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_paths() {
        let channel = ChannelId::new("general");
        assert_eq!(channel.messages_path(), "channels/general/messages");
        assert_eq!(channel.typing_path(), "channels/general/typingIndicator");
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let first = LogKey::generate();
        let second = LogKey::generate();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 32);
    }
}
