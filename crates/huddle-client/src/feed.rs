//! The locally ordered message collection shown in a channel view.
//!
//! Insertion order is whatever order identity lookups happen to complete in,
//! so the feed re-sorts by [`TimeKey`] after every mutation. The sort is
//! stable: messages sharing a timestamp keep their arrival order.

use std::cmp::Ordering;

use chrono::FixedOffset;
use serde::Serialize;

use huddle_shared::timekey::TimeKey;
use huddle_shared::types::{LogKey, ParticipantId};

/// A received message with its sender resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub key: LogKey,
    pub sender_id: ParticipantId,
    pub sender_display_name: String,
    pub text: String,
    pub timestamp: TimeKey,
}

impl ChatMessage {
    /// Whether `participant` wrote this message (outgoing bubble).
    pub fn is_from(&self, participant: &ParticipantId) -> bool {
        &self.sender_id == participant
    }
}

/// A message plus the day header to draw above it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub message: ChatMessage,
    pub day_header: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct MessageFeed {
    messages: Vec<ChatMessage>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message and restore timestamp order.
    pub fn insert(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.messages.sort_by(|a, b| a.timestamp.compare(&b.timestamp));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The first message of the feed and the first message of every later
    /// day start a new day group.
    pub fn starts_day(&self, index: usize, offset: &FixedOffset) -> bool {
        match index {
            0 => !self.messages.is_empty(),
            i if i < self.messages.len() => {
                let current = &self.messages[i].timestamp;
                let previous = &self.messages[i - 1].timestamp;
                current.day_cmp(previous, offset) == Ordering::Greater
            }
            _ => false,
        }
    }

    /// Header label for the message at `index`, if it starts a day group.
    pub fn day_header(&self, index: usize, offset: &FixedOffset) -> Option<String> {
        self.starts_day(index, offset)
            .then(|| self.messages[index].timestamp.format_channel_header(offset))
    }

    /// Snapshot of the feed with day headers resolved.
    pub fn entries(&self, offset: &FixedOffset) -> Vec<FeedEntry> {
        (0..self.messages.len())
            .map(|i| FeedEntry {
                message: self.messages[i].clone(),
                day_header: self.day_header(i, offset),
            })
            .collect()
    }
}
