//! What the synchronization core needs from a realtime database.
//!
//! Each trait covers one collaborator: the ordered append log holding a
//! channel's messages, the per-channel presence map, the collection of live
//! channel ids, and the user directory. Subscriptions push into unbounded
//! tokio channels and stay open until their [`SubscriptionHandle`] is revoked
//! or dropped.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use huddle_shared::timekey::TimeKey;
use huddle_shared::types::{ChannelId, LogKey, ParticipantId};

use crate::error::Result;
use crate::models::LogEntry;

// ---------------------------------------------------------------------------
// Subscription plumbing
// ---------------------------------------------------------------------------

/// Revocation handle for an open subscription.
///
/// Revoking (explicitly or by dropping the handle) stops delivery and closes
/// the event stream.
pub struct SubscriptionHandle {
    revoke: Option<Box<dyn FnOnce() + Send + Sync + 'static>>,
}

impl SubscriptionHandle {
    pub fn new(revoke: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            revoke: Some(Box::new(revoke)),
        }
    }

    /// A handle with nothing to revoke.
    pub fn detached() -> Self {
        Self { revoke: None }
    }

    pub fn revoke(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.revoke.is_some())
            .finish()
    }
}

/// Events pushed by a log subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// An entry was appended (or replayed as part of the backlog).
    Added(LogEntry),
}

/// An open tail subscription on a message log.
#[derive(Debug)]
pub struct LogSubscription {
    /// Number of existing entries replayed at the head of `events`.
    pub backlog: usize,
    pub events: mpsc::UnboundedReceiver<LogEvent>,
    pub handle: SubscriptionHandle,
}

/// The participants whose presence flag matches a subscription's filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub participants: Vec<ParticipantId>,
}

impl PresenceSnapshot {
    pub fn new(participants: Vec<ParticipantId>) -> Self {
        Self { participants }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// An open value-filtered subscription on a presence map. The current
/// snapshot is delivered first, then one snapshot per change.
#[derive(Debug)]
pub struct PresenceSubscription {
    pub snapshots: mpsc::UnboundedReceiver<PresenceSnapshot>,
    pub handle: SubscriptionHandle,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// One-shot reads of the `channels` collection.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn channel_ids(&self) -> Result<HashSet<ChannelId>>;
}

/// Resolves message senders to display names.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn display_name(&self, uid: &ParticipantId) -> Result<Option<String>>;
}

/// A channel's ordered append log.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Replay the last `limit` entries, then push every later addition.
    async fn subscribe_tail(&self, channel: &ChannelId, limit: usize) -> Result<LogSubscription>;

    /// A fresh key that orders after every key already generated.
    fn generate_key(&self, channel: &ChannelId) -> LogKey;

    /// The backend's notion of "now" for stamping new entries.
    fn server_timestamp(&self) -> TimeKey;

    async fn write(&self, channel: &ChannelId, key: &LogKey, payload: Value) -> Result<()>;
}

/// A channel's participant -> bool presence map.
#[async_trait]
pub trait PresenceMap: Send + Sync {
    async fn set(&self, channel: &ChannelId, participant: &ParticipantId, value: bool) -> Result<()>;

    /// Ask the backend to delete `participant`'s entry if this connection
    /// goes away without cleaning up.
    async fn remove_on_disconnect(&self, channel: &ChannelId, participant: &ParticipantId)
        -> Result<()>;

    /// Subscribe to the participants whose flag equals `value`.
    async fn subscribe_equal_to(&self, channel: &ChannelId, value: bool)
        -> Result<PresenceSubscription>;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn handle_revokes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = SubscriptionHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.revoke();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_handle_revokes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _handle = SubscriptionHandle::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(SubscriptionHandle::detached());
    }
}
