//! Folds a channel's message log into the local feed.
//!
//! The synchronizer is driven one event at a time:
//!
//! 1. [`MessageSynchronizer::on_added`] validates the pushed payload and
//!    admits it as a [`PendingLookup`] for the sender's display name, or
//!    drops it (malformed, already seen, or closed). A dropped entry from
//!    the replayed backlog is no longer waited for.
//! 2. The caller resolves the name through a [`UserDirectory`], possibly
//!    racing other lookups.
//! 3. [`MessageSynchronizer::on_resolved`] inserts the message (when a name
//!    was found) and counts it against the backlog.
//!
//! Lookups may complete in any order; the feed's sort keeps display order
//! correct regardless.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info};

use huddle_shared::protocol::{MessageRecord, Parsed};
use huddle_shared::types::{ChannelId, LogKey};
use huddle_store::{LogEvent, LogSubscription, MessageLog, SubscriptionHandle, UserDirectory};

use crate::backlog::BacklogCounter;
use crate::error::Result;
use crate::feed::{ChatMessage, MessageFeed};

/// Tail limit for a requested backlog size; 0 means "use the default".
pub fn effective_limit(backlog_size: usize, default_limit: usize) -> usize {
    if backlog_size == 0 {
        default_limit
    } else {
        backlog_size
    }
}

/// A validated log entry waiting for its sender's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLookup {
    pub key: LogKey,
    pub record: MessageRecord,
}

impl PendingLookup {
    pub async fn resolve(&self, users: &dyn UserDirectory) -> Result<Option<String>> {
        Ok(users.display_name(&self.record.sender()).await?)
    }
}

/// Outcome of [`MessageSynchronizer::on_added`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Valid and new: resolve the sender next.
    Lookup(PendingLookup),
    /// Dropped. Carries the loading-dismissal delay when dropping a replayed
    /// entry was the last thing the backlog waited for.
    Dropped(Option<Duration>),
}

impl Admission {
    pub fn into_lookup(self) -> Option<PendingLookup> {
        match self {
            Admission::Lookup(lookup) => Some(lookup),
            Admission::Dropped(_) => None,
        }
    }
}

/// What a completed lookup changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// A message was added to the feed.
    pub inserted: bool,
    /// One receive cycle finished (emitted whether or not a name was found).
    pub cycle_finished: bool,
    /// Set on the lookup that drained the backlog: dismiss the loading
    /// indicator after this delay.
    pub loading_done: Option<Duration>,
}

pub struct MessageSynchronizer {
    channel_id: ChannelId,
    limit: usize,
    feed: MessageFeed,
    backlog: BacklogCounter,
    /// Replayed entries not yet seen by `on_added`.
    replaying: usize,
    seen: HashSet<LogKey>,
    handle: Option<SubscriptionHandle>,
    closed: bool,
}

impl MessageSynchronizer {
    pub fn new(channel_id: ChannelId, limit: usize) -> Self {
        Self {
            channel_id,
            limit,
            feed: MessageFeed::new(),
            backlog: BacklogCounter::new(limit),
            replaying: 0,
            seen: HashSet::new(),
            handle: None,
            closed: false,
        }
    }

    /// Open the tail-limited subscription on the channel's message log.
    pub async fn subscribe(
        log: &dyn MessageLog,
        channel_id: &ChannelId,
        limit: usize,
    ) -> Result<LogSubscription> {
        info!(path = %channel_id.messages_path(), limit, "Opening message stream");
        Ok(log.subscribe_tail(channel_id, limit).await?)
    }

    /// Take ownership of an opened subscription's handle. Returns whether the
    /// backlog is still loading. A subscription that arrives after
    /// [`close`](Self::close) is revoked on the spot.
    pub fn attach(&mut self, handle: SubscriptionHandle, backlog: usize) -> bool {
        if self.closed {
            handle.revoke();
            return false;
        }
        self.backlog.clamp_to(backlog);
        self.replaying = backlog;
        self.handle = Some(handle);
        self.backlog.is_loading()
    }

    pub fn on_added(&mut self, event: LogEvent) -> Admission {
        if self.closed {
            return Admission::Dropped(None);
        }
        let LogEvent::Added(entry) = event;
        let replayed = self.replaying > 0;
        self.replaying = self.replaying.saturating_sub(1);

        if self.seen.contains(&entry.key) {
            debug!(channel = %self.channel_id, key = %entry.key, "Dropping re-delivered entry");
            return self.drop_entry(replayed);
        }

        match MessageRecord::parse(&entry.payload) {
            Parsed::Valid(record) => {
                self.seen.insert(entry.key.clone());
                Admission::Lookup(PendingLookup {
                    key: entry.key,
                    record,
                })
            }
            Parsed::Malformed(reason) => {
                debug!(
                    channel = %self.channel_id,
                    key = %entry.key,
                    reason = %reason,
                    "Dropping malformed entry"
                );
                self.drop_entry(replayed)
            }
        }
    }

    // Dropped entries never count as handled, but a replayed one is no
    // longer expected.
    fn drop_entry(&mut self, replayed: bool) -> Admission {
        Admission::Dropped(if replayed { self.backlog.shrink() } else { None })
    }

    pub fn on_resolved(&mut self, lookup: PendingLookup, name: Option<String>) -> Resolution {
        if self.closed {
            debug!(channel = %self.channel_id, key = %lookup.key, "Ignoring lookup after close");
            return Resolution::default();
        }

        let inserted = match name {
            Some(sender_display_name) => {
                self.feed.insert(ChatMessage {
                    sender_id: lookup.record.sender(),
                    sender_display_name,
                    timestamp: lookup.record.timestamp(),
                    text: lookup.record.text,
                    key: lookup.key,
                });
                true
            }
            None => {
                debug!(
                    channel = %self.channel_id,
                    key = %lookup.key,
                    uid = %lookup.record.uid,
                    "Dropping message from unresolved sender"
                );
                false
            }
        };

        Resolution {
            inserted,
            cycle_finished: true,
            loading_done: self.backlog.record(),
        }
    }

    /// Stop accepting events and revoke the subscription.
    pub fn close(&mut self) {
        self.closed = true;
        if let Some(handle) = self.handle.take() {
            handle.revoke();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn feed(&self) -> &MessageFeed {
        &self.feed
    }

    pub fn backlog(&self) -> &BacklogCounter {
        &self.backlog
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::*;
    use crate::backlog::stop_delay;
    use huddle_store::LogEntry;

    fn added(key: &str, payload: Value) -> LogEvent {
        LogEvent::Added(LogEntry {
            key: LogKey(key.into()),
            payload,
        })
    }

    fn valid(key: &str, uid: &str, date: i64) -> LogEvent {
        added(key, json!({ "uid": uid, "text": format!("msg {key}"), "date": date }))
    }

    fn new_sync(limit: usize) -> MessageSynchronizer {
        MessageSynchronizer::new(ChannelId::new("general"), limit)
    }

    #[test]
    fn effective_limit_defaults_on_zero() {
        assert_eq!(effective_limit(0, 25), 25);
        assert_eq!(effective_limit(10, 25), 10);
        assert_eq!(effective_limit(40, 25), 40);
    }

    #[test]
    fn out_of_order_resolution_stays_sorted() {
        let mut sync = new_sync(4);
        let lookups: Vec<_> = [("a", 40), ("b", 10), ("c", 30), ("d", 20)]
            .into_iter()
            .map(|(key, date)| sync.on_added(valid(key, "u1", date)).into_lookup().unwrap())
            .collect();

        // Resolve in an order unrelated to delivery or timestamp.
        for i in [2, 0, 3, 1] {
            let res = sync.on_resolved(lookups[i].clone(), Some("U1".into()));
            assert!(res.inserted);
            assert!(res.cycle_finished);
            let stamps: Vec<_> = sync.feed().messages().iter().map(|m| m.timestamp).collect();
            let mut sorted = stamps.clone();
            sorted.sort();
            assert_eq!(stamps, sorted);
        }

        let keys: Vec<_> = sync.feed().messages().iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["b", "d", "c", "a"]);
    }

    #[test]
    fn malformed_events_do_not_count() {
        let mut sync = new_sync(2);
        assert!(sync.on_added(added("bad1", json!({ "text": "no uid", "date": 1 }))).into_lookup().is_none());
        assert!(sync.on_added(added("bad2", json!(null))).into_lookup().is_none());

        let first = sync.on_added(valid("k1", "u1", 1)).into_lookup().unwrap();
        assert_eq!(sync.on_resolved(first, Some("U1".into())).loading_done, None);
        assert_eq!(sync.backlog().remaining(), 1);

        assert!(sync.on_added(added("bad3", json!({ "uid": "u", "text": 3, "date": 2 }))).into_lookup().is_none());
        let second = sync.on_added(valid("k2", "u1", 2)).into_lookup().unwrap();
        assert_eq!(
            sync.on_resolved(second, Some("U1".into())).loading_done,
            Some(stop_delay(2))
        );
    }

    #[test]
    fn unresolved_sender_is_dropped_but_counted() {
        let mut sync = new_sync(2);
        let ghost = sync.on_added(valid("k1", "ghost", 1)).into_lookup().unwrap();
        let res = sync.on_resolved(ghost, None);
        assert!(!res.inserted);
        assert!(res.cycle_finished);
        assert!(sync.feed().is_empty());
        assert_eq!(sync.backlog().remaining(), 1);

        let known = sync.on_added(valid("k2", "u1", 2)).into_lookup().unwrap();
        let res = sync.on_resolved(known, Some("U1".into()));
        assert!(res.inserted);
        assert_eq!(res.loading_done, Some(stop_delay(2)));
    }

    #[test]
    fn redelivered_key_is_ignored() {
        let mut sync = new_sync(3);
        let first = sync.on_added(valid("k1", "u1", 1)).into_lookup().unwrap();
        assert!(sync.on_added(valid("k1", "u1", 1)).into_lookup().is_none());
        sync.on_resolved(first, Some("U1".into()));
        assert!(sync.on_added(valid("k1", "u1", 1)).into_lookup().is_none());

        assert_eq!(sync.feed().len(), 1);
        assert_eq!(sync.backlog().remaining(), 2);
    }

    #[test]
    fn counter_drains_after_limit_events() {
        let mut sync = new_sync(25);
        let mut done = Vec::new();
        for i in 0..25 {
            let lookup = sync.on_added(valid(&format!("k{i}"), "u1", i)).into_lookup().unwrap();
            done.push(sync.on_resolved(lookup, Some("U1".into())).loading_done);
        }
        assert!(done[..24].iter().all(Option::is_none));
        assert_eq!(done[24], Some(Duration::from_secs_f64(0.75)));
        assert_eq!(sync.backlog().remaining(), 0);
    }

    #[test]
    fn close_revokes_and_ignores_stale_completions() {
        let revoked = Arc::new(AtomicBool::new(false));
        let flag = revoked.clone();

        let mut sync = new_sync(5);
        assert!(sync.attach(SubscriptionHandle::new(move || flag.store(true, Ordering::SeqCst)), 5));
        let pending = sync.on_added(valid("k1", "u1", 1)).into_lookup().unwrap();

        sync.close();
        assert!(sync.is_closed());
        assert!(revoked.load(Ordering::SeqCst));

        assert_eq!(sync.on_resolved(pending, Some("U1".into())), Resolution::default());
        assert!(sync.on_added(valid("k2", "u1", 2)).into_lookup().is_none());
        assert!(sync.feed().is_empty());
    }

    #[test]
    fn dropped_replay_entries_shrink_the_backlog() {
        let mut sync = new_sync(25);
        assert!(sync.attach(SubscriptionHandle::detached(), 4));

        let first = sync.on_added(valid("k1", "u1", 1)).into_lookup().unwrap();
        let second = sync.on_added(valid("k2", "u1", 2)).into_lookup().unwrap();
        assert_eq!(sync.on_added(valid("k1", "u1", 1)), Admission::Dropped(None));
        assert_eq!(sync.backlog().total(), 3);

        assert_eq!(sync.on_resolved(first, Some("U1".into())).loading_done, None);
        assert_eq!(sync.on_resolved(second, Some("U1".into())).loading_done, None);

        // The last replayed entry is malformed: nothing is left to wait for.
        assert_eq!(
            sync.on_added(added("bad", json!({ "uid": "bob", "text": 5, "date": 9 }))),
            Admission::Dropped(Some(stop_delay(2)))
        );
        assert!(!sync.backlog().is_loading());

        // Live entries after the replay never touch the counter.
        assert_eq!(sync.on_added(added("bad2", json!(null))), Admission::Dropped(None));
        assert_eq!(sync.backlog().total(), 2);
    }

    #[test]
    fn attach_clamps_backlog_to_replayed_entries() {
        let mut sync = new_sync(25);
        assert!(!sync.attach(SubscriptionHandle::detached(), 0));

        let mut sync = new_sync(25);
        assert!(sync.attach(SubscriptionHandle::detached(), 3));
        assert_eq!(sync.backlog().total(), 3);
        assert_eq!(sync.limit(), 25);
    }
}
