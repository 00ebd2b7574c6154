//! In-process realtime backend.
//!
//! [`Realtime`] owns the SQLite [`Database`] and a registry of live
//! subscriptions behind one mutex. Every write goes through the registry, so
//! subscribers see additions in exactly the order they were committed. Clients
//! talk to it through a [`Connection`], which also carries the
//! on-disconnect directives registered by that client.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use huddle_shared::timekey::TimeKey;
use huddle_shared::types::{ChannelId, LogKey, ParticipantId};

use crate::backend::{
    ChannelDirectory, LogEvent, LogSubscription, MessageLog, PresenceMap, PresenceSnapshot,
    PresenceSubscription, SubscriptionHandle, UserDirectory,
};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Channel, LogEntry, User};

// ---------------------------------------------------------------------------
// Subscription registry
// ---------------------------------------------------------------------------

struct LogWatcher {
    id: u64,
    tx: mpsc::UnboundedSender<LogEvent>,
}

struct PresenceWatcher {
    id: u64,
    value: bool,
    tx: mpsc::UnboundedSender<PresenceSnapshot>,
}

struct Hub {
    db: Database,
    next_id: u64,
    log_watchers: HashMap<ChannelId, Vec<LogWatcher>>,
    presence_watchers: HashMap<ChannelId, Vec<PresenceWatcher>>,
    /// Presence entries to delete when a connection goes away, by connection id.
    on_disconnect: HashMap<u64, Vec<(ChannelId, ParticipantId)>>,
}

impl Hub {
    fn new(db: Database) -> Self {
        Self {
            db,
            next_id: 1,
            log_watchers: HashMap::new(),
            presence_watchers: HashMap::new(),
            on_disconnect: HashMap::new(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn publish_entry(&mut self, channel: &ChannelId, entry: &LogEntry) {
        if let Some(watchers) = self.log_watchers.get_mut(channel) {
            watchers.retain(|w| w.tx.send(LogEvent::Added(entry.clone())).is_ok());
        }
    }

    fn publish_presence(&mut self, channel: &ChannelId) -> Result<()> {
        let Some(watchers) = self.presence_watchers.get_mut(channel) else {
            return Ok(());
        };
        if watchers.is_empty() {
            return Ok(());
        }

        let typing = self.db.participants_with(channel, true)?;
        let idle = self.db.participants_with(channel, false)?;

        watchers.retain(|w| {
            let participants = if w.value { typing.clone() } else { idle.clone() };
            w.tx.send(PresenceSnapshot::new(participants)).is_ok()
        });
        Ok(())
    }

    fn remove_log_watcher(&mut self, channel: &ChannelId, id: u64) {
        if let Some(watchers) = self.log_watchers.get_mut(channel) {
            watchers.retain(|w| w.id != id);
        }
    }

    fn remove_presence_watcher(&mut self, channel: &ChannelId, id: u64) {
        if let Some(watchers) = self.presence_watchers.get_mut(channel) {
            watchers.retain(|w| w.id != id);
        }
    }

    fn run_disconnect(&mut self, connection: u64) -> Result<()> {
        let directives = self.on_disconnect.remove(&connection).unwrap_or_default();
        for (channel, participant) in directives {
            if self.db.remove_presence(&channel, &participant)? {
                debug!(
                    connection,
                    channel = %channel,
                    participant = %participant,
                    "Removed presence entry on disconnect"
                );
                self.publish_presence(&channel)?;
            }
        }
        Ok(())
    }
}

fn lock(hub: &Mutex<Hub>) -> Result<MutexGuard<'_, Hub>> {
    hub.lock().map_err(|_| StoreError::Poisoned)
}

/// Strictly increasing millisecond clock shared by all connections.
fn next_timestamp(clock: &AtomicI64) -> TimeKey {
    let now = Utc::now().timestamp_millis();
    let prev = clock
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    TimeKey::from_timestamp(now.max(prev + 1))
}

// ---------------------------------------------------------------------------
// Realtime
// ---------------------------------------------------------------------------

/// A realtime database rooted in one SQLite file (or in memory).
#[derive(Clone)]
pub struct Realtime {
    hub: Arc<Mutex<Hub>>,
    clock: Arc<AtomicI64>,
}

impl Realtime {
    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub::new(db))),
            clock: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Open a client connection.
    pub fn connect(&self) -> Result<Connection> {
        let id = lock(&self.hub)?.next_id();
        info!(connection = id, "Client connected");
        Ok(Connection {
            id,
            hub: self.hub.clone(),
            clock: self.clock.clone(),
            connected: AtomicBool::new(true),
        })
    }

    pub fn create_channel(&self, channel: &Channel) -> Result<()> {
        lock(&self.hub)?.db.create_channel(channel)?;
        info!(channel = %channel.id, name = %channel.name, "Channel created");
        Ok(())
    }

    /// Delete a channel with its log and presence map. Presence subscribers
    /// receive an empty snapshot; log subscribers simply stop receiving.
    pub fn delete_channel(&self, id: &ChannelId) -> Result<bool> {
        let mut hub = lock(&self.hub)?;
        let deleted = hub.db.delete_channel(id)?;
        if deleted {
            hub.publish_presence(id)?;
            info!(channel = %id, "Channel deleted");
        }
        Ok(deleted)
    }

    pub fn upsert_user(&self, user: &User) -> Result<()> {
        lock(&self.hub)?.db.upsert_user(user)
    }

    /// Run an ad-hoc read against the underlying database.
    pub fn with_database<R>(&self, f: impl FnOnce(&Database) -> Result<R>) -> Result<R> {
        let hub = lock(&self.hub)?;
        f(&hub.db)
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// One client's view of a [`Realtime`] backend.
///
/// Dropping the connection without calling [`Connection::disconnect`] still
/// runs its on-disconnect directives, like a socket timing out server side.
pub struct Connection {
    id: u64,
    hub: Arc<Mutex<Hub>>,
    clock: Arc<AtomicI64>,
    connected: AtomicBool,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the connection and run its on-disconnect directives.
    pub fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!(connection = self.id, "Client disconnected");
        lock(&self.hub)?.run_disconnect(self.id)
    }

    fn hub(&self) -> Result<MutexGuard<'_, Hub>> {
        if !self.is_connected() {
            return Err(StoreError::Disconnected(self.id));
        }
        lock(&self.hub)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!(connection = self.id, error = %e, "Failed to run disconnect directives");
        }
    }
}

#[async_trait]
impl ChannelDirectory for Connection {
    async fn channel_ids(&self) -> Result<HashSet<ChannelId>> {
        self.hub()?.db.channel_ids()
    }
}

#[async_trait]
impl UserDirectory for Connection {
    async fn display_name(&self, uid: &ParticipantId) -> Result<Option<String>> {
        self.hub()?.db.display_name(uid)
    }
}

#[async_trait]
impl MessageLog for Connection {
    async fn subscribe_tail(&self, channel: &ChannelId, limit: usize) -> Result<LogSubscription> {
        let mut hub = self.hub()?;
        let entries = hub.db.tail_entries(channel, limit)?;
        let backlog = entries.len();

        let (tx, rx) = mpsc::unbounded_channel();
        for entry in entries {
            let _ = tx.send(LogEvent::Added(entry));
        }

        let id = hub.next_id();
        hub.log_watchers
            .entry(channel.clone())
            .or_default()
            .push(LogWatcher { id, tx });
        drop(hub);

        debug!(
            connection = self.id,
            path = %channel.messages_path(),
            limit,
            backlog,
            "Log subscription opened"
        );

        let registry = Arc::downgrade(&self.hub);
        let channel = channel.clone();
        let handle = SubscriptionHandle::new(move || {
            if let Some(hub) = registry.upgrade() {
                if let Ok(mut hub) = hub.lock() {
                    hub.remove_log_watcher(&channel, id);
                }
            }
        });

        Ok(LogSubscription {
            backlog,
            events: rx,
            handle,
        })
    }

    fn generate_key(&self, _channel: &ChannelId) -> LogKey {
        LogKey::generate()
    }

    fn server_timestamp(&self) -> TimeKey {
        next_timestamp(&self.clock)
    }

    async fn write(&self, channel: &ChannelId, key: &LogKey, payload: Value) -> Result<()> {
        let mut hub = self.hub()?;
        hub.db.append_entry(channel, key, &payload)?;

        debug!(path = %channel.messages_path(), key = %key, "Log entry written");

        let entry = LogEntry {
            key: key.clone(),
            payload,
        };
        hub.publish_entry(channel, &entry);
        Ok(())
    }
}

#[async_trait]
impl PresenceMap for Connection {
    async fn set(&self, channel: &ChannelId, participant: &ParticipantId, value: bool) -> Result<()> {
        let mut hub = self.hub()?;
        hub.db.set_presence(channel, participant, value)?;
        hub.publish_presence(channel)
    }

    async fn remove_on_disconnect(
        &self,
        channel: &ChannelId,
        participant: &ParticipantId,
    ) -> Result<()> {
        let mut hub = self.hub()?;
        let directives = hub.on_disconnect.entry(self.id).or_default();
        let directive = (channel.clone(), participant.clone());
        if !directives.contains(&directive) {
            directives.push(directive);
        }
        debug!(
            connection = self.id,
            path = %channel.typing_path(),
            participant = %participant,
            "Registered remove-on-disconnect"
        );
        Ok(())
    }

    async fn subscribe_equal_to(
        &self,
        channel: &ChannelId,
        value: bool,
    ) -> Result<PresenceSubscription> {
        let mut hub = self.hub()?;
        let current = hub.db.participants_with(channel, value)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(PresenceSnapshot::new(current));

        let id = hub.next_id();
        hub.presence_watchers
            .entry(channel.clone())
            .or_default()
            .push(PresenceWatcher { id, value, tx });
        drop(hub);

        let registry = Arc::downgrade(&self.hub);
        let channel = channel.clone();
        let handle = SubscriptionHandle::new(move || {
            if let Some(hub) = registry.upgrade() {
                if let Ok(mut hub) = hub.lock() {
                    hub.remove_presence_watcher(&channel, id);
                }
            }
        });

        Ok(PresenceSubscription {
            snapshots: rx,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn setup() -> (Realtime, ChannelId) {
        let realtime = Realtime::open_in_memory().unwrap();
        let channel = ChannelId::new("general");
        realtime
            .create_channel(&Channel::new(channel.clone(), "General"))
            .unwrap();
        (realtime, channel)
    }

    fn added_key(event: LogEvent) -> String {
        match event {
            LogEvent::Added(entry) => entry.key.0,
        }
    }

    #[tokio::test]
    async fn tail_subscription_replays_then_pushes() {
        let (realtime, channel) = setup();
        let conn = realtime.connect().unwrap();
        for i in 0..4 {
            conn.write(&channel, &LogKey(format!("k{i}")), json!({ "n": i }))
                .await
                .unwrap();
        }

        let mut sub = conn.subscribe_tail(&channel, 2).await.unwrap();
        assert_eq!(sub.backlog, 2);
        assert_eq!(added_key(sub.events.recv().await.unwrap()), "k2");
        assert_eq!(added_key(sub.events.recv().await.unwrap()), "k3");

        let other = realtime.connect().unwrap();
        other
            .write(&channel, &LogKey("k4".into()), json!({ "n": 4 }))
            .await
            .unwrap();
        assert_eq!(added_key(sub.events.recv().await.unwrap()), "k4");
    }

    #[tokio::test]
    async fn revoked_subscription_closes_stream() {
        let (realtime, channel) = setup();
        let conn = realtime.connect().unwrap();
        let LogSubscription { mut events, handle, .. } =
            conn.subscribe_tail(&channel, 25).await.unwrap();

        handle.revoke();
        conn.write(&channel, &LogKey("late".into()), json!({}))
            .await
            .unwrap();
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn presence_snapshots_follow_changes() {
        let (realtime, channel) = setup();
        let alice = realtime.connect().unwrap();
        let bob = realtime.connect().unwrap();
        let alice_id = ParticipantId::new("alice");
        let bob_id = ParticipantId::new("bob");

        let mut sub = alice.subscribe_equal_to(&channel, true).await.unwrap();
        assert!(sub.snapshots.recv().await.unwrap().is_empty());

        bob.set(&channel, &bob_id, true).await.unwrap();
        assert_eq!(sub.snapshots.recv().await.unwrap().participants, vec![bob_id.clone()]);

        alice.set(&channel, &alice_id, true).await.unwrap();
        assert_eq!(sub.snapshots.recv().await.unwrap().len(), 2);

        bob.set(&channel, &bob_id, false).await.unwrap();
        let snapshot = sub.snapshots.recv().await.unwrap();
        assert_eq!(snapshot.participants, vec![alice_id]);
    }

    #[tokio::test]
    async fn disconnect_removes_registered_presence() {
        let (realtime, channel) = setup();
        let watcher = realtime.connect().unwrap();
        let mut sub = watcher.subscribe_equal_to(&channel, true).await.unwrap();
        sub.snapshots.recv().await.unwrap();

        let bob_id = ParticipantId::new("bob");
        {
            let bob = realtime.connect().unwrap();
            bob.remove_on_disconnect(&channel, &bob_id).await.unwrap();
            bob.set(&channel, &bob_id, true).await.unwrap();
            assert_eq!(sub.snapshots.recv().await.unwrap().len(), 1);
            // Dropped without an explicit disconnect.
        }

        assert!(sub.snapshots.recv().await.unwrap().is_empty());
        let left = realtime
            .with_database(|db| db.participants_with(&channel, true))
            .unwrap();
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn disconnected_connection_rejects_calls() {
        let (realtime, channel) = setup();
        let conn = realtime.connect().unwrap();
        conn.disconnect().unwrap();
        assert!(!conn.is_connected());

        let result = conn.channel_ids().await;
        assert!(matches!(result, Err(StoreError::Disconnected(id)) if id == conn.id()));
        assert!(conn.write(&channel, &LogKey("k".into()), json!({})).await.is_err());
    }

    #[tokio::test]
    async fn deleted_channel_disappears_from_directory() {
        let (realtime, channel) = setup();
        let conn = realtime.connect().unwrap();
        assert!(conn.channel_ids().await.unwrap().contains(&channel));

        assert!(realtime.delete_channel(&channel).unwrap());
        assert!(!conn.channel_ids().await.unwrap().contains(&channel));
    }

    #[tokio::test]
    async fn user_directory_resolves_names() {
        let (realtime, _) = setup();
        let alice = ParticipantId::new("alice");
        realtime
            .upsert_user(&User::new(alice.clone(), Some("Alice".into())))
            .unwrap();

        let conn = realtime.connect().unwrap();
        assert_eq!(conn.display_name(&alice).await.unwrap().as_deref(), Some("Alice"));
        assert_eq!(conn.display_name(&ParticipantId::new("x")).await.unwrap(), None);
    }

    #[test]
    fn server_timestamps_strictly_increase() {
        let realtime = Realtime::open_in_memory().unwrap();
        let conn = realtime.connect().unwrap();
        let mut last = conn.server_timestamp();
        for _ in 0..100 {
            let next = conn.server_timestamp();
            assert!(next > last);
            last = next;
        }
    }
}
