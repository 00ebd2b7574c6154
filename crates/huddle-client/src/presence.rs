//! Typing presence for one participant in one channel.
//!
//! The local flag is written to `channels/<id>/typingIndicator/<me>` without
//! waiting for the write; the backend removes that entry by itself if the
//! connection drops. Separately, the tracker watches every entry equal to
//! `true` and decides whether the "someone is typing" indicator should show.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use huddle_shared::types::{ChannelId, ParticipantId};
use huddle_store::{PresenceMap, PresenceSnapshot, PresenceSubscription};

use crate::error::Result;

/// Indicator change produced by a presence snapshot. The view should also
/// scroll to the bottom whenever one is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorUpdate {
    pub visible: bool,
}

/// A queued flag write. `done` fires once the value (or a later one) has
/// been handed to the backend.
struct FlagWrite {
    typing: bool,
    done: oneshot::Sender<()>,
}

pub struct TypingTracker {
    presence: Arc<dyn PresenceMap>,
    channel_id: ChannelId,
    participant: ParticipantId,
    local_typing: bool,
    indicator_visible: bool,
    writer: Option<mpsc::UnboundedSender<FlagWrite>>,
}

impl TypingTracker {
    pub fn new(
        presence: Arc<dyn PresenceMap>,
        channel_id: ChannelId,
        participant: ParticipantId,
    ) -> Self {
        Self {
            presence,
            channel_id,
            participant,
            local_typing: false,
            indicator_visible: false,
            writer: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.local_typing
    }

    pub fn indicator_visible(&self) -> bool {
        self.indicator_visible
    }

    /// Update the local flag now and queue the remote write. Writes reach
    /// the backend in call order from a single writer task, so the remote
    /// entry always ends on the last value set here. Write failures are
    /// logged, not returned.
    pub fn set_typing(&mut self, typing: bool) -> oneshot::Receiver<()> {
        self.local_typing = typing;

        let (done, flushed) = oneshot::channel();
        let write = FlagWrite { typing, done };
        let write = match &self.writer {
            Some(tx) => match tx.send(write) {
                Ok(()) => return flushed,
                Err(mpsc::error::SendError(write)) => write,
            },
            None => write,
        };

        let tx = self.spawn_writer();
        // The writer was just spawned and holds the receiver.
        let _ = tx.send(write);
        flushed
    }

    fn spawn_writer(&mut self) -> &mpsc::UnboundedSender<FlagWrite> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_flags(
            self.presence.clone(),
            self.channel_id.clone(),
            self.participant.clone(),
            rx,
        ));
        self.writer.insert(tx)
    }

    /// Register disconnect cleanup for our own entry, then subscribe to all
    /// participants currently typing.
    pub async fn open(
        presence: &dyn PresenceMap,
        channel_id: &ChannelId,
        participant: &ParticipantId,
    ) -> Result<PresenceSubscription> {
        presence.remove_on_disconnect(channel_id, participant).await?;
        debug!(path = %channel_id.typing_path(), participant = %participant, "Observing typing");
        Ok(presence.subscribe_equal_to(channel_id, true).await?)
    }

    /// Apply a snapshot of typing participants.
    ///
    /// A lone typist while we are typing is taken to be us, so no indicator
    /// change is produced.
    pub fn on_snapshot(&mut self, snapshot: &PresenceSnapshot) -> Option<IndicatorUpdate> {
        if snapshot.len() == 1 && self.local_typing {
            return None;
        }
        self.indicator_visible = !snapshot.is_empty();
        Some(IndicatorUpdate {
            visible: self.indicator_visible,
        })
    }
}

/// Apply queued flag writes one at a time. Writes queued behind each other
/// collapse into the last one.
async fn write_flags(
    presence: Arc<dyn PresenceMap>,
    channel_id: ChannelId,
    participant: ParticipantId,
    mut rx: mpsc::UnboundedReceiver<FlagWrite>,
) {
    while let Some(FlagWrite { mut typing, done }) = rx.recv().await {
        let mut waiters = vec![done];
        while let Ok(next) = rx.try_recv() {
            typing = next.typing;
            waiters.push(next.done);
        }

        if let Err(e) = presence.set(&channel_id, &participant, typing).await {
            warn!(
                channel = %channel_id,
                participant = %participant,
                error = %e,
                "Failed to publish typing flag"
            );
        }
        for done in waiters {
            let _ = done.send(());
        }
    }
}
