use std::collections::VecDeque;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use huddle_shared::types::LogKey;

use crate::feed::FeedEntry;

/// The backend call a [`ChatEvent::BackendFailure`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    CheckLiveness,
    OpenStream,
    ObserveTyping,
    ResolveSender,
    Send,
}

/// Notifications delivered to the view layer, in the order it should apply
/// them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ChatEvent {
    /// The feed changed; `entries` is the full ordered feed with day headers.
    MessagesChanged { entries: Vec<FeedEntry> },
    /// One message receive cycle ended, inserted or not.
    CycleFinished,
    TypingIndicatorChanged { visible: bool },
    ScrollToBottom,
    LoadingStarted,
    LoadingStopped,
    SendFinished { key: LogKey },
    /// The channel was deleted. The view should be dismissed.
    ChannelGone,
    BackendFailure { operation: Operation, error: String },
}

/// Buffers events the view has not made room for yet, so the session loop
/// never waits on the view. While backed up, a newer `MessagesChanged`
/// replaces any queued one since each carries the full feed.
pub(crate) struct EventOutbox {
    tx: mpsc::Sender<ChatEvent>,
    backlog: VecDeque<ChatEvent>,
}

impl EventOutbox {
    pub(crate) fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            tx,
            backlog: VecDeque::new(),
        }
    }

    pub(crate) fn emit(&mut self, event: ChatEvent) {
        if self.backlog.is_empty() {
            match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => self.backlog.push_back(event),
                Err(TrySendError::Closed(event)) => {
                    tracing::debug!(?event, "Event receiver dropped");
                }
            }
            return;
        }

        if matches!(event, ChatEvent::MessagesChanged { .. }) {
            self.backlog
                .retain(|queued| !matches!(queued, ChatEvent::MessagesChanged { .. }));
        }
        self.backlog.push_back(event);
    }

    pub(crate) fn is_backed_up(&self) -> bool {
        !self.backlog.is_empty()
    }

    /// Resolves once the view has room for at least one event, or is gone.
    pub(crate) async fn ready(&self) {
        let _ = self.tx.reserve().await;
    }

    /// Hand over queued events until the view is full again.
    pub(crate) fn flush(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.backlog.push_front(event);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(dropped = self.backlog.len() + 1, "Event receiver dropped");
                    self.backlog.clear();
                    return;
                }
            }
        }
    }
}
