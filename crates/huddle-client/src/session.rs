//! The chat session actor.
//!
//! A [`ChatSession`] owns the feed, the backlog counter, the typing tracker
//! and the input guard. It runs as a single tokio task: UI requests arrive
//! through a [`SessionHandle`], backend work runs in spawned tasks that post
//! a [`Completion`] back to the same loop, and subscription pumps forward
//! pushed events the same way. All state is mutated from the loop only, so
//! out-of-order completions never race each other.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use huddle_shared::types::LogKey;
use huddle_store::{
    ChannelDirectory, Connection, LogEvent, LogSubscription, MessageLog, PresenceMap,
    PresenceSnapshot, PresenceSubscription, SubscriptionHandle, UserDirectory,
};

use crate::config::ClientConfig;
use crate::context::SessionContext;
use crate::error::{ClientError, Result};
use crate::events::{ChatEvent, EventOutbox, Operation};
use crate::feed::FeedEntry;
use crate::liveness::{LivenessGate, ReentrancyGuard};
use crate::presence::TypingTracker;
use crate::send::SendPipeline;
use crate::synchronizer::{effective_limit, Admission, MessageSynchronizer, PendingLookup};

const COMMAND_BUFFER: usize = 64;
const COMPLETION_BUFFER: usize = 256;

/// The four backend collaborators a session talks to.
#[derive(Clone)]
pub struct ChatBackends {
    pub channels: Arc<dyn ChannelDirectory>,
    pub log: Arc<dyn MessageLog>,
    pub presence: Arc<dyn PresenceMap>,
    pub users: Arc<dyn UserDirectory>,
}

impl ChatBackends {
    /// Use one realtime connection for everything.
    pub fn from_connection(conn: Arc<Connection>) -> Self {
        Self {
            channels: conn.clone(),
            log: conn.clone(),
            presence: conn.clone(),
            users: conn,
        }
    }
}

enum Command {
    Send {
        text: String,
        reply: oneshot::Sender<Result<LogKey>>,
    },
    TextChanged(String),
    Messages(oneshot::Sender<Vec<FeedEntry>>),
    IsTyping(oneshot::Sender<bool>),
    Close,
}

/// Results of spawned backend work, plus events pumped from subscriptions.
enum Completion {
    StartupChecked(Result<bool>),
    StreamOpened(Result<LogSubscription>),
    Log(LogEvent),
    Resolved {
        lookup: PendingLookup,
        name: Result<Option<String>>,
    },
    TypingOpened(Result<PresenceSubscription>),
    Snapshot(PresenceSnapshot),
    InputChecked(Result<bool>),
    Sent {
        result: Result<LogKey>,
        reply: oneshot::Sender<Result<LogKey>>,
    },
    LoadingElapsed,
}

/// Cloneable front end to a running [`ChatSession`].
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    /// Send a message. Resolves once the write is acknowledged.
    pub async fn send(&self, text: impl Into<String>) -> Result<LogKey> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Report the current contents of the input field.
    pub async fn text_changed(&self, text: impl Into<String>) -> Result<()> {
        self.command(Command::TextChanged(text.into())).await
    }

    /// The ordered feed with day headers.
    pub async fn messages(&self) -> Result<Vec<FeedEntry>> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Messages(reply)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    /// The local typing flag.
    pub async fn is_typing(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::IsTyping(reply)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    /// Revoke subscriptions and stop the session. Closing twice is a no-op.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close).await;
    }

    async fn command(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }
}

pub struct ChatSession {
    context: SessionContext,
    config: ClientConfig,
    backends: ChatBackends,
    gate: LivenessGate,
    pipeline: SendPipeline,
    sync: MessageSynchronizer,
    typing: TypingTracker,
    input_guard: ReentrancyGuard,
    input_nonempty: bool,
    presence_handle: Option<SubscriptionHandle>,
    events: EventOutbox,
    completions: mpsc::Sender<Completion>,
}

impl ChatSession {
    /// Spawn a session for `context` and return its handle together with the
    /// UI event stream. `backlog_size` of 0 uses the configured default.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        context: SessionContext,
        backends: ChatBackends,
        config: ClientConfig,
        backlog_size: usize,
    ) -> (SessionHandle, mpsc::Receiver<ChatEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (done_tx, done_rx) = mpsc::channel(COMPLETION_BUFFER);

        let limit = effective_limit(backlog_size, config.default_backlog);
        let gate = LivenessGate::new(backends.channels.clone(), context.channel_id.clone());
        let session = Self {
            pipeline: SendPipeline::new(
                backends.log.clone(),
                gate.clone(),
                context.sender_id.clone(),
            ),
            sync: MessageSynchronizer::new(context.channel_id.clone(), limit),
            typing: TypingTracker::new(
                backends.presence.clone(),
                context.channel_id.clone(),
                context.sender_id.clone(),
            ),
            gate,
            input_guard: ReentrancyGuard::default(),
            input_nonempty: false,
            presence_handle: None,
            events: EventOutbox::new(event_tx),
            completions: done_tx,
            context,
            config,
            backends,
        };

        tokio::spawn(session.run(cmd_rx, done_rx));
        (SessionHandle { cmd_tx }, event_rx)
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut done_rx: mpsc::Receiver<Completion>,
    ) {
        info!(
            channel = %self.context.channel_id,
            name = %self.context.channel_name,
            participant = %self.context.sender_id,
            limit = self.sync.limit(),
            "Chat session opened"
        );
        self.start();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Close) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(done) = done_rx.recv() => self.handle_completion(done),
                _ = self.events.ready(), if self.events.is_backed_up() => self.events.flush(),
            }
        }

        self.sync.close();
        if let Some(handle) = self.presence_handle.take() {
            handle.revoke();
        }
        info!(channel = %self.context.channel_id, "Chat session closed");
    }

    /// Gate the stream open on liveness; observe typing in parallel.
    fn start(&mut self) {
        let gate = self.gate.clone();
        self.spawn(async move { Completion::StartupChecked(gate.check().await) });

        let presence = self.backends.presence.clone();
        let channel_id = self.context.channel_id.clone();
        let participant = self.context.sender_id.clone();
        self.spawn(async move {
            Completion::TypingOpened(
                TypingTracker::open(presence.as_ref(), &channel_id, &participant).await,
            )
        });
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Send { text, reply } => {
                let pipeline = self.pipeline.clone();
                self.spawn(async move {
                    let result = pipeline.send(&text).await;
                    Completion::Sent { result, reply }
                });
            }
            Command::TextChanged(text) => {
                self.input_nonempty = !text.is_empty();
                if self.input_guard.try_enter() {
                    let gate = self.gate.clone();
                    self.spawn(async move { Completion::InputChecked(gate.check().await) });
                }
            }
            Command::Messages(reply) => {
                let _ = reply.send(self.sync.feed().entries(&self.config.header_offset));
            }
            Command::IsTyping(reply) => {
                let _ = reply.send(self.typing.is_typing());
            }
            // Handled by the loop.
            Command::Close => {}
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::StartupChecked(Ok(true)) => {
                let log = self.backends.log.clone();
                let channel_id = self.context.channel_id.clone();
                let limit = self.sync.limit();
                self.spawn(async move {
                    Completion::StreamOpened(
                        MessageSynchronizer::subscribe(log.as_ref(), &channel_id, limit).await,
                    )
                });
            }
            Completion::StartupChecked(Ok(false)) => {
                warn!(channel = %self.context.channel_id, "Channel is gone, not opening stream");
                self.emit(ChatEvent::ChannelGone);
            }
            Completion::StartupChecked(Err(e)) => {
                self.failure(Operation::CheckLiveness, e);
            }

            Completion::StreamOpened(Ok(sub)) => {
                let LogSubscription {
                    backlog,
                    events,
                    handle,
                } = sub;
                if self.sync.attach(handle, backlog) {
                    self.emit(ChatEvent::LoadingStarted);
                }
                self.pump(events, Completion::Log);
            }
            Completion::StreamOpened(Err(e)) => {
                self.failure(Operation::OpenStream, e);
            }

            Completion::Log(event) => match self.sync.on_added(event) {
                Admission::Lookup(lookup) => {
                    let users = self.backends.users.clone();
                    self.spawn(async move {
                        let name = lookup.resolve(users.as_ref()).await;
                        Completion::Resolved { lookup, name }
                    });
                }
                Admission::Dropped(Some(delay)) => self.schedule_loading_stop(delay),
                Admission::Dropped(None) => {}
            },

            Completion::Resolved { lookup, name } => {
                let name = match name {
                    Ok(name) => name,
                    Err(e) => {
                        self.failure(Operation::ResolveSender, e);
                        None
                    }
                };
                let resolution = self.sync.on_resolved(lookup, name);
                if resolution.inserted {
                    let entries = self.sync.feed().entries(&self.config.header_offset);
                    self.emit(ChatEvent::MessagesChanged { entries });
                }
                if resolution.cycle_finished {
                    self.emit(ChatEvent::CycleFinished);
                }
                if let Some(delay) = resolution.loading_done {
                    self.schedule_loading_stop(delay);
                }
            }

            Completion::LoadingElapsed => {
                self.emit(ChatEvent::LoadingStopped);
            }

            Completion::TypingOpened(Ok(sub)) => {
                let PresenceSubscription { snapshots, handle } = sub;
                self.presence_handle = Some(handle);
                self.pump(snapshots, Completion::Snapshot);
            }
            Completion::TypingOpened(Err(e)) => {
                self.failure(Operation::ObserveTyping, e);
            }

            Completion::Snapshot(snapshot) => {
                if let Some(update) = self.typing.on_snapshot(&snapshot) {
                    self.emit(ChatEvent::TypingIndicatorChanged {
                        visible: update.visible,
                    });
                    self.emit(ChatEvent::ScrollToBottom);
                }
            }

            Completion::InputChecked(result) => {
                self.input_guard.leave();
                match result {
                    // Apply whatever the input holds now, not what it held
                    // when the check started.
                    Ok(true) => {
                        self.typing.set_typing(self.input_nonempty);
                    }
                    Ok(false) => self.emit(ChatEvent::ChannelGone),
                    Err(e) => self.failure(Operation::CheckLiveness, e),
                }
            }

            Completion::Sent { result, reply } => {
                match &result {
                    Ok(key) => {
                        self.typing.set_typing(false);
                        self.emit(ChatEvent::SendFinished { key: key.clone() });
                    }
                    Err(ClientError::ChannelGone) => self.emit(ChatEvent::ChannelGone),
                    Err(ClientError::EmptyMessage) => {}
                    Err(e) => {
                        warn!(channel = %self.context.channel_id, error = %e, "Send failed");
                        self.emit(ChatEvent::BackendFailure {
                            operation: Operation::Send,
                            error: e.to_string(),
                        });
                    }
                }
                let _ = reply.send(result);
            }
        }
    }

    fn schedule_loading_stop(&self, delay: Duration) {
        debug!(channel = %self.context.channel_id, ?delay, "Backlog drained");
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            Completion::LoadingElapsed
        });
    }

    /// Run `fut` off the loop and post its result back.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completions.clone();
        tokio::spawn(async move {
            let done = fut.await;
            // A closed loop has nothing left to update.
            let _ = tx.send(done).await;
        });
    }

    /// Forward a subscription's pushes into the loop until either side
    /// closes.
    fn pump<T: Send + 'static>(
        &self,
        mut rx: mpsc::UnboundedReceiver<T>,
        wrap: fn(T) -> Completion,
    ) {
        let tx = self.completions.clone();
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if tx.send(wrap(item)).await.is_err() {
                    break;
                }
            }
        });
    }

    fn emit(&mut self, event: ChatEvent) {
        self.events.emit(event);
    }

    fn failure(&mut self, operation: Operation, error: ClientError) {
        warn!(
            channel = %self.context.channel_id,
            ?operation,
            error = %error,
            "Backend call failed"
        );
        self.emit(ChatEvent::BackendFailure {
            operation,
            error: error.to_string(),
        });
    }
}
