//! # huddle-client
//!
//! Client-side synchronization core for one open Huddle channel view.
//!
//! A [`ChatSession`] mirrors a channel's append-only message log into a
//! locally ordered feed, tracks who is typing, and writes outgoing
//! messages. Every stream open, send and typing update is gated on the
//! channel still existing; deletion is reported as
//! [`ChatEvent::ChannelGone`] so the view can unwind. The view layer drives
//! the session through a [`SessionHandle`] and renders from the
//! [`ChatEvent`] stream.
//!
//! The building blocks ([`MessageSynchronizer`], [`TypingTracker`],
//! [`SendPipeline`], [`LivenessGate`]) are public so they can be driven
//! without the actor.

pub mod backlog;
pub mod config;
pub mod context;
pub mod events;
pub mod feed;
pub mod liveness;
pub mod presence;
pub mod send;
pub mod session;
pub mod synchronizer;
pub mod telemetry;

mod error;

pub use config::ClientConfig;
pub use context::SessionContext;
pub use error::{ClientError, Result};
pub use events::{ChatEvent, Operation};
pub use feed::{ChatMessage, FeedEntry, MessageFeed};
pub use liveness::LivenessGate;
pub use presence::TypingTracker;
pub use send::SendPipeline;
pub use session::{ChatBackends, ChatSession, SessionHandle};
pub use synchronizer::MessageSynchronizer;
