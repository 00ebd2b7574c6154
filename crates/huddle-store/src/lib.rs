//! # huddle-store
//!
//! Backing-store seams for the Huddle synchronization core, plus a local
//! realtime backend that implements them on SQLite.
//!
//! The [`backend`] module defines what the core needs from a realtime
//! database: an ordered append log with tail subscriptions, a presence map
//! with value-filtered subscriptions and on-disconnect cleanup, and one-shot
//! channel and user directories. [`Realtime`] provides all of it in-process:
//! rows live in a [`Database`] and additions are pushed to subscribers as
//! they are written.

pub mod backend;
pub mod channels;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod presence;
pub mod realtime;
pub mod users;

mod error;

pub use backend::{
    ChannelDirectory, LogEvent, LogSubscription, MessageLog, PresenceMap, PresenceSnapshot,
    PresenceSubscription, SubscriptionHandle, UserDirectory,
};
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use realtime::{Connection, Realtime};
