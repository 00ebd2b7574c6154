//! Value types shared by the Huddle store and client crates.
//!
//! Nothing in this crate performs I/O: it holds identifiers, the
//! [`TimeKey`](timekey::TimeKey) used to order and group messages, and the
//! wire record schema written to the realtime backend.

pub mod constants;
pub mod protocol;
pub mod timekey;
pub mod types;

pub use protocol::{MessageRecord, Parsed};
pub use timekey::TimeKey;
pub use types::{ChannelId, LogKey, ParticipantId};
