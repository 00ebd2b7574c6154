//! Channel liveness checks.
//!
//! Channels can be deleted while a view is open. Every stream open, send and
//! input-driven typing update first confirms the channel is still listed
//! under `channels`. The gate only reports; unwinding the view is the UI's
//! job once it receives `ChannelGone`.

use std::sync::Arc;

use tracing::debug;

use huddle_shared::types::ChannelId;
use huddle_store::ChannelDirectory;

use crate::error::Result;

#[derive(Clone)]
pub struct LivenessGate {
    directory: Arc<dyn ChannelDirectory>,
    channel_id: ChannelId,
}

impl LivenessGate {
    pub fn new(directory: Arc<dyn ChannelDirectory>, channel_id: ChannelId) -> Self {
        Self {
            directory,
            channel_id,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// One-shot read of the channel collection. Backend failures are
    /// returned as errors rather than reported as a dead channel.
    pub async fn check(&self) -> Result<bool> {
        let ids = self.directory.channel_ids().await?;
        let alive = ids.contains(&self.channel_id);
        debug!(channel = %self.channel_id, alive, "Liveness checked");
        Ok(alive)
    }
}

/// Keeps a fast-firing trigger (text input) from starting a second check
/// while one is still in flight.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReentrancyGuard {
    busy: bool,
}

impl ReentrancyGuard {
    /// Returns `true` if the caller may start a check.
    pub fn try_enter(&mut self) -> bool {
        if self.busy {
            return false;
        }
        self.busy = true;
        true
    }

    pub fn leave(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}
