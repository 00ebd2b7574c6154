use std::sync::Arc;

use tracing::{info, warn};

use huddle_shared::protocol::MessageRecord;
use huddle_shared::types::{LogKey, ParticipantId};
use huddle_store::MessageLog;

use crate::error::{ClientError, Result};
use crate::liveness::LivenessGate;

/// Writes outgoing messages straight to the shared log. There is no
/// optimistic local copy: the sender sees its message when the log echoes
/// the addition back.
#[derive(Clone)]
pub struct SendPipeline {
    log: Arc<dyn MessageLog>,
    gate: LivenessGate,
    sender_id: ParticipantId,
}

impl SendPipeline {
    pub fn new(log: Arc<dyn MessageLog>, gate: LivenessGate, sender_id: ParticipantId) -> Self {
        Self {
            log,
            gate,
            sender_id,
        }
    }

    /// Check liveness, then append `{uid, text, date}` under a fresh key.
    /// Returns the key written.
    pub async fn send(&self, text: &str) -> Result<LogKey> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let channel_id = self.gate.channel_id();
        if !self.gate.check().await? {
            warn!(channel = %channel_id, "Send refused: channel is gone");
            return Err(ClientError::ChannelGone);
        }

        let key = self.log.generate_key(channel_id);
        let record = MessageRecord::new(&self.sender_id, text, self.log.server_timestamp());
        self.log.write(channel_id, &key, record.to_value()).await?;

        info!(channel = %channel_id, key = %key, "Message sent");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use huddle_shared::types::ChannelId;
    use huddle_store::{Channel, Connection, LogEvent, Realtime};
    use serde_json::json;

    use super::*;

    fn setup() -> (Realtime, Arc<Connection>, SendPipeline) {
        let realtime = Realtime::open_in_memory().unwrap();
        let channel = ChannelId::new("general");
        realtime
            .create_channel(&Channel::new(channel.clone(), "General"))
            .unwrap();
        let conn = Arc::new(realtime.connect().unwrap());
        let gate = LivenessGate::new(conn.clone(), channel);
        let pipeline = SendPipeline::new(conn.clone(), gate, ParticipantId::new("me"));
        (realtime, conn, pipeline)
    }

    #[tokio::test]
    async fn alive_send_writes_record_at_fresh_key() {
        let (_realtime, conn, pipeline) = setup();
        let channel = ChannelId::new("general");

        let first = pipeline.send("hello").await.unwrap();
        let second = pipeline.send("again").await.unwrap();
        assert_ne!(first, second);

        let mut sub = conn.subscribe_tail(&channel, 25).await.unwrap();
        let LogEvent::Added(entry) = sub.events.recv().await.unwrap();
        assert_eq!(entry.key, first);
        assert_eq!(entry.payload["uid"], json!("me"));
        assert_eq!(entry.payload["text"], json!("hello"));
        assert!(entry.payload["date"].is_i64());
    }

    #[tokio::test]
    async fn gone_channel_prevents_write() {
        let (realtime, _conn, pipeline) = setup();
        let channel = ChannelId::new("general");
        realtime.delete_channel(&channel).unwrap();

        assert!(matches!(pipeline.send("hello").await, Err(ClientError::ChannelGone)));
        let written = realtime.with_database(|db| db.tail_entries(&channel, 10)).unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let (realtime, _conn, pipeline) = setup();
        assert!(matches!(pipeline.send("").await, Err(ClientError::EmptyMessage)));
        assert!(matches!(pipeline.send(" \n\t").await, Err(ClientError::EmptyMessage)));

        let written = realtime
            .with_database(|db| db.tail_entries(&ChannelId::new("general"), 10))
            .unwrap();
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_surfaced() {
        let (_realtime, conn, pipeline) = setup();
        conn.disconnect().unwrap();
        assert!(matches!(pipeline.send("hello").await, Err(ClientError::Store(_))));
    }
}
