use rusqlite::params;
use serde_json::Value;

use huddle_shared::types::{ChannelId, LogKey};

use crate::database::Database;
use crate::error::Result;
use crate::models::LogEntry;

impl Database {
    /// Append `payload` to the channel's log under `key`.
    pub fn append_entry(&self, channel: &ChannelId, key: &LogKey, payload: &Value) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (key, channel_id, payload) VALUES (?1, ?2, ?3)",
            params![key.as_str(), channel.as_str(), serde_json::to_string(payload)?],
        )?;
        Ok(())
    }

    /// The last `limit` entries of the channel's log, oldest first.
    pub fn tail_entries(&self, channel: &ChannelId, limit: usize) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT key, payload FROM (
                 SELECT seq, key, payload
                 FROM messages
                 WHERE channel_id = ?1
                 ORDER BY seq DESC
                 LIMIT ?2
             )
             ORDER BY seq ASC",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![channel.as_str(), limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (key, payload) = row?;
            entries.push(LogEntry {
                key: LogKey(key),
                payload: serde_json::from_str(&payload)?,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::StoreError;
    use crate::models::Channel;

    fn db_with_channel() -> (Database, ChannelId) {
        let db = Database::open_in_memory().unwrap();
        let id = ChannelId::new("general");
        db.create_channel(&Channel::new(id.clone(), "General")).unwrap();
        (db, id)
    }

    #[test]
    fn tail_returns_last_entries_oldest_first() {
        let (db, channel) = db_with_channel();
        for i in 0..5 {
            db.append_entry(&channel, &LogKey(format!("k{i}")), &json!({ "n": i }))
                .unwrap();
        }

        let tail = db.tail_entries(&channel, 3).unwrap();
        let keys: Vec<_> = tail.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["k2", "k3", "k4"]);
        assert_eq!(tail[0].payload, json!({ "n": 2 }));
        assert_eq!(db.tail_entries(&channel, 100).unwrap().len(), 5);
    }

    #[test]
    fn append_to_missing_channel_fails() {
        let db = Database::open_in_memory().unwrap();
        let result = db.append_entry(&ChannelId::new("gone"), &LogKey("k".into()), &json!({}));
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn deleting_channel_drops_its_log() {
        let (db, channel) = db_with_channel();
        db.append_entry(&channel, &LogKey("k".into()), &json!({})).unwrap();
        db.delete_channel(&channel).unwrap();
        assert!(db.tail_entries(&channel, 100).unwrap().is_empty());
    }
}
