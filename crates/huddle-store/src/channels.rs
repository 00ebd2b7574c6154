//! CRUD operations for [`Channel`] records.

use std::collections::HashSet;

use rusqlite::params;

use huddle_shared::types::ChannelId;

use crate::database::Database;
use crate::error::Result;
use crate::models::Channel;

impl Database {
    /// Insert a new channel.
    pub fn create_channel(&self, channel: &Channel) -> Result<()> {
        self.conn().execute(
            "INSERT INTO channels (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![
                channel.id.as_str(),
                channel.name,
                channel.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Ids of every live channel.
    pub fn channel_ids(&self) -> Result<HashSet<ChannelId>> {
        let mut stmt = self.conn().prepare("SELECT id FROM channels")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(ChannelId(row?));
        }
        Ok(ids)
    }

    /// Delete a channel together with its log and presence map. Returns
    /// `true` if the channel existed.
    pub fn delete_channel(&self, id: &ChannelId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM channels WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }
}
