use rusqlite::params;

use huddle_shared::types::{ChannelId, ParticipantId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Set `participant`'s flag in the channel's presence map.
    pub fn set_presence(
        &self,
        channel: &ChannelId,
        participant: &ParticipantId,
        value: bool,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO typing (channel_id, participant_id, is_typing) VALUES (?1, ?2, ?3)
             ON CONFLICT(channel_id, participant_id) DO UPDATE SET is_typing = excluded.is_typing",
            params![channel.as_str(), participant.as_str(), value],
        )?;
        Ok(())
    }

    /// Remove `participant`'s entry. Returns `true` if one existed.
    pub fn remove_presence(&self, channel: &ChannelId, participant: &ParticipantId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM typing WHERE channel_id = ?1 AND participant_id = ?2",
            params![channel.as_str(), participant.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Participants whose flag equals `value`, ordered by id.
    pub fn participants_with(&self, channel: &ChannelId, value: bool) -> Result<Vec<ParticipantId>> {
        let mut stmt = self.conn().prepare(
            "SELECT participant_id FROM typing
             WHERE channel_id = ?1 AND is_typing = ?2
             ORDER BY participant_id ASC",
        )?;
        let rows = stmt.query_map(params![channel.as_str(), value], |row| row.get::<_, String>(0))?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(ParticipantId(row?));
        }
        Ok(participants)
    }
}
