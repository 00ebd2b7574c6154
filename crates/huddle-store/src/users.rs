use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use huddle_shared::types::ParticipantId;

use crate::database::Database;
use crate::error::Result;
use crate::models::User;

impl Database {
    /// Insert or replace a directory entry.
    pub fn upsert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (uid, display_name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(uid) DO UPDATE SET display_name = excluded.display_name",
            params![user.uid.as_str(), user.display_name, user.created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Display name of `uid`, or `None` when the user is unknown or has no
    /// name yet.
    pub fn display_name(&self, uid: &ParticipantId) -> Result<Option<String>> {
        let name: Option<Option<String>> = self
            .conn()
            .query_row(
                "SELECT display_name FROM users WHERE uid = ?1",
                params![uid.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.flatten())
    }
}

impl User {
    pub fn new(uid: ParticipantId, display_name: Option<String>) -> Self {
        Self {
            uid,
            display_name,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_lookup() {
        let db = Database::open_in_memory().unwrap();
        let alice = ParticipantId::new("alice");
        let ghost = ParticipantId::new("ghost");

        db.upsert_user(&User::new(alice.clone(), Some("Alice".into()))).unwrap();
        db.upsert_user(&User::new(ghost.clone(), None)).unwrap();

        assert_eq!(db.display_name(&alice).unwrap().as_deref(), Some("Alice"));
        assert_eq!(db.display_name(&ghost).unwrap(), None);
        assert_eq!(db.display_name(&ParticipantId::new("nobody")).unwrap(), None);

        db.upsert_user(&User::new(alice.clone(), Some("Alice B.".into()))).unwrap();
        assert_eq!(db.display_name(&alice).unwrap().as_deref(), Some("Alice B."));
    }
}
