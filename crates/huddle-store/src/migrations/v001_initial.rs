//! v001 -- Initial schema creation.
//!
//! Creates the four tables backing the realtime tree: `users`, `channels`,
//! `messages` (one append log per channel) and `typing` (one presence map
//! per channel).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (directory used to resolve display names)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    uid          TEXT PRIMARY KEY NOT NULL,
    display_name TEXT,
    created_at   TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    id         TEXT PRIMARY KEY NOT NULL,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Messages (append log; seq is the log order)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    key        TEXT NOT NULL UNIQUE,
    channel_id TEXT NOT NULL,
    payload    TEXT NOT NULL,                 -- JSON value, not validated

    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_seq
    ON messages(channel_id, seq);

-- ----------------------------------------------------------------
-- Typing presence
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS typing (
    channel_id     TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    is_typing      INTEGER NOT NULL,          -- boolean 0/1

    PRIMARY KEY (channel_id, participant_id),
    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
