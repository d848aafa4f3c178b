//! v001 -- Initial schema creation.
//!
//! Creates the `messages` table.  A thread exists exactly when it has at
//! least one message, so there is no separate thread metadata table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    thread_key TEXT NOT NULL,               -- canonical pair key
    sender_id  TEXT NOT NULL,               -- identity id of the sender
    ciphertext TEXT NOT NULL,               -- opaque encrypted body
    server_ts  TEXT NOT NULL                -- ISO-8601 / RFC-3339, store-assigned
);

CREATE INDEX IF NOT EXISTS idx_messages_thread_ts
    ON messages(thread_key, server_ts ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
