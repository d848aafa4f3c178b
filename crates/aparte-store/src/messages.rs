//! Append and ordered-read operations for [`MessageRecord`]s.

use aparte_shared::ThreadKey;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{MessageRecord, ThreadChange};

impl Database {
    /// Append a message to a thread's log.
    ///
    /// The store assigns the record id and the server timestamp.  Within one
    /// thread timestamps never decrease: if the wall clock reads earlier than
    /// the last committed record (clock slew), the last timestamp is reused
    /// and arrival order breaks the tie.  The append is announced on the
    /// change feed before this call returns.
    pub fn append_message(
        &self,
        thread: &ThreadKey,
        sender_id: &str,
        ciphertext: &str,
    ) -> Result<MessageRecord> {
        let id = Uuid::new_v4();

        let last_ts: Option<String> = self
            .conn()
            .query_row(
                "SELECT server_ts FROM messages
                 WHERE thread_key = ?1
                 ORDER BY server_ts DESC, rowid DESC
                 LIMIT 1",
                params![thread.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let mut server_ts = Utc::now();
        if let Some(last) = last_ts {
            let last: DateTime<Utc> = DateTime::parse_from_rfc3339(&last)?.with_timezone(&Utc);
            if last > server_ts {
                server_ts = last;
            }
        }

        self.conn().execute(
            "INSERT INTO messages (id, thread_key, sender_id, ciphertext, server_ts)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                thread.as_str(),
                sender_id,
                ciphertext,
                server_ts.to_rfc3339(),
            ],
        )?;

        let seq = self.conn().last_insert_rowid();

        let record = MessageRecord {
            id,
            thread: thread.clone(),
            sender_id: sender_id.to_string(),
            ciphertext: ciphertext.to_string(),
            server_ts,
            seq,
        };

        // Announce the committed append; nobody listening is fine.
        let _ = self.change_sender().send(ThreadChange {
            thread: thread.clone(),
            seq,
        });

        Ok(record)
    }

    /// Return all records for a thread, ordered by `(server_ts, arrival)`
    /// ascending.  A thread with no records yields an empty vec.
    pub fn thread_messages(&self, thread: &ThreadKey) -> Result<Vec<MessageRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, thread_key, sender_id, ciphertext, server_ts, rowid
             FROM messages
             WHERE thread_key = ?1
             ORDER BY server_ts ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![thread.as_str()], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

/// Map a `rusqlite::Row` to a [`MessageRecord`].
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let id_str: String = row.get(0)?;
    let thread_key: String = row.get(1)?;
    let sender_id: String = row.get(2)?;
    let ciphertext: String = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let seq: i64 = row.get(5)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let server_ts: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(MessageRecord {
        id,
        thread: ThreadKey::from_canonical(thread_key),
        sender_id,
        ciphertext,
        server_ts,
        seq,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db(dir: &tempfile::TempDir) -> Database {
        Database::open_at(&dir.path().join("test.db")).unwrap()
    }

    fn thread(a: &str, b: &str) -> ThreadKey {
        ThreadKey::resolve(a, b).unwrap()
    }

    #[test]
    fn test_append_then_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir);
        let t = thread("u1", "u2");

        let r1 = db.append_message(&t, "u1", "c1").unwrap();
        let r2 = db.append_message(&t, "u2", "c2").unwrap();
        let r3 = db.append_message(&t, "u1", "c3").unwrap();

        let records = db.thread_messages(&t).unwrap();
        assert_eq!(records, vec![r1, r2, r3]);
    }

    #[test]
    fn test_empty_thread_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir);

        assert!(db.thread_messages(&thread("u1", "u2")).unwrap().is_empty());
    }

    #[test]
    fn test_threads_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir);
        let t1 = thread("u1", "u2");
        let t2 = thread("u1", "u3");

        db.append_message(&t1, "u1", "for-t1").unwrap();
        db.append_message(&t2, "u1", "for-t2").unwrap();

        let records = db.thread_messages(&t1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ciphertext, "for-t1");
    }

    #[test]
    fn test_timestamps_never_decrease() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir);
        let t = thread("u1", "u2");

        let mut previous: Option<MessageRecord> = None;
        for i in 0..20 {
            let record = db.append_message(&t, "u1", &format!("c{i}")).unwrap();
            if let Some(prev) = previous {
                assert!(record.server_ts >= prev.server_ts);
                assert!(record.seq > prev.seq);
            }
            previous = Some(record);
        }
    }

    #[test]
    fn test_change_feed_announces_each_append() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir);
        let t = thread("u1", "u2");
        let mut changes = db.changes();

        let r1 = db.append_message(&t, "u1", "c1").unwrap();
        let r2 = db.append_message(&t, "u2", "c2").unwrap();

        assert_eq!(
            changes.try_recv().unwrap(),
            ThreadChange { thread: t.clone(), seq: r1.seq }
        );
        assert_eq!(
            changes.try_recv().unwrap(),
            ThreadChange { thread: t.clone(), seq: r2.seq }
        );
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_reopen_preserves_acknowledged_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let t = thread("u1", "u2");

        {
            let db = Database::open_at(&path).unwrap();
            db.append_message(&t, "u1", "survives").unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let records = db.thread_messages(&t).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ciphertext, "survives");
    }
}
