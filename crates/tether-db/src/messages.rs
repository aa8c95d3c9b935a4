use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use tether_types::models::Message;

use crate::Database;
use crate::models::ConversationRow;

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, type, content, is_read, read_at, created_at";

impl Database {
    // -- Private messages --

    pub fn insert_message(&self, sender_id: i64, receiver_id: i64, kind: &str, content: &str) -> Result<Message> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, type, content, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                rusqlite::params![sender_id, receiver_id, kind, content, now],
            )?;

            Ok(Message {
                id: conn.last_insert_rowid(),
                sender_id,
                receiver_id,
                kind: kind.to_string(),
                content: content.to_string(),
                is_read: false,
                read_at: None,
                created_at: now,
            })
        })
    }

    /// Messages between `a` and `b` in both directions, newest first.
    pub fn list_conversation(&self, a: i64, b: i64, offset: i64, limit: i64) -> Result<(Vec<Message>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)",
                [a, b],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY id DESC LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([a, b, limit, offset], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// Flag unread messages from `peer` to `reader` with id <= `before_id`
    /// as read. Already-read rows are untouched. Returns rows updated.
    pub fn mark_read(&self, reader: i64, peer: i64, before_id: i64, at: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1, read_at = ?4
                 WHERE sender_id = ?2 AND receiver_id = ?1 AND id <= ?3 AND is_read = 0",
                rusqlite::params![reader, peer, before_id, at],
            )?;
            Ok(changed)
        })
    }

    /// One row per peer `user_id` has exchanged messages with: the latest
    /// message and how many of the peer's messages are still unread.
    /// Ordered by latest message, newest first.
    pub fn recent_conversations(&self, user_id: i64, offset: i64, limit: i64) -> Result<(Vec<ConversationRow>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END)
                 FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "WITH peers AS (
                    SELECT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS peer_id,
                           MAX(id) AS last_id
                    FROM messages
                    WHERE sender_id = ?1 OR receiver_id = ?1
                    GROUP BY peer_id
                 )
                 SELECT p.peer_id,
                        m.id, m.sender_id, m.receiver_id, m.type, m.content, m.is_read, m.read_at, m.created_at,
                        (SELECT COUNT(*) FROM messages u
                         WHERE u.sender_id = p.peer_id AND u.receiver_id = ?1 AND u.is_read = 0) AS unread
                 FROM peers p
                 JOIN messages m ON m.id = p.last_id
                 ORDER BY p.last_id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;

            let rows = stmt
                .query_map([user_id, limit, offset], |row| {
                    Ok(ConversationRow {
                        peer_id: row.get(0)?,
                        last_message: message_from_row_at(row, 1)?,
                        unread_count: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    message_from_row_at(row, 0)
}

fn message_from_row_at(row: &Row<'_>, base: usize) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(base)?,
        sender_id: row.get(base + 1)?,
        receiver_id: row.get(base + 2)?,
        kind: row.get(base + 3)?,
        content: row.get(base + 4)?,
        is_read: row.get(base + 5)?,
        read_at: row.get(base + 6)?,
        created_at: row.get(base + 7)?,
    })
}
