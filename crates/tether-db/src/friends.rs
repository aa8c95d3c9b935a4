use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row};
use tether_types::models::{FriendRequest, FriendRequestStatus};

use crate::Database;
use crate::queries::{OptionalExt, parse_column};

const REQUEST_COLUMNS: &str = "id, requester_id, addressee_id, status, created_at, updated_at";

impl Database {
    // -- Requests --

    /// Create a pending request, or return the one already pending for the
    /// same ordered pair.
    pub fn create_friend_request(&self, requester_id: i64, addressee_id: i64) -> Result<FriendRequest> {
        self.with_tx(|tx| {
            let now = Utc::now();
            // The partial unique index turns a second pending insert into a no-op.
            tx.execute(
                "INSERT OR IGNORE INTO friend_requests (requester_id, addressee_id, status, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?3)",
                rusqlite::params![requester_id, addressee_id, now],
            )?;

            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friend_requests
                 WHERE requester_id = ?1 AND addressee_id = ?2 AND status = 'pending'"
            );
            let request = tx.query_row(&sql, [requester_id, addressee_id], request_from_row)?;
            Ok(request)
        })
    }

    pub fn get_friend_request(&self, id: i64) -> Result<Option<FriendRequest>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1");
            conn.query_row(&sql, [id], request_from_row).optional()
        })
    }

    /// Mark a pending request accepted and create both directed relations.
    /// Returns `false` (and writes nothing) when the request is no longer pending.
    pub fn accept_friend_request(&self, id: i64) -> Result<bool> {
        self.with_tx(|tx| {
            let now = Utc::now();
            let pair: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT requester_id, addressee_id FROM friend_requests WHERE id = ?1 AND status = 'pending'",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((requester_id, addressee_id)) = pair else {
                return Ok(false);
            };

            tx.execute(
                "UPDATE friend_requests SET status = 'accepted', updated_at = ?2 WHERE id = ?1",
                rusqlite::params![id, now],
            )?;
            insert_relation(tx, requester_id, addressee_id)?;
            insert_relation(tx, addressee_id, requester_id)?;
            Ok(true)
        })
    }

    /// Returns `false` when the request is no longer pending.
    pub fn decline_friend_request(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE friend_requests SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = 'pending'",
                rusqlite::params![id, FriendRequestStatus::Declined.as_str(), Utc::now()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Pending requests addressed to `addressee_id`, newest first.
    pub fn list_pending_requests(
        &self,
        addressee_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<FriendRequest>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM friend_requests WHERE addressee_id = ?1 AND status = 'pending'",
                [addressee_id],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friend_requests
                 WHERE addressee_id = ?1 AND status = 'pending'
                 ORDER BY id DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([addressee_id, limit, offset], request_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    // -- Relations --

    /// Insert a single directed edge. Duplicate edges are ignored.
    pub fn add_relation(&self, user_id: i64, friend_id: i64) -> Result<()> {
        self.with_conn(|conn| insert_relation(conn, user_id, friend_id))
    }

    /// Delete both directed edges between two users. Returns rows removed.
    pub fn remove_friendship(&self, a: i64, b: i64) -> Result<usize> {
        self.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM friend_relations
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                [a, b],
            )?;
            Ok(removed)
        })
    }

    /// True only when both A->B and B->A exist.
    pub fn are_friends(&self, a: i64, b: i64) -> Result<bool> {
        if a <= 0 || b <= 0 || a == b {
            return Ok(false);
        }

        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM friend_relations
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                [a, b],
                |row| row.get(0),
            )?;
            Ok(count >= 2)
        })
    }

    /// Ids of users with a mutual relation to `user_id`, newest edge first.
    pub fn list_friend_ids(&self, user_id: i64, offset: i64, limit: i64) -> Result<(Vec<i64>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM friend_relations r
                 JOIN friend_relations back ON back.user_id = r.friend_id AND back.friend_id = r.user_id
                 WHERE r.user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT r.friend_id FROM friend_relations r
                 JOIN friend_relations back ON back.user_id = r.friend_id AND back.friend_id = r.user_id
                 WHERE r.user_id = ?1
                 ORDER BY r.id DESC LIMIT ?2 OFFSET ?3",
            )?;
            let ids = stmt
                .query_map([user_id, limit, offset], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok((ids, total))
        })
    }
}

fn insert_relation(conn: &Connection, user_id: i64, friend_id: i64) -> Result<()> {
    if user_id == friend_id {
        return Ok(());
    }
    conn.execute(
        "INSERT OR IGNORE INTO friend_relations (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, friend_id, Utc::now()],
    )?;
    Ok(())
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<FriendRequest> {
    Ok(FriendRequest {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        addressee_id: row.get(2)?,
        status: parse_column(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
