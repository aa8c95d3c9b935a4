use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row};
use tether_types::models::{Group, GroupMember, GroupMessage, MemberRole};

use crate::Database;
use crate::queries::{OptionalExt, parse_column};

const GROUP_COLUMNS: &str = "id, name, owner_id, avatar, created_at, updated_at";
const GROUP_MESSAGE_COLUMNS: &str = "id, group_id, sender_id, type, content, created_at";

impl Database {
    // -- Groups --

    /// Create a group and its initial members in one transaction.
    /// `member_ids` must already be deduplicated; the owner gets role=owner.
    pub fn create_group(&self, owner_id: i64, name: &str, avatar: &str, member_ids: &[i64]) -> Result<Group> {
        self.with_tx(|tx| {
            let now = Utc::now();
            tx.execute(
                "INSERT INTO groups (name, owner_id, avatar, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![name, owner_id, avatar, now],
            )?;
            let group_id = tx.last_insert_rowid();

            for &user_id in member_ids {
                let role = if user_id == owner_id { MemberRole::Owner } else { MemberRole::Member };
                insert_member(tx, group_id, user_id, role)?;
            }

            Ok(Group {
                id: group_id,
                name: name.to_string(),
                owner_id,
                avatar: avatar.to_string(),
                created_at: now,
                updated_at: now,
            })
        })
    }

    pub fn get_group(&self, id: i64) -> Result<Option<Group>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1");
            conn.query_row(&sql, [id], group_from_row).optional()
        })
    }

    pub fn update_group(&self, group: &Group) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE groups SET name = ?2, avatar = ?3, updated_at = ?4 WHERE id = ?1",
                rusqlite::params![group.id, group.name, group.avatar, group.updated_at],
            )?;
            Ok(())
        })
    }

    /// Groups `user_id` belongs to, most recently created first.
    pub fn list_user_groups(&self, user_id: i64, offset: i64, limit: i64) -> Result<(Vec<Group>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM group_members WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.owner_id, g.avatar, g.created_at, g.updated_at
                 FROM groups g
                 JOIN group_members gm ON gm.group_id = g.id
                 WHERE gm.user_id = ?1
                 ORDER BY g.id DESC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map([user_id, limit, offset], group_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// Case-insensitive substring match on the group name.
    pub fn search_groups(&self, needle: &str, limit: i64) -> Result<Vec<Group>> {
        let pattern = format!("%{}%", escape_like(needle));
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {GROUP_COLUMNS} FROM groups
                 WHERE name LIKE ?1 ESCAPE '\\'
                 ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, limit], group_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Members --

    pub fn is_group_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                [group_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Adds users as plain members. Existing members are left alone.
    /// Returns how many rows were actually inserted.
    pub fn add_group_members(&self, group_id: i64, user_ids: &[i64]) -> Result<usize> {
        self.with_tx(|tx| {
            let mut added = 0;
            for &user_id in user_ids {
                added += insert_member(tx, group_id, user_id, MemberRole::Member)?;
            }
            Ok(added)
        })
    }

    pub fn remove_group_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                [group_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn list_group_member_ids(&self, group_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id FROM group_members WHERE group_id = ?1")?;
            let ids = stmt
                .query_map([group_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    pub fn list_group_members(&self, group_id: i64) -> Result<Vec<GroupMember>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT group_id, user_id, role, joined_at FROM group_members
                 WHERE group_id = ?1 ORDER BY joined_at, user_id",
            )?;
            let rows = stmt
                .query_map([group_id], |row| {
                    Ok(GroupMember {
                        group_id: row.get(0)?,
                        user_id: row.get(1)?,
                        role: parse_column(row, 2)?,
                        joined_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Group messages --

    pub fn insert_group_message(&self, group_id: i64, sender_id: i64, kind: &str, content: &str) -> Result<GroupMessage> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO group_messages (group_id, sender_id, type, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![group_id, sender_id, kind, content, now],
            )?;

            Ok(GroupMessage {
                id: conn.last_insert_rowid(),
                group_id,
                sender_id,
                kind: kind.to_string(),
                content: content.to_string(),
                created_at: now,
            })
        })
    }

    /// Newest first.
    pub fn list_group_messages(&self, group_id: i64, offset: i64, limit: i64) -> Result<(Vec<GroupMessage>, i64)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM group_messages WHERE group_id = ?1",
                [group_id],
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT {GROUP_MESSAGE_COLUMNS} FROM group_messages
                 WHERE group_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([group_id, limit, offset], group_message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    pub fn latest_group_message(&self, group_id: i64) -> Result<Option<GroupMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {GROUP_MESSAGE_COLUMNS} FROM group_messages
                 WHERE group_id = ?1 ORDER BY id DESC LIMIT 1"
            );
            conn.query_row(&sql, [group_id], group_message_from_row).optional()
        })
    }

    pub fn group_message_exists(&self, group_id: i64, msg_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM group_messages WHERE group_id = ?1 AND id = ?2",
                [group_id, msg_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    // -- Read cursors --

    /// Advance the read cursor to `msg_id`. A single upsert keeps the
    /// stored value at the maximum ever written, so it never moves back.
    pub fn update_last_read(&self, group_id: i64, user_id: i64, msg_id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO group_read_cursors (group_id, user_id, last_read_msg_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(group_id, user_id) DO UPDATE SET
                    last_read_msg_id = max(last_read_msg_id, excluded.last_read_msg_id),
                    updated_at = excluded.updated_at",
                rusqlite::params![group_id, user_id, msg_id, Utc::now()],
            )?;
            Ok(())
        })
    }

    /// 0 when the user has no cursor yet.
    pub fn get_last_read(&self, group_id: i64, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let last: Option<i64> = conn
                .query_row(
                    "SELECT last_read_msg_id FROM group_read_cursors WHERE group_id = ?1 AND user_id = ?2",
                    [group_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(last.unwrap_or(0))
        })
    }

    pub fn count_group_unread(&self, group_id: i64, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM group_messages
                 WHERE group_id = ?1 AND id > COALESCE(
                    (SELECT last_read_msg_id FROM group_read_cursors WHERE group_id = ?1 AND user_id = ?2), 0)",
                [group_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn insert_member(conn: &Connection, group_id: i64, user_id: i64, role: MemberRole) -> Result<usize> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO group_members (group_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![group_id, user_id, role.as_str(), Utc::now()],
    )?;
    Ok(inserted)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        avatar: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn group_message_from_row(row: &Row<'_>) -> rusqlite::Result<GroupMessage> {
    Ok(GroupMessage {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sender_id: row.get(2)?,
        kind: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = (0..4)
            .map(|i| db.create_user(&format!("u{i}@example.com"), "h", &format!("U{i}")).unwrap())
            .collect();
        (db, ids)
    }

    #[test]
    fn create_assigns_owner_role() {
        let (db, u) = setup();
        let group = db.create_group(u[0], "crew", "", &[u[0], u[1], u[2]]).unwrap();

        let members = db.list_group_members(group.id).unwrap();
        assert_eq!(members.len(), 3);
        let owner = members.iter().find(|m| m.user_id == u[0]).unwrap();
        assert_eq!(owner.role, MemberRole::Owner);
        assert!(members.iter().filter(|m| m.role == MemberRole::Member).count() == 2);

        assert!(db.is_group_member(group.id, u[1]).unwrap());
        assert!(!db.is_group_member(group.id, u[3]).unwrap());
    }

    #[test]
    fn add_members_ignores_existing() {
        let (db, u) = setup();
        let group = db.create_group(u[0], "crew", "", &[u[0], u[1], u[2]]).unwrap();
        assert_eq!(db.add_group_members(group.id, &[u[1], u[3]]).unwrap(), 1);
        assert_eq!(db.list_group_member_ids(group.id).unwrap().len(), 4);

        assert!(db.remove_group_member(group.id, u[3]).unwrap());
        assert!(!db.remove_group_member(group.id, u[3]).unwrap());
    }

    #[test]
    fn read_cursor_never_regresses() {
        let (db, u) = setup();
        let group = db.create_group(u[0], "crew", "", &[u[0], u[1], u[2]]).unwrap();
        assert_eq!(db.get_last_read(group.id, u[1]).unwrap(), 0);

        for msg_id in [5, 3, 9, 1, 9, 7] {
            let before = db.get_last_read(group.id, u[1]).unwrap();
            db.update_last_read(group.id, u[1], msg_id).unwrap();
            let after = db.get_last_read(group.id, u[1]).unwrap();
            assert!(after >= before, "cursor moved back from {before} to {after}");
        }
        assert_eq!(db.get_last_read(group.id, u[1]).unwrap(), 9);
    }

    #[test]
    fn unread_counts_follow_cursor() {
        let (db, u) = setup();
        let group = db.create_group(u[0], "crew", "", &[u[0], u[1], u[2]]).unwrap();
        let m1 = db.insert_group_message(group.id, u[0], "text", "a").unwrap();
        db.insert_group_message(group.id, u[2], "text", "b").unwrap();
        let m3 = db.insert_group_message(group.id, u[0], "text", "c").unwrap();

        assert_eq!(db.count_group_unread(group.id, u[1]).unwrap(), 3);
        assert!(db.group_message_exists(group.id, m3.id).unwrap());
        assert!(!db.group_message_exists(group.id + 1, m3.id).unwrap());
        db.update_last_read(group.id, u[1], m1.id).unwrap();
        assert_eq!(db.count_group_unread(group.id, u[1]).unwrap(), 2);
        db.update_last_read(group.id, u[1], m3.id).unwrap();
        assert_eq!(db.count_group_unread(group.id, u[1]).unwrap(), 0);

        assert_eq!(db.latest_group_message(group.id).unwrap().unwrap().id, m3.id);
        let (rows, total) = db.list_group_messages(group.id, 0, 2).unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows[0].id, m3.id);
    }

    #[test]
    fn user_groups_and_search() {
        let (db, u) = setup();
        let first = db.create_group(u[0], "Weekend Hikers", "", &[u[0], u[1], u[2]]).unwrap();
        let second = db.create_group(u[1], "100%_club", "", &[u[1], u[2], u[3]]).unwrap();

        let (groups, total) = db.list_user_groups(u[2], 0, 20).unwrap();
        assert_eq!(total, 2);
        assert_eq!(groups[0].id, second.id);

        let hits = db.search_groups("hikers", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, first.id);

        // LIKE wildcards in the needle are matched literally.
        let hits = db.search_groups("%_", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, second.id);
    }

    #[test]
    fn update_persists_name_and_avatar() {
        let (db, u) = setup();
        let mut group = db.create_group(u[0], "old", "", &[u[0], u[1], u[2]]).unwrap();
        group.name = "new".into();
        group.avatar = "g.png".into();
        db.update_group(&group).unwrap();

        let stored = db.get_group(group.id).unwrap().unwrap();
        assert_eq!(stored.name, "new");
        assert_eq!(stored.avatar, "g.png");
        assert!(db.get_group(9999).unwrap().is_none());
    }
}
