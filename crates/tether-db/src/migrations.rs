use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            nickname        TEXT NOT NULL DEFAULT '',
            avatar          TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS friend_relations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            friend_id   INTEGER NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            UNIQUE(user_id, friend_id)
        );

        CREATE TABLE IF NOT EXISTS friend_requests (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            requester_id    INTEGER NOT NULL REFERENCES users(id),
            addressee_id    INTEGER NOT NULL REFERENCES users(id),
            status          TEXT NOT NULL DEFAULT 'pending',
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        -- At most one pending request per ordered pair
        CREATE UNIQUE INDEX IF NOT EXISTS ux_friend_requests_pending
            ON friend_requests(requester_id, addressee_id)
            WHERE status = 'pending';

        CREATE INDEX IF NOT EXISTS idx_friend_requests_addressee
            ON friend_requests(addressee_id, status);

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id       INTEGER NOT NULL REFERENCES users(id),
            receiver_id     INTEGER NOT NULL REFERENCES users(id),
            type            TEXT NOT NULL DEFAULT 'text',
            content         TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            read_at         TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(sender_id, receiver_id, id);

        CREATE INDEX IF NOT EXISTS idx_messages_receiver_unread
            ON messages(receiver_id, is_read);

        CREATE TABLE IF NOT EXISTS groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            owner_id    INTEGER NOT NULL REFERENCES users(id),
            avatar      TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    INTEGER NOT NULL REFERENCES groups(id),
            user_id     INTEGER NOT NULL REFERENCES users(id),
            role        TEXT NOT NULL DEFAULT 'member',
            joined_at   TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_group_members_user
            ON group_members(user_id);

        CREATE TABLE IF NOT EXISTS group_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id    INTEGER NOT NULL REFERENCES groups(id),
            sender_id   INTEGER NOT NULL REFERENCES users(id),
            type        TEXT NOT NULL DEFAULT 'text',
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_group_messages_group
            ON group_messages(group_id, id);

        CREATE TABLE IF NOT EXISTS group_read_cursors (
            group_id            INTEGER NOT NULL REFERENCES groups(id),
            user_id             INTEGER NOT NULL REFERENCES users(id),
            last_read_msg_id    INTEGER NOT NULL DEFAULT 0,
            updated_at          TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
