//! Database row types that never leave the server as-is.
//! Everything safe to expose is mapped straight into tether-types models.
use chrono::{DateTime, Utc};
use tether_types::models::Message;

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

/// One private conversation as seen from a given user.
pub struct ConversationRow {
    pub peer_id: i64,
    pub last_message: Message,
    pub unread_count: i64,
}
