use std::sync::Arc;

use chrono::Utc;
use tether_db::Database;
use tether_types::api::{ConversationSummary, MessageView};
use tether_types::events::DEFAULT_MESSAGE_TYPE;
use tether_types::models::Message;
use tether_types::paging::{Page, Paged};
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};
use crate::profiles::{ProfileLookup, profile_map};

/// One-to-one messaging between friends.
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
    profiles: Arc<dyn ProfileLookup>,
}

impl ChatService {
    pub fn new(db: Arc<Database>, profiles: Arc<dyn ProfileLookup>) -> Self {
        Self { db, profiles }
    }

    /// Persist a message from `sender` to `receiver`. Both must be friends.
    pub fn send(&self, sender: i64, receiver: i64, content: &str, msg_type: &str) -> ServiceResult<Message> {
        if sender <= 0 || receiver <= 0 {
            return Err(ServiceError::invalid("sender and receiver are required"));
        }
        if sender == receiver {
            return Err(ServiceError::invalid("cannot message yourself"));
        }
        if content.is_empty() {
            return Err(ServiceError::invalid("content is empty"));
        }
        if !self.db.are_friends(sender, receiver)? {
            return Err(ServiceError::NotFriends);
        }

        let kind = if msg_type.is_empty() { DEFAULT_MESSAGE_TYPE } else { msg_type };
        let message = self.db.insert_message(sender, receiver, kind, content)?;
        debug!("Message {} stored: {} -> {}", message.id, sender, receiver);
        Ok(message)
    }

    /// Messages between `user_id` and `peer_id`, newest first. Reading
    /// history does not require a current friendship.
    pub fn history(&self, user_id: i64, peer_id: i64, page: Page) -> ServiceResult<Paged<Message>> {
        if user_id <= 0 || peer_id <= 0 {
            return Err(ServiceError::invalid("peer id is required"));
        }
        let (messages, total) = self
            .db
            .list_conversation(user_id, peer_id, page.offset(), page.limit())?;
        Ok(Paged::new(messages, total, page))
    }

    /// `history` with sender and receiver profiles attached to each message.
    pub fn history_view(&self, user_id: i64, peer_id: i64, page: Page) -> ServiceResult<Paged<MessageView>> {
        let history = self.history(user_id, peer_id, page)?;
        let profiles = profile_map(self.profiles.as_ref(), &[user_id, peer_id])?;

        Ok(history.map(|message| MessageView {
            sender: profiles.get(&message.sender_id).cloned(),
            receiver: profiles.get(&message.receiver_id).cloned(),
            message,
        }))
    }

    /// Mark everything `peer_id` sent to `user_id` up to `before_id` as read.
    pub fn mark_read(&self, user_id: i64, peer_id: i64, before_id: i64) -> ServiceResult<usize> {
        if user_id <= 0 || peer_id <= 0 || before_id <= 0 {
            return Err(ServiceError::invalid("peer_id and before_id are required"));
        }
        let updated = self.db.mark_read(user_id, peer_id, before_id, Utc::now())?;
        debug!("User {} read {} messages from {}", user_id, updated, peer_id);
        Ok(updated)
    }

    /// Private conversations of `user_id`, most recently active first.
    pub fn recent_conversations(&self, user_id: i64, page: Page) -> ServiceResult<Paged<ConversationSummary>> {
        let (rows, total) = self
            .db
            .recent_conversations(user_id, page.offset(), page.limit())?;

        let peers: Vec<i64> = rows.iter().map(|r| r.peer_id).collect();
        let mut profiles = profile_map(self.profiles.as_ref(), &peers)?;

        let items = rows
            .into_iter()
            .map(|row| ConversationSummary::Private {
                peer_id: row.peer_id,
                peer: profiles.remove(&row.peer_id),
                last_message: Some(row.last_message),
                unread_count: row.unread_count,
            })
            .collect();
        Ok(Paged::new(items, total, page))
    }
}
