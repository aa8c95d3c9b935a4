use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;
use crate::models::{GroupMessage, Message, Profile};

pub const DEFAULT_MESSAGE_TYPE: &str = "text";

/// Events sent over the WebSocket gateway, server to client.
///
/// `type` always carries the event tag (`private_message`, `group_message`,
/// ...). The stored kind of a chat message (`text`, `image`, ...) travels
/// in `message_type` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Connection registered; the user is now reachable.
    Ready { user_id: i64 },

    PrivateMessage(PrivateMessageEvent),

    GroupMessage(GroupMessageEvent),

    /// A frame from this connection was rejected. Only the sender sees it.
    Error { kind: String, error: String },
}

impl GatewayEvent {
    pub fn error(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessageEvent {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub message_type: String,
    pub content: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sender: Option<Profile>,
    pub receiver: Option<Profile>,
}

impl PrivateMessageEvent {
    pub fn new(message: Message, sender: Option<Profile>, receiver: Option<Profile>) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            message_type: message.kind,
            content: message.content,
            is_read: message.is_read,
            read_at: message.read_at,
            created_at: message.created_at,
            sender,
            receiver,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessageEvent {
    pub group_id: i64,
    pub message_id: i64,
    pub sender_id: i64,
    pub message_type: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender: Option<Profile>,
}

impl GroupMessageEvent {
    pub fn new(message: GroupMessage, sender: Option<Profile>) -> Self {
        Self {
            group_id: message.group_id,
            message_id: message.id,
            sender_id: message.sender_id,
            message_type: message.kind,
            content: message.content,
            created_at: message.created_at,
            sender,
        }
    }
}

/// A frame sent FROM client TO server over WebSocket.
///
/// `group_id > 0` routes to the group; otherwise `to` names the private
/// recipient. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundFrame {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "ids::deserialize")]
    pub to: i64,
    #[serde(default, deserialize_with = "ids::deserialize")]
    pub group_id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub msg_type: String,
}

impl InboundFrame {
    /// Message kind for a group send: `msg_type`, or `text`.
    pub fn message_type(&self) -> &str {
        if self.msg_type.is_empty() {
            DEFAULT_MESSAGE_TYPE
        } else {
            &self.msg_type
        }
    }

    /// Message kind for a private send. Older clients put it in `type`,
    /// so that is consulted when `msg_type` is empty.
    pub fn private_message_type(&self) -> &str {
        match (self.msg_type.as_str(), self.kind.as_str()) {
            ("", "") => DEFAULT_MESSAGE_TYPE,
            ("", kind) => kind,
            (msg_type, _) => msg_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_defaults() {
        let frame: InboundFrame = serde_json::from_str(r#"{"to":2.0,"content":"hi"}"#).unwrap();
        assert_eq!(frame.to, 2);
        assert_eq!(frame.group_id, 0);
        assert_eq!(frame.message_type(), "text");
        assert_eq!(frame.private_message_type(), "text");

        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"image","to":"2","content":"pic.png"}"#).unwrap();
        assert_eq!(frame.private_message_type(), "image");
        assert_eq!(frame.message_type(), "text");

        let frame: InboundFrame =
            serde_json::from_str(r#"{"type":"image","msg_type":"file","to":2,"content":"a.zip"}"#).unwrap();
        assert_eq!(frame.private_message_type(), "file");

        let frame: InboundFrame =
            serde_json::from_str(r#"{"group_id":"9","content":"x","msg_type":"image"}"#).unwrap();
        assert_eq!(frame.group_id, 9);
        assert_eq!(frame.message_type(), "image");
    }

    #[test]
    fn events_are_tagged_by_type() {
        let json = serde_json::to_value(GatewayEvent::error("not_friends", "not friends")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "not_friends");
        assert_eq!(json["error"], "not friends");

        let event = GatewayEvent::GroupMessage(GroupMessageEvent {
            group_id: 3,
            message_id: 11,
            sender_id: 1,
            message_type: "text".into(),
            content: "yo".into(),
            created_at: Utc::now(),
            sender: None,
        });
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "group_message");
        assert_eq!(json["group_id"], 3);
        assert_eq!(json["message_id"], 11);
    }
}
