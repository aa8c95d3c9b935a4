use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;
use crate::models::{Group, GroupMessage, MemberRole, Message, Profile};

// -- JWT Claims --

/// JWT claims shared across tether-api (REST middleware) and the gateway
/// upgrade handler. The id may arrive as an integer, float or string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(deserialize_with = "ids::deserialize")]
    pub app_user_id: i64,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// -- Friends --

#[derive(Debug, Deserialize)]
pub struct FriendRequestBody {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequestView {
    pub id: i64,
    pub requester_id: i64,
    pub created_at: DateTime<Utc>,
    pub requester: Option<Profile>,
}

// -- Private chat --

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    #[serde(deserialize_with = "ids::deserialize")]
    pub peer_id: i64,
    #[serde(deserialize_with = "ids::deserialize")]
    pub before_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub peer_id: i64,
    pub before_id: i64,
    pub updated: usize,
}

/// A private message with both parties' profiles attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: Option<Profile>,
    pub receiver: Option<Profile>,
}

// -- Groups --

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default, deserialize_with = "ids::deserialize_vec")]
    pub member_ids: Vec<i64>,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMembersRequest {
    #[serde(default, deserialize_with = "ids::deserialize_vec")]
    pub user_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GroupReadRequest {
    #[serde(deserialize_with = "ids::deserialize")]
    pub msg_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct GroupSearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadResponse {
    pub group_id: i64,
    pub unread: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessageView {
    #[serde(flatten)]
    pub message: GroupMessage,
    pub sender: Option<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberView {
    pub user_id: i64,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupBrief {
    pub id: i64,
    pub name: String,
    pub avatar: String,
}

impl From<&Group> for GroupBrief {
    fn from(g: &Group) -> Self {
        Self {
            id: g.id,
            name: g.name.clone(),
            avatar: g.avatar.clone(),
        }
    }
}

// -- Conversations --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationSummary {
    Private {
        peer_id: i64,
        peer: Option<Profile>,
        last_message: Option<Message>,
        unread_count: i64,
    },
    Group {
        group: GroupBrief,
        last_message: Option<GroupMessage>,
        unread_count: i64,
    },
}

impl ConversationSummary {
    /// Timestamp used to order the merged list. Conversations without any
    /// message sort as if their last activity was the Unix epoch.
    pub fn last_activity(&self) -> DateTime<Utc> {
        let ts = match self {
            Self::Private { last_message, .. } => last_message.as_ref().map(|m| m.created_at),
            Self::Group { last_message, .. } => last_message.as_ref().map(|m| m.created_at),
        };
        ts.unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Merged conversation list. `total` counts private conversations only;
/// `group_total` is the number of group entries appended to this page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPage {
    pub items: Vec<ConversationSummary>,
    pub total: i64,
    pub group_total: i64,
    pub page: u32,
    pub page_size: u32,
}
