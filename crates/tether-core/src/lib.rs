pub mod chat;
pub mod conversations;
pub mod error;
pub mod friends;
pub mod groups;
pub mod profiles;

pub use chat::ChatService;
pub use conversations::ConversationService;
pub use error::{ServiceError, ServiceResult};
pub use friends::FriendService;
pub use groups::GroupService;
pub use profiles::{MediaProfiles, ProfileLookup};

use std::sync::Arc;

use tether_db::Database;

/// Every service, wired to one database and one profile source.
#[derive(Clone)]
pub struct Services {
    pub friends: FriendService,
    pub chat: ChatService,
    pub groups: GroupService,
    pub conversations: ConversationService,
}

impl Services {
    pub fn new(db: Arc<Database>, profiles: Arc<dyn ProfileLookup>) -> Self {
        let chat = ChatService::new(db.clone(), profiles.clone());
        let groups = GroupService::new(db.clone(), profiles.clone());
        Self {
            friends: FriendService::new(db, profiles),
            conversations: ConversationService::new(chat.clone(), groups.clone()),
            chat,
            groups,
        }
    }
}
