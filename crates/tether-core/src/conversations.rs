use tether_types::api::{ConversationPage, ConversationSummary, GroupBrief};
use tether_types::models::Group;
use tether_types::paging::{MAX_PAGE_SIZE, Page};

use crate::chat::ChatService;
use crate::error::ServiceResult;
use crate::groups::GroupService;

/// Upper bound on group entries merged into one conversation list.
pub const MAX_GROUP_CONVERSATIONS: usize = 200;

/// Builds the unified conversation list: private chats from the chat
/// service plus one entry per group the user belongs to.
#[derive(Clone)]
pub struct ConversationService {
    chat: ChatService,
    groups: GroupService,
}

impl ConversationService {
    pub fn new(chat: ChatService, groups: GroupService) -> Self {
        Self { chat, groups }
    }

    /// Private conversations are paged by `page`; every group (up to
    /// `MAX_GROUP_CONVERSATIONS`) is appended to each page. The merged list
    /// is ordered by last activity, newest first.
    pub fn list(&self, user_id: i64, page: Page) -> ServiceResult<ConversationPage> {
        let private = self.chat.recent_conversations(user_id, page)?;
        let groups = self.user_groups(user_id)?;

        let group_total = groups.len() as i64;
        let mut items = private.items;
        for group in groups {
            let last_message = self.groups.latest_message(group.id)?;
            let unread_count = self.groups.count_unread(group.id, user_id)?;
            items.push(ConversationSummary::Group {
                group: GroupBrief::from(&group),
                last_message,
                unread_count,
            });
        }

        // sort_by is stable: ties keep private-before-group order.
        items.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));

        Ok(ConversationPage {
            items,
            total: private.total,
            group_total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    fn user_groups(&self, user_id: i64) -> ServiceResult<Vec<Group>> {
        let mut out = Vec::new();
        let mut page = Page::new(1, MAX_PAGE_SIZE as i64);
        loop {
            let batch = self.groups.list_user_groups(user_id, page)?;
            let last = batch.items.len() < page.page_size as usize;
            out.extend(batch.items);
            if last || out.len() >= MAX_GROUP_CONVERSATIONS {
                break;
            }
            page.page += 1;
        }
        out.truncate(MAX_GROUP_CONVERSATIONS);
        Ok(out)
    }
}
