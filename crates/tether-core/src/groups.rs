use std::sync::Arc;

use chrono::Utc;
use tether_db::Database;
use tether_types::api::{GroupMessageView, MemberView};
use tether_types::events::DEFAULT_MESSAGE_TYPE;
use tether_types::models::{Group, GroupMessage};
use tether_types::paging::{Page, Paged};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::profiles::{ProfileLookup, profile_map};

/// Groups need at least this many members, owner included.
pub const MIN_GROUP_MEMBERS: usize = 3;
pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const MAX_SEARCH_LIMIT: i64 = 50;

#[derive(Clone)]
pub struct GroupService {
    db: Arc<Database>,
    profiles: Arc<dyn ProfileLookup>,
}

impl GroupService {
    pub fn new(db: Arc<Database>, profiles: Arc<dyn ProfileLookup>) -> Self {
        Self { db, profiles }
    }

    pub fn create(&self, owner_id: i64, name: &str, member_ids: &[i64], avatar: &str) -> ServiceResult<Group> {
        let name = name.trim();
        if owner_id <= 0 {
            return Err(ServiceError::invalid("owner is required"));
        }
        if name.is_empty() {
            return Err(ServiceError::invalid("group name is required"));
        }

        let mut members = normalize_ids(member_ids);
        if !members.contains(&owner_id) {
            members.push(owner_id);
        }
        if members.len() < MIN_GROUP_MEMBERS {
            return Err(ServiceError::invalid(format!(
                "a group needs at least {MIN_GROUP_MEMBERS} members"
            )));
        }
        self.ensure_users_exist(&members)?;

        let group = self.db.create_group(owner_id, name, avatar.trim(), &members)?;
        info!("Group {} created by {} with {} members", group.id, owner_id, members.len());
        Ok(group)
    }

    pub fn get(&self, group_id: i64) -> ServiceResult<Group> {
        if group_id <= 0 {
            return Err(ServiceError::invalid("group id is required"));
        }
        self.db.get_group(group_id)?.ok_or(ServiceError::NotFound("group"))
    }

    /// Open join: any user may enter an existing group.
    pub fn join(&self, group_id: i64, user_id: i64) -> ServiceResult<()> {
        self.get(group_id)?;
        self.ensure_users_exist(&[user_id])?;
        if self.db.is_group_member(group_id, user_id)? {
            return Ok(());
        }
        self.db.add_group_members(group_id, &[user_id])?;
        debug!("User {} joined group {}", user_id, group_id);
        Ok(())
    }

    pub fn send_message(&self, group_id: i64, sender_id: i64, msg_type: &str, content: &str) -> ServiceResult<GroupMessage> {
        if group_id <= 0 || sender_id <= 0 {
            return Err(ServiceError::invalid("group and sender are required"));
        }
        if content.is_empty() {
            return Err(ServiceError::invalid("content is empty"));
        }
        self.get(group_id)?;
        if !self.db.is_group_member(group_id, sender_id)? {
            return Err(ServiceError::NotAMember);
        }

        let kind = if msg_type.is_empty() { DEFAULT_MESSAGE_TYPE } else { msg_type };
        let message = self.db.insert_group_message(group_id, sender_id, kind, content)?;
        debug!("Group message {} stored in group {} by {}", message.id, group_id, sender_id);
        Ok(message)
    }

    /// Owner-only. Users already in the group are skipped.
    pub fn add_members(&self, operator_id: i64, group_id: i64, user_ids: &[i64]) -> ServiceResult<()> {
        let user_ids = normalize_ids(user_ids);
        if user_ids.is_empty() {
            return Ok(());
        }
        self.require_owner(operator_id, group_id)?;
        self.ensure_users_exist(&user_ids)?;

        let added = self.db.add_group_members(group_id, &user_ids)?;
        info!("Owner {} added {} members to group {}", operator_id, added, group_id);
        Ok(())
    }

    /// Owner-only. The owner cannot be removed; removing a non-member is a no-op.
    pub fn remove_member(&self, operator_id: i64, group_id: i64, target_id: i64) -> ServiceResult<()> {
        let group = self.require_owner(operator_id, group_id)?;
        if target_id == group.owner_id {
            return Err(ServiceError::invalid("the owner cannot be removed"));
        }
        if self.db.remove_group_member(group_id, target_id)? {
            info!("Owner {} removed {} from group {}", operator_id, target_id, group_id);
        }
        Ok(())
    }

    /// Owner-only. Empty fields are left as they are.
    pub fn update_group(&self, operator_id: i64, group_id: i64, name: &str, avatar: &str) -> ServiceResult<Group> {
        let mut group = self.require_owner(operator_id, group_id)?;
        let (name, avatar) = (name.trim(), avatar.trim());

        let mut changed = false;
        if !name.is_empty() && name != group.name {
            group.name = name.to_string();
            changed = true;
        }
        if !avatar.is_empty() && avatar != group.avatar {
            group.avatar = avatar.to_string();
            changed = true;
        }
        if !changed {
            return Ok(group);
        }

        group.updated_at = Utc::now();
        self.db.update_group(&group)?;
        debug!("Group {} updated by {}", group_id, operator_id);
        Ok(group)
    }

    /// Newest first. Membership is checked by callers.
    pub fn list_messages(&self, group_id: i64, page: Page) -> ServiceResult<Paged<GroupMessage>> {
        let (messages, total) = self
            .db
            .list_group_messages(group_id, page.offset(), page.limit())?;
        Ok(Paged::new(messages, total, page))
    }

    pub fn list_messages_view(&self, group_id: i64, page: Page) -> ServiceResult<Paged<GroupMessageView>> {
        let messages = self.list_messages(group_id, page)?;
        let senders: Vec<i64> = messages.items.iter().map(|m| m.sender_id).collect();
        let profiles = profile_map(self.profiles.as_ref(), &senders)?;

        Ok(messages.map(|message| GroupMessageView {
            sender: profiles.get(&message.sender_id).cloned(),
            message,
        }))
    }

    pub fn latest_message(&self, group_id: i64) -> ServiceResult<Option<GroupMessage>> {
        Ok(self.db.latest_group_message(group_id)?)
    }

    /// Advance the member's read cursor. Older ids never move it back, and
    /// the id must name a message of this group.
    pub fn update_last_read(&self, group_id: i64, user_id: i64, msg_id: i64) -> ServiceResult<()> {
        if group_id <= 0 || user_id <= 0 || msg_id <= 0 {
            return Err(ServiceError::invalid("group and message id are required"));
        }
        if !self.db.group_message_exists(group_id, msg_id)? {
            return Err(ServiceError::NotFound("message"));
        }
        self.db.update_last_read(group_id, user_id, msg_id)?;
        Ok(())
    }

    pub fn count_unread(&self, group_id: i64, user_id: i64) -> ServiceResult<i64> {
        Ok(self.db.count_group_unread(group_id, user_id)?)
    }

    pub fn is_member(&self, group_id: i64, user_id: i64) -> ServiceResult<bool> {
        Ok(self.db.is_group_member(group_id, user_id)?)
    }

    /// `NotAMember` unless `user_id` belongs to the group.
    pub fn require_member(&self, group_id: i64, user_id: i64) -> ServiceResult<()> {
        self.get(group_id)?;
        if !self.is_member(group_id, user_id)? {
            return Err(ServiceError::NotAMember);
        }
        Ok(())
    }

    pub fn list_member_ids(&self, group_id: i64) -> ServiceResult<Vec<i64>> {
        Ok(self.db.list_group_member_ids(group_id)?)
    }

    pub fn list_members(&self, group_id: i64) -> ServiceResult<Vec<MemberView>> {
        let members = self.db.list_group_members(group_id)?;
        let ids: Vec<i64> = members.iter().map(|m| m.user_id).collect();
        let mut profiles = profile_map(self.profiles.as_ref(), &ids)?;

        Ok(members
            .into_iter()
            .map(|m| MemberView {
                user_id: m.user_id,
                role: m.role,
                joined_at: m.joined_at,
                profile: profiles.remove(&m.user_id),
            })
            .collect())
    }

    pub fn list_user_groups(&self, user_id: i64, page: Page) -> ServiceResult<Paged<Group>> {
        let (groups, total) = self.db.list_user_groups(user_id, page.offset(), page.limit())?;
        Ok(Paged::new(groups, total, page))
    }

    /// Name substring search. `limit` outside `1..=50` falls back to 20.
    pub fn search(&self, name: &str, limit: Option<i64>) -> ServiceResult<Vec<Group>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(vec![]);
        }
        let limit = match limit {
            Some(n) if (1..=MAX_SEARCH_LIMIT).contains(&n) => n,
            _ => DEFAULT_SEARCH_LIMIT,
        };
        Ok(self.db.search_groups(name, limit)?)
    }

    fn require_owner(&self, operator_id: i64, group_id: i64) -> ServiceResult<Group> {
        let group = self.get(group_id)?;
        if group.owner_id != operator_id {
            return Err(ServiceError::PermissionDenied);
        }
        Ok(group)
    }

    fn ensure_users_exist(&self, ids: &[i64]) -> ServiceResult<()> {
        let found = self.db.existing_user_ids(ids)?;
        if found.len() != ids.len() {
            return Err(ServiceError::NotFound("user"));
        }
        Ok(())
    }
}

/// Drop non-positive ids and duplicates, keeping first-seen order.
fn normalize_ids(ids: &[i64]) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::with_capacity(ids.len());
    for &id in ids {
        if id > 0 && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
