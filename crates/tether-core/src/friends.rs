use std::sync::Arc;

use tether_db::Database;
use tether_types::api::PendingRequestView;
use tether_types::models::{FriendRequest, Profile};
use tether_types::paging::{Page, Paged};
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::profiles::{ProfileLookup, profile_map};

/// Friend request workflow and the symmetric friendship fact.
#[derive(Clone)]
pub struct FriendService {
    db: Arc<Database>,
    profiles: Arc<dyn ProfileLookup>,
}

impl FriendService {
    pub fn new(db: Arc<Database>, profiles: Arc<dyn ProfileLookup>) -> Self {
        Self { db, profiles }
    }

    /// Ask the user registered under `friend_email` to become friends.
    /// Re-sending while a request is pending returns that request.
    pub fn request_friend(&self, user_id: i64, friend_email: &str) -> ServiceResult<FriendRequest> {
        let email = friend_email.trim().to_lowercase();
        if user_id <= 0 || email.is_empty() {
            return Err(ServiceError::invalid("email is required"));
        }

        let target = self
            .db
            .get_user_by_email(&email)?
            .ok_or(ServiceError::NotFound("user"))?;
        if target.id == user_id {
            return Err(ServiceError::invalid("cannot befriend yourself"));
        }

        let request = self.db.create_friend_request(user_id, target.id)?;
        debug!("Friend request {} from {} to {}", request.id, user_id, target.id);
        Ok(request)
    }

    pub fn accept_request(&self, user_id: i64, request_id: i64) -> ServiceResult<()> {
        self.check_addressee(user_id, request_id)?;

        if !self.db.accept_friend_request(request_id)? {
            return Err(ServiceError::invalid("request is not pending"));
        }
        info!("User {} accepted friend request {}", user_id, request_id);
        Ok(())
    }

    pub fn decline_request(&self, user_id: i64, request_id: i64) -> ServiceResult<()> {
        self.check_addressee(user_id, request_id)?;

        if !self.db.decline_friend_request(request_id)? {
            return Err(ServiceError::invalid("request is not pending"));
        }
        debug!("User {} declined friend request {}", user_id, request_id);
        Ok(())
    }

    /// Only the addressee may decide on a request, and only while it is pending.
    fn check_addressee(&self, user_id: i64, request_id: i64) -> ServiceResult<FriendRequest> {
        if request_id <= 0 {
            return Err(ServiceError::invalid("request id is required"));
        }
        let request = self
            .db
            .get_friend_request(request_id)?
            .ok_or(ServiceError::NotFound("friend request"))?;
        if request.addressee_id != user_id {
            return Err(ServiceError::PermissionDenied);
        }
        Ok(request)
    }

    pub fn list_pending(&self, user_id: i64, page: Page) -> ServiceResult<Paged<PendingRequestView>> {
        let (requests, total) = self
            .db
            .list_pending_requests(user_id, page.offset(), page.limit())?;

        let ids: Vec<i64> = requests.iter().map(|r| r.requester_id).collect();
        let mut profiles = profile_map(self.profiles.as_ref(), &ids)?;

        let items = requests
            .into_iter()
            .map(|r| PendingRequestView {
                id: r.id,
                requester_id: r.requester_id,
                created_at: r.created_at,
                requester: profiles.remove(&r.requester_id),
            })
            .collect();
        Ok(Paged::new(items, total, page))
    }

    pub fn remove_friend(&self, user_id: i64, friend_id: i64) -> ServiceResult<()> {
        if friend_id <= 0 || friend_id == user_id {
            return Err(ServiceError::invalid("invalid friend id"));
        }
        let removed = self.db.remove_friendship(user_id, friend_id)?;
        if removed == 0 {
            return Err(ServiceError::NotFound("friend"));
        }
        info!("User {} removed friend {}", user_id, friend_id);
        Ok(())
    }

    pub fn list_friend_ids(&self, user_id: i64, page: Page) -> ServiceResult<Paged<i64>> {
        let (ids, total) = self.db.list_friend_ids(user_id, page.offset(), page.limit())?;
        Ok(Paged::new(ids, total, page))
    }

    /// Friend profiles in the same order as `list_friend_ids`.
    pub fn list_friend_details(&self, user_id: i64, page: Page) -> ServiceResult<Paged<Profile>> {
        let ids = self.list_friend_ids(user_id, page)?;
        let mut profiles = profile_map(self.profiles.as_ref(), &ids.items)?;
        let items = ids.items.iter().filter_map(|id| profiles.remove(id)).collect();
        Ok(Paged::new(items, ids.total, page))
    }

    pub fn are_friends(&self, a: i64, b: i64) -> ServiceResult<bool> {
        Ok(self.db.are_friends(a, b)?)
    }
}
