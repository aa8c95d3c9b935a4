use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    response::IntoResponse,
};
use serde_json::json;

use tether_types::api::{
    AddMembersRequest, CreateGroupRequest, GroupReadRequest, GroupSearchQuery, UnreadResponse, UpdateGroupRequest,
};
use tether_types::paging::{Page, PageQuery};

use crate::auth::AppState;
use crate::error::ApiResult;
use crate::middleware::CurrentUser;
use crate::response::blocking;

pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let groups = state.services.groups.clone();
    blocking(move || groups.create(user_id, &req.name, &req.member_ids, &req.avatar)).await
}

/// Groups the caller belongs to.
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let groups = state.services.groups.clone();
    blocking(move || groups.list_user_groups(user_id, Page::from(query))).await
}

pub async fn search(
    State(state): State<AppState>,
    query: Result<Query<GroupSearchQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let groups = state.services.groups.clone();
    blocking(move || groups.search(&query.q, query.limit)).await
}

pub async fn get(State(state): State<AppState>, Path(group_id): Path<i64>) -> ApiResult<impl IntoResponse> {
    let groups = state.services.groups.clone();
    blocking(move || groups.get(group_id)).await
}

pub async fn update(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
    body: Result<Json<UpdateGroupRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let groups = state.services.groups.clone();
    blocking(move || groups.update_group(user_id, group_id, &req.name, &req.avatar)).await
}

pub async fn join(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.services.groups.clone();
    blocking(move || {
        groups.join(group_id, user_id)?;
        Ok(json!({ "group_id": group_id }))
    })
    .await
}

pub async fn messages(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let groups = state.services.groups.clone();
    blocking(move || {
        groups.require_member(group_id, user_id)?;
        groups.list_messages_view(group_id, Page::from(query))
    })
    .await
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
    body: Result<Json<GroupReadRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let groups = state.services.groups.clone();
    blocking(move || {
        groups.require_member(group_id, user_id)?;
        groups.update_last_read(group_id, user_id, req.msg_id)?;
        Ok(UnreadResponse {
            group_id,
            unread: groups.count_unread(group_id, user_id)?,
        })
    })
    .await
}

pub async fn unread(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.services.groups.clone();
    blocking(move || {
        groups.require_member(group_id, user_id)?;
        Ok(UnreadResponse {
            group_id,
            unread: groups.count_unread(group_id, user_id)?,
        })
    })
    .await
}

pub async fn members(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.services.groups.clone();
    blocking(move || {
        groups.require_member(group_id, user_id)?;
        groups.list_members(group_id)
    })
    .await
}

pub async fn add_members(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
    body: Result<Json<AddMembersRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let groups = state.services.groups.clone();
    blocking(move || {
        groups.add_members(user_id, group_id, &req.user_ids)?;
        groups.list_members(group_id)
    })
    .await
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path((group_id, target_id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let groups = state.services.groups.clone();
    blocking(move || {
        groups.remove_member(user_id, group_id, target_id)?;
        Ok(json!({ "group_id": group_id, "user_id": target_id }))
    })
    .await
}
