use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    response::IntoResponse,
};
use serde_json::json;

use tether_types::api::FriendRequestBody;
use tether_types::paging::{Page, PageQuery};

use crate::auth::AppState;
use crate::error::ApiResult;
use crate::middleware::CurrentUser;
use crate::response::blocking;

pub async fn send_request(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<FriendRequestBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let friends = state.services.friends.clone();
    blocking(move || friends.request_friend(user_id, &req.email)).await
}

pub async fn list_pending(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let friends = state.services.friends.clone();
    blocking(move || friends.list_pending(user_id, Page::from(query))).await
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(request_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let friends = state.services.friends.clone();
    blocking(move || {
        friends.accept_request(user_id, request_id)?;
        Ok(json!({ "request_id": request_id, "status": "accepted" }))
    })
    .await
}

pub async fn decline(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(request_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let friends = state.services.friends.clone();
    blocking(move || {
        friends.decline_request(user_id, request_id)?;
        Ok(json!({ "request_id": request_id, "status": "declined" }))
    })
    .await
}

/// Friend profiles, newest friendship first.
pub async fn list_friends(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let friends = state.services.friends.clone();
    blocking(move || friends.list_friend_details(user_id, Page::from(query))).await
}

pub async fn list_friend_ids(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let friends = state.services.friends.clone();
    blocking(move || friends.list_friend_ids(user_id, Page::from(query))).await
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(friend_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let friends = state.services.friends.clone();
    blocking(move || {
        friends.remove_friend(user_id, friend_id)?;
        Ok(json!({ "friend_id": friend_id }))
    })
    .await
}
