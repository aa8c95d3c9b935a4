use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::{JsonRejection, QueryRejection}},
    response::IntoResponse,
};

use tether_types::api::{MarkReadRequest, MarkReadResponse};
use tether_types::paging::{Page, PageQuery};

use crate::auth::AppState;
use crate::error::ApiResult;
use crate::middleware::CurrentUser;
use crate::response::blocking;

/// Messages exchanged with `peer_id`, newest first.
pub async fn history(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(peer_id): Path<i64>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let chat = state.services.chat.clone();
    blocking(move || chat.history_view(user_id, peer_id, Page::from(query))).await
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    body: Result<Json<MarkReadRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = body?;
    let chat = state.services.chat.clone();
    blocking(move || {
        let updated = chat.mark_read(user_id, req.peer_id, req.before_id)?;
        Ok(MarkReadResponse {
            peer_id: req.peer_id,
            before_id: req.before_id,
            updated,
        })
    })
    .await
}

/// Private and group conversations merged by last activity.
pub async fn conversations(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let conversations = state.services.conversations.clone();
    blocking(move || conversations.list(user_id, Page::from(query))).await
}
