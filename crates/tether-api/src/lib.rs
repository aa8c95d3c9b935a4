pub mod auth;
pub mod chat;
pub mod error;
pub mod friends;
pub mod groups;
pub mod middleware;
pub mod response;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// REST routes, relative to the `/api/v1` prefix.
pub fn routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        // Friends
        .route("/friends", get(friends::list_friends))
        .route("/friends/ids", get(friends::list_friend_ids))
        .route("/friends/{friend_id}", delete(friends::remove_friend))
        .route("/friends/requests", post(friends::send_request).get(friends::list_pending))
        .route("/friends/requests/{id}/accept", post(friends::accept))
        .route("/friends/requests/{id}/decline", post(friends::decline))
        // Private chat
        .route("/chat/history/{peer_id}", get(chat::history))
        .route("/chat/read", post(chat::mark_read))
        .route("/chat/conversations", get(chat::conversations))
        // Groups
        .route("/groups", post(groups::create).get(groups::list_mine))
        .route("/groups/search", get(groups::search))
        .route("/groups/{id}", get(groups::get).put(groups::update))
        .route("/groups/{id}/join", post(groups::join))
        .route("/groups/{id}/messages", get(groups::messages))
        .route("/groups/{id}/read", post(groups::mark_read))
        .route("/groups/{id}/unread", get(groups::unread))
        .route("/groups/{id}/members", get(groups::members).post(groups::add_members))
        .route("/groups/{id}/members/{user_id}", delete(groups::remove_member))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
