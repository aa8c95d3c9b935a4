pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use tether_api::auth::{AppState, AppStateInner, decode_token};
use tether_api::error::ApiError;
use tether_core::{MediaProfiles, ProfileLookup, Services};
use tether_db::Database;
use tether_gateway::{Dispatcher, Hub, connection};

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    hub: Hub,
    jwt_secret: String,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// Wire services, gateway and routes around one database.
pub fn build_app(db: Arc<Database>, config: &Config) -> Router {
    let profiles: Arc<dyn ProfileLookup> = Arc::new(MediaProfiles::new(db.clone(), config.media_base_url.clone()));
    let services = Services::new(db.clone(), profiles.clone());

    let dispatcher = Dispatcher::new(config.mailbox_capacity);
    let hub = Hub::new(
        Arc::new(dispatcher.clone()),
        services.chat.clone(),
        services.groups.clone(),
        profiles,
    );

    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        services,
        jwt_secret: config.jwt_secret.clone(),
    });

    let gateway_state = GatewayState {
        db,
        dispatcher,
        hub,
        jwt_secret: config.jwt_secret.clone(),
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let api = tether_api::routes(app_state).merge(ws_route);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Authenticate before upgrading; browsers cannot set headers on a
/// WebSocket, so `?token=` is accepted as well.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = match (&bearer, &query.token) {
        (Some(TypedHeader(Authorization(bearer))), _) => bearer.token(),
        (None, Some(token)) => token.as_str(),
        (None, None) => return ApiError::Unauthorized.into_response(),
    };

    let Some(user_id) = decode_token(&state.jwt_secret, token) else {
        debug!("Rejected gateway upgrade with invalid token");
        return ApiError::Unauthorized.into_response();
    };

    // Tokens outlive accounts; only existing users get a mailbox.
    let db = state.db.clone();
    match tokio::task::spawn_blocking(move || db.get_user_by_id(user_id)).await {
        Ok(Ok(Some(_))) => {}
        Ok(Ok(None)) => {
            debug!("Rejected gateway upgrade for unknown user {}", user_id);
            return ApiError::Unauthorized.into_response();
        }
        Ok(Err(e)) => {
            error!("User lookup for gateway upgrade failed: {:#}", e);
            return ApiError::Internal.into_response();
        }
        Err(e) => {
            error!("User lookup task failed: {}", e);
            return ApiError::Internal.into_response();
        }
    }

    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.dispatcher, state.hub, user_id))
}
