use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};

use crate::auth::{AppState, decode_token};
use crate::error::ApiError;

/// The authenticated caller, inserted into request extensions by
/// `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);

/// Extract and validate the bearer JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;
    let user_id = decode_token(&state.jwt_secret, bearer.token()).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(CurrentUser(user_id));
    Ok(next.run(req).await)
}
