use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, extract::rejection::JsonRejection};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{error, info};

use tether_core::Services;
use tether_db::Database;
use tether_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::error::{ApiError, ApiResult};
use crate::response::{Envelope, ok};

/// Tokens stay valid for 30 days.
const TOKEN_TTL_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 8;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub services: Services,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<AuthResponse>>> {
    let Json(req) = body?;
    let email = req.email.trim().to_lowercase();

    // Validate input
    if !is_plausible_email(&email) {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let nickname = match req.nickname.trim() {
        "" => email.split('@').next().unwrap_or_default().to_string(),
        name => name.to_string(),
    };

    let db = state.db.clone();
    let user_id = tokio::task::spawn_blocking(move || -> ApiResult<i64> {
        if db.get_user_by_email(&email).map_err(storage)?.is_some() {
            return Err(ApiError::Conflict("email already registered".into()));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| {
                error!("Password hashing failed: {}", e);
                ApiError::Internal
            })?
            .to_string();

        db.create_user(&email, &password_hash, &nickname).map_err(storage)
    })
    .await
    .map_err(join_error)??;

    let token = create_token(&state.jwt_secret, user_id).map_err(storage)?;
    info!("Registered user {}", user_id);
    Ok(ok(AuthResponse { user_id, token }))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<AuthResponse>>> {
    let Json(req) = body?;
    let email = req.email.trim().to_lowercase();

    let db = state.db.clone();
    let user_id = tokio::task::spawn_blocking(move || -> ApiResult<i64> {
        let user = db
            .get_user_by_email(&email)
            .map_err(storage)?
            .ok_or(ApiError::Unauthorized)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|_| ApiError::Internal)?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::Unauthorized)?;
        Ok(user.id)
    })
    .await
    .map_err(join_error)??;

    let token = create_token(&state.jwt_secret, user_id).map_err(storage)?;
    Ok(ok(AuthResponse { user_id, token }))
}

pub fn create_token(secret: &str, user_id: i64) -> anyhow::Result<String> {
    let claims = Claims {
        app_user_id: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate a token and return the user id it was issued for.
pub fn decode_token(secret: &str, token: &str) -> Option<i64> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    let user_id = data.claims.app_user_id;
    (user_id > 0).then_some(user_id)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

fn storage(e: anyhow::Error) -> ApiError {
    ApiError::Service(e.into())
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::Internal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_user_id() {
        let token = create_token("s3cret", 42).unwrap();
        assert_eq!(decode_token("s3cret", &token), Some(42));
        assert_eq!(decode_token("other", &token), None);
        assert_eq!(decode_token("s3cret", "garbage"), None);
    }

    #[test]
    fn float_user_ids_in_claims_are_accepted() {
        let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp();
        let claims = serde_json::json!({ "app_user_id": 2.0, "exp": exp });
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap();
        assert_eq!(decode_token("k", &token), Some(2));
    }

    #[test]
    fn email_shape_check() {
        assert!(is_plausible_email("a@b.co"));
        assert!(!is_plausible_email("nobody"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a@localhost"));
    }
}
