use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use tether_core::ServiceError;

/// Errors a handler can return. Rendered as
/// `{"code": <status>, "kind": "...", "message": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    kind: &'a str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(e) => match e {
                ServiceError::InvalidParams(_) => StatusCode::BAD_REQUEST,
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::PermissionDenied | ServiceError::NotFriends | ServiceError::NotAMember => {
                    StatusCode::FORBIDDEN
                }
                ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(e) => e.kind(),
            Self::Unauthorized => "unauthorized",
            Self::BadRequest(_) => "invalid_params",
            Self::Conflict(_) => "conflict",
            Self::Internal => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Service(ServiceError::Storage(e)) => {
                error!("Storage failure: {:#}", e);
                "internal error".to_string()
            }
            Self::Service(e) => e.public_message(),
            other => other.to_string(),
        };

        let status = self.status();
        let body = ErrorBody {
            code: status.as_u16(),
            kind: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}
