use axum::Json;
use serde::Serialize;
use tracing::error;

use tether_core::ServiceResult;

use crate::error::{ApiError, ApiResult};

/// Success envelope: `{"code": 200, "message": "success", "data": ...}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: &'static str,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        code: 200,
        message: "success",
        data,
    })
}

/// Run service work on the blocking pool and wrap the result in the
/// success envelope.
pub async fn blocking<T, F>(f: F) -> ApiResult<Json<Envelope<T>>>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let data = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })??;
    Ok(ok(data))
}
