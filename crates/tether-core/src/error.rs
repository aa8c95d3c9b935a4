use thiserror::Error;

/// Failure of a service-level operation.
///
/// Every variant except `Storage` is a rule violation the caller can act
/// on. `Storage` wraps whatever the store layer reported and is never shown
/// to clients verbatim.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("permission denied")]
    PermissionDenied,

    #[error("not friends")]
    NotFriends,

    #[error("not a group member")]
    NotAMember,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    /// Stable machine-readable kind, shared by REST bodies and gateway
    /// error frames.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "invalid_params",
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::NotFriends => "not_friends",
            Self::NotAMember => "not_a_member",
            Self::Storage(_) => "internal",
        }
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_detail_is_hidden() {
        let err = ServiceError::from(anyhow::anyhow!("disk I/O error at page 7"));
        assert_eq!(err.kind(), "internal");
        assert_eq!(err.public_message(), "internal error");
    }

    #[test]
    fn kinds_are_snake_case() {
        assert_eq!(ServiceError::NotFound("group").to_string(), "group not found");
        assert_eq!(ServiceError::NotFriends.kind(), "not_friends");
        assert_eq!(ServiceError::invalid("empty content").kind(), "invalid_params");
    }
}
