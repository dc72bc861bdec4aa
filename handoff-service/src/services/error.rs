use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

/// Terminal outcomes of a handoff step. None of these are retried by the server.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("This approval link is not valid.")]
    InvalidProof,

    #[error("This request has expired or does not exist.")]
    NotFound,

    #[error("This link has expired or was already used.")]
    Gone,

    #[error("You are not allowed to approve this request.")]
    Forbidden,

    #[error("This request has not been approved yet.")]
    NotApproved,

    #[error("This link was already used.")]
    AlreadyConsumed,

    #[error("Sign in required.")]
    Unauthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage backend failure")]
    Store(#[source] anyhow::Error),

    #[error("Session failure")]
    Session(#[source] anyhow::Error),

    #[error("Internal failure")]
    Internal(#[source] anyhow::Error),
}

impl HandoffError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HandoffError::InvalidProof | HandoffError::Forbidden | HandoffError::NotApproved => {
                StatusCode::FORBIDDEN
            }
            HandoffError::NotFound | HandoffError::Gone => StatusCode::GONE,
            HandoffError::AlreadyConsumed => StatusCode::BAD_REQUEST,
            HandoffError::Unauthenticated => StatusCode::UNAUTHORIZED,
            HandoffError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HandoffError::Store(_) | HandoffError::Session(_) | HandoffError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine-readable label, used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HandoffError::InvalidProof => "invalid_proof",
            HandoffError::NotFound => "not_found",
            HandoffError::Gone => "gone",
            HandoffError::Forbidden => "forbidden",
            HandoffError::NotApproved => "not_approved",
            HandoffError::AlreadyConsumed => "already_consumed",
            HandoffError::Unauthenticated => "unauthenticated",
            HandoffError::InvalidInput(_) => "invalid_input",
            HandoffError::Store(_) => "store",
            HandoffError::Session(_) => "session",
            HandoffError::Internal(_) => "internal",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            HandoffError::Store(_) | HandoffError::Session(_) | HandoffError::Internal(_)
        )
    }
}

impl From<tower_sessions::session::Error> for HandoffError {
    fn from(err: tower_sessions::session::Error) -> Self {
        HandoffError::Session(anyhow::Error::new(err))
    }
}

impl From<HandoffError> for AppError {
    fn from(err: HandoffError) -> Self {
        let message = anyhow::anyhow!(err.to_string());
        match err {
            HandoffError::InvalidProof | HandoffError::Forbidden | HandoffError::NotApproved => {
                AppError::Forbidden(message)
            }
            HandoffError::NotFound | HandoffError::Gone => AppError::Gone(message),
            HandoffError::AlreadyConsumed => AppError::BadRequest(message),
            HandoffError::Unauthenticated => AppError::Unauthorized(message),
            HandoffError::InvalidInput(_) => AppError::Unprocessable(message),
            HandoffError::Store(e) | HandoffError::Session(e) | HandoffError::Internal(e) => {
                AppError::InternalError(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_have_distinct_statuses() {
        assert_eq!(HandoffError::InvalidProof.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(HandoffError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(HandoffError::Gone.status_code(), StatusCode::GONE);
        assert_eq!(HandoffError::NotFound.status_code(), StatusCode::GONE);
        assert_eq!(HandoffError::NotApproved.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(HandoffError::AlreadyConsumed.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_failures_map_to_opaque_internal_error() {
        let err = HandoffError::Store(anyhow::anyhow!("connection refused"));
        assert!(err.is_internal());
        assert!(!err.to_string().contains("refused"));
        let app: AppError = err.into();
        assert_eq!(app.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
