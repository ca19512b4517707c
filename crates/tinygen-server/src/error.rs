//! Translation of domain errors to HTTP responses.
//!
//! Every failure reaches the caller as the nearest HTTP status with a JSON
//! `detail` body; nothing is retried, nothing is logged-and-swallowed.

use salvo::http::{header, StatusCode};
use salvo::{async_trait, writing::Json, Depot, Request, Response, Writer};
use serde::Serialize;
use thiserror::Error;

use tinygen_auth::AuthError;
use tinygen_engine::{CompletionError, GenerateError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("incorrect username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::DuplicateUsername | AuthError::WeakPassword(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Auth(AuthError::InvalidToken) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Completion(CompletionError::NotReady) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Completion(CompletionError::Generate(GenerateError::InvalidParameter(
                _,
            ))) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Completion(CompletionError::Generate(GenerateError::Failed(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub detail: String,
}

#[async_trait]
impl Writer for ApiError {
    async fn write(mut self, _req: &mut Request, _depot: &mut Depot, res: &mut Response) {
        let status = self.status_code();
        res.status_code(status);

        if status == StatusCode::UNAUTHORIZED {
            res.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }

        res.render(Json(ErrorBody {
            detail: self.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Auth(AuthError::DuplicateUsername).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Auth(AuthError::WeakPassword("too short")).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Auth(AuthError::InvalidToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Validation("bad field".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Completion(CompletionError::NotReady).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Completion(CompletionError::Generate(GenerateError::InvalidParameter(
                "max_tokens must be positive"
            )))
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Completion(CompletionError::Generate(GenerateError::Failed(
                "out of memory".to_string()
            )))
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_engine_failure_message_passes_through() {
        let err = ApiError::Completion(CompletionError::Generate(GenerateError::Failed(
            "out of memory".to_string(),
        )));
        assert!(err.to_string().contains("out of memory"));
    }
}
