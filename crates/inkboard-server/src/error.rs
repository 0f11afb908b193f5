use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inkboard_core::{CollaborationError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or invalid x-user-id header")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Collaboration(#[from] CollaborationError),
}

pub type ApiResult<T> = Result<T, ApiError>;

fn storage_status(e: &StorageError) -> StatusCode {
    match e {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Conflict(_) => StatusCode::CONFLICT,
        StorageError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        StorageError::Serialization(_) => StatusCode::BAD_REQUEST,
        StorageError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StorageError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(e) => storage_status(e),
            ApiError::Collaboration(e) => match e {
                CollaborationError::AlreadyCollaborator(_) => StatusCode::CONFLICT,
                CollaborationError::UnknownUser(_) | CollaborationError::NotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                CollaborationError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                CollaborationError::OwnerAssignment | CollaborationError::OwnerImmutable => {
                    StatusCode::FORBIDDEN
                }
                CollaborationError::Storage(e) => storage_status(e),
            },
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
