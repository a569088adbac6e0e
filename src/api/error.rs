use crate::services::credential_store::AuthError;
use crate::services::file_service::FileOpError;
use crate::services::login_throttle::ThrottleError;
use crate::services::path_resolver::PathError;
use crate::services::session::SessionError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported Media Type: {0}")]
    UnsupportedMediaType(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => {
                AppError::Unauthorized("Invalid credentials".to_string())
            }
            AuthError::DuplicateIdentifier => {
                AppError::Conflict("Identifier already exists".to_string())
            }
            AuthError::InvalidIdentifier | AuthError::WeakPassword => {
                AppError::BadRequest(e.to_string())
            }
            AuthError::UserNotFound => AppError::NotFound("User not found".to_string()),
            AuthError::Hashing(msg) => AppError::Internal(msg),
            AuthError::Database(db) => AppError::Database(db),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound | SessionError::Expired => {
                tracing::debug!("Session rejected: {}", e);
                AppError::Unauthorized("Unauthorized".to_string())
            }
            SessionError::Lookup(inner) => inner.into(),
        }
    }
}

impl From<PathError> for AppError {
    fn from(e: PathError) -> Self {
        match e {
            PathError::PathTraversal => AppError::Forbidden("Access denied".to_string()),
            PathError::InvalidInput(msg) => AppError::BadRequest(format!("Invalid path: {}", msg)),
            PathError::Io(io) => AppError::Internal(io.to_string()),
        }
    }
}

impl From<FileOpError> for AppError {
    fn from(e: FileOpError) -> Self {
        match e {
            FileOpError::NotFound => AppError::NotFound("Not found".to_string()),
            FileOpError::NotADirectory => AppError::BadRequest("Not a directory".to_string()),
            FileOpError::IsADirectory => AppError::Conflict("Is a directory".to_string()),
            FileOpError::AlreadyExists => AppError::Conflict("Already exists".to_string()),
            FileOpError::PayloadTooLarge { limit } => AppError::PayloadTooLarge(format!(
                "File exceeds the maximum allowed size of {} bytes",
                limit
            )),
            FileOpError::UnsupportedType(ext) => {
                AppError::UnsupportedMediaType(format!("File type '.{}' is not allowed", ext))
            }
            FileOpError::Path(path) => path.into(),
            FileOpError::IoFailure(io) => AppError::Internal(io.to_string()),
        }
    }
}

impl From<ThrottleError> for AppError {
    fn from(e: ThrottleError) -> Self {
        AppError::TooManyRequests(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            AppError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
