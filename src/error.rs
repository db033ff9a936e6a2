use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

/// Wire shape for every failure: `{"success": false, "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("username already exists")]
    DuplicateUsername,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("your account has been banned")]
    AccountBanned,
    #[error("not logged in")]
    Unauthenticated,
    #[error("admin access required")]
    Unauthorized,
    #[error("image too large, max size: {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    #[error("invalid message type")]
    InvalidMessageType,
    #[error("cannot delete your own account")]
    SelfDeleteForbidden,
    #[error("not found")]
    NotFound,
    #[error("storage failure")]
    Storage,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::DuplicateUsername,
            RepoError::Internal(msg) => {
                log::error!("repository failure: {msg}");
                ApiError::Storage
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::InvalidInput(_)
            | ApiError::InvalidMessageType
            | ApiError::SelfDeleteForbidden => StatusCode::BAD_REQUEST,
            ApiError::DuplicateUsername => StatusCode::CONFLICT,
            ApiError::InvalidCredentials | ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::AccountBanned | ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody {
            success: false,
            message: self.to_string(),
        })
    }
}
