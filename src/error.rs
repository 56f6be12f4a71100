use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::{RepoError, MAX_THREAD_DEPTH};

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not authenticated")] Unauthenticated,
    #[error("token is not valid")] InvalidToken,
    #[error("you can only modify your own resource")] NotOwner,
    #[error("wrong username or password")] InvalidCredentials,
    #[error("{0}")] BadRequest(String),
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::NotOwner => ApiError::NotOwner,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::TooDeep => {
                ApiError::BadRequest(format!("replies nest at most {MAX_THREAD_DEPTH} levels deep"))
            }
            RepoError::Internal(detail) => {
                // detail stays in the server log
                tracing::error!(%detail, "store failure");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::InvalidToken | ApiError::NotOwner => StatusCode::FORBIDDEN,
            ApiError::InvalidCredentials | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string() })
    }
}
