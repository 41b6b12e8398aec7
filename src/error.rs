use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;
use tracing::error;

pub type AppResult<T> = Result<T, AppError>;
pub type EngineResult<T> = Result<T, EngineError>;

/// Error taxonomy of the record engine. Auth failures intentionally share a
/// display string so the API never tells a caller which check failed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("Record does not exist")]
    RecordNotFound,
    #[error("error: attachment not found")]
    AttachmentNotFound,
    #[error("Schedule does not exist")]
    ScheduleNotFound,
    #[error("file type not allowed : {0}")]
    UnsupportedType(String),
    #[error("Invalid or missing authenticity token.")]
    MalformedToken,
    #[error("Invalid auth-token")]
    InvalidToken,
    #[error("Invalid auth-token")]
    UserNotFound,
    #[error("You are not allowed to use this API")]
    Unauthorized,
    #[error("internal integrity failure: {0}")]
    Integrity(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    errors: Vec<String>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            errors: vec![message.into()],
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal<E: Display>(error: E) -> Self {
        error!(error = %error, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            errors: self.errors,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    errors: Vec<String>,
}

impl From<EngineError> for AppError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Validation(_) | EngineError::UnsupportedType(_) => {
                AppError::unprocessable(value.to_string())
            }
            EngineError::RecordNotFound
            | EngineError::AttachmentNotFound
            | EngineError::ScheduleNotFound => AppError::not_found(value.to_string()),
            EngineError::MalformedToken | EngineError::InvalidToken | EngineError::UserNotFound => {
                AppError::unauthorized(value.to_string())
            }
            EngineError::Unauthorized => AppError::forbidden(value.to_string()),
            EngineError::Integrity(_) | EngineError::Storage(_) => AppError::internal(value),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}
