use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecapError>;

#[derive(Debug, Error)]
pub enum RecapError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The history or request source returned a failure or unusable payload.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ResponseError for RecapError {
    fn error_response(&self) -> HttpResponse {
        let (code, message) = match self {
            RecapError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            RecapError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            RecapError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            RecapError::Http(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        HttpResponse::build(code).json(ErrorResponse {
            error: message,
            code: code.as_u16(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            RecapError::NotFound(_) => StatusCode::NOT_FOUND,
            RecapError::Validation(_) => StatusCode::BAD_REQUEST,
            RecapError::Upstream(_) | RecapError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
