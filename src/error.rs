use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::geocoding::GeocodingError;

/// RepositoryError
///
/// Failures surfaced by the entity store. `Conflict` is a unique-constraint violation the caller
/// can act on (a taken username); everything else is an unrecoverable store fault.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// AppError
///
/// The single fault type request handlers propagate with `?`.
///
/// Only the client-error variants carry their message back to the caller. Store, storage,
/// geocoding and session faults are logged in full and answered with a generic 500.
#[derive(Debug, Error)]
pub enum AppError {
    /// Validation Gate rejection; the message is the comma-joined list of violations.
    #[error("{0}")]
    Validation(String),

    /// Malformed request body (e.g. a broken multipart stream).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request body over the route's size limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Geocoding error: {0}")]
    Geocoding(#[from] GeocodingError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(message) => {
                tracing::debug!(%message, "validation rejected request");
                (StatusCode::BAD_REQUEST, message.clone())
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            AppError::Repository(e) => {
                tracing::error!("Repository error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Geocoding(e) => {
                tracing::error!("Geocoding error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Session(e) => {
                tracing::error!("Session error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Keeps the status the multipart parser chose: 413 for an oversized body, 400 otherwise.
impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(error: axum::extract::multipart::MultipartError) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(error.body_text())
        } else {
            AppError::BadRequest(error.body_text())
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
