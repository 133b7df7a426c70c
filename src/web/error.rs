use crate::core::RegistryError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Input(String),
    NotFound(String),
    Corrupt(String),
    Unavailable(String),
}

impl From<RegistryError> for WebError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(message) => Self::Input(message),
            err @ RegistryError::CorruptPayload { .. } => Self::Corrupt(err.to_string()),
            RegistryError::StoreUnavailable(message) => Self::Unavailable(message),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "validation_error"),
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found"),
            WebError::Corrupt(msg) => {
                error!(error = %msg, "stored record is corrupt");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, "corrupt_payload")
            }
            // Store outages carry no body; the status alone tells the caller
            // to back off and retry.
            WebError::Unavailable(msg) => {
                error!(error = %msg, "row store unavailable");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
