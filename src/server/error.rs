//! Error responses for the HTTP API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::error::ExtractError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Upload too large")]
    PayloadTooLarge,

    #[error("PDF file not found. Please upload the file again.")]
    SourceNotFound,

    #[error("Failed to extract pages: {0}")]
    ExtractionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

impl ServerError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ServerError::InvalidUpload(_) => (StatusCode::BAD_REQUEST, "INVALID_UPLOAD"),
            ServerError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ServerError::SourceNotFound => (StatusCode::BAD_REQUEST, "SOURCE_NOT_FOUND"),
            ServerError::ExtractionFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "EXTRACTION_FAILED")
            }
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(code, error = %self, "Request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ExtractError> for ServerError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::InvalidRequest(msg) => ServerError::InvalidRequest(msg),
            ExtractError::SourceMissing(_) => ServerError::SourceNotFound,
            err @ (ExtractError::Tool { .. }
            | ExtractError::PageCountUnknown(_)
            | ExtractError::MissingOutput(_)
            | ExtractError::Archive(_)) => ServerError::ExtractionFailed(err.to_string()),
            ExtractError::Io(e) => ServerError::Internal(e.to_string()),
        }
    }
}
