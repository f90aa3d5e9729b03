use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use editor_hub_core::{callback::CallbackAck, Error};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub request_id: String,
}

/// Read-path failure.
#[derive(Debug)]
pub enum ApiError {
    Core(Error),
    Forbidden,
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Core(e)
    }
}

fn classify(e: &Error) -> (StatusCode, &'static str) {
    match e {
        Error::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Error::MissingDigest => (StatusCode::BAD_REQUEST, "MISSING_DIGEST"),
        Error::AttachmentOutOfRange { .. } => (StatusCode::BAD_REQUEST, "BAD_INDEX"),
        Error::NoContent => (StatusCode::BAD_REQUEST, "NO_CONTENT"),
        Error::UnsupportedFileType(_) => (StatusCode::BAD_REQUEST, "UNSUPPORTED_FILE_TYPE"),
        Error::StaleReference => (StatusCode::CONFLICT, "STALE_REFERENCE"),
        e if e.is_auth() => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status, code, message) = match &self {
            ApiError::Core(e) => {
                let (status, code) = classify(e);
                (status, code, e.to_string())
            }
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "token does not grant access to this document".to_string(),
            ),
        };
        if status.is_server_error() {
            error!(%request_id, error = %message, "request failed");
        } else {
            warn!(%request_id, error = %message, "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
                request_id,
            }),
        )
            .into_response()
    }
}

/// Callback acknowledgement: 200 on success, 401 for authentication
/// failures, 500 for anything else.
pub fn callback_response(doc_id: &str, result: Result<(), Error>) -> (StatusCode, Json<CallbackAck>) {
    match result {
        Ok(()) => (StatusCode::OK, Json(CallbackAck::ok())),
        Err(e) if e.is_auth() => {
            error!(doc = doc_id, error = %e, "security error while saving document");
            (StatusCode::UNAUTHORIZED, Json(CallbackAck::failed(e.to_string())))
        }
        Err(e) => {
            error!(doc = doc_id, error = %e, "error while saving document");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CallbackAck::failed(e.to_string())),
            )
        }
    }
}
