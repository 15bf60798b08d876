use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mediadesk_auth::AuthError;
use mediadesk_core::request_number::ParseRequestNumberError;
use mediadesk_core::CoreError;
use mediadesk_storage::StorageError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<ParseRequestNumberError> for ApiError {
    fn from(e: ParseRequestNumberError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl ApiError {
    /// The same call may succeed shortly
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Core(e) if e.is_transient())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(StorageError::NotConfigured(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(StorageError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Core(e) => e.code(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::Storage(_) => "storage_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Core(e) => e.public_message(),
            ApiError::Storage(StorageError::InvalidName(_)) => self.to_string(),
            ApiError::Storage(_) => "The storage provider could not complete the request".to_string(),
            ApiError::Internal(_) => "Unable to process request. Please try again later.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{} ({}): {}", status, self.code(), self);
        } else {
            tracing::warn!("{} ({}): {}", status, self.code(), self);
        }

        let body = Json(json!({
            "error": self.code(),
            "message": self.message(),
        }));
        let mut response = (status, body).into_response();
        if self.is_transient() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
