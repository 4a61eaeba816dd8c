use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;
use uuid::Uuid;

use crate::api::types::{timestamp, ErrorResponse};
use crate::members::profile::RefreshError;
use crate::members::StoreError;
use crate::search::SearchError;
use crate::storage::profile_pictures::UploadError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("Query is required")]
    MissingQuery,
    #[error("Query must be at least 3 characters long")]
    QueryTooShort,
    #[error("Limit must be a positive integer")]
    InvalidLimit,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Invalid member id: {0}")]
    InvalidMemberId(String),
    #[error("Member {0} not found")]
    MemberNotFound(Uuid),
    #[error("Upload body is empty")]
    EmptyUpload,
    #[error("File exceeds the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    #[error("Object storage failed: {0}")]
    StorageFailed(String),
    #[error("Search failed: {0}")]
    SearchFailed(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Error code (for logs and metrics) and HTTP status of each variant.
    fn error_metadata(&self) -> (&'static str, u16) {
        match self {
            // Request validation (400)
            ApiError::RequestParsingError(_) => ("request_parsing_error", 400),
            ApiError::MissingQuery => ("missing_query", 400),
            ApiError::QueryTooShort => ("query_too_short", 400),
            ApiError::InvalidLimit => ("invalid_limit", 400),
            ApiError::InvalidMemberId(_) => ("invalid_member_id", 400),
            ApiError::EmptyUpload => ("empty_upload", 400),

            ApiError::MemberNotFound(_) => ("member_not_found", 404),
            ApiError::MethodNotAllowed => ("method_not_allowed", 405),
            ApiError::PayloadTooLarge(_) => ("payload_too_large", 413),
            ApiError::UnsupportedMediaType(_) => ("unsupported_media_type", 415),

            // Upstream failures
            ApiError::EmbeddingFailed(_) => ("embedding_failed", 502),
            ApiError::StorageFailed(_) => ("storage_failed", 502),
            ApiError::DatabaseUnavailable => ("database_unavailable", 503),

            ApiError::SearchFailed(_) => ("search_failed", 500),
            ApiError::Internal(_) => ("internal_error", 500),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        let (_, status) = self.error_metadata();
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Message returned to the caller. Server-side failures keep their detail in the logs.
    fn client_message(&self) -> String {
        match self {
            ApiError::RequestParsingError(e) => format!("Invalid request body: {e}"),
            ApiError::EmbeddingFailed(_) => "Failed to generate embedding".to_string(),
            ApiError::StorageFailed(_) => "Failed to store file".to_string(),
            ApiError::DatabaseUnavailable => {
                "Service is currently unavailable. Please try again later.".to_string()
            }
            ApiError::SearchFailed(_) => "Search failed".to_string(),
            ApiError::Internal(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MemberNotFound(id) => ApiError::MemberNotFound(id),
            StoreError::DatabaseUnavailable | StoreError::Timeout => ApiError::DatabaseUnavailable,
            e @ (StoreError::MissingSchema(_) | StoreError::Database(_)) => {
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<RefreshError> for ApiError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::Store(e) => e.into(),
            RefreshError::Embedding(e) => ApiError::EmbeddingFailed(e.to_string()),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::EmptyBody => ApiError::EmptyUpload,
            UploadError::TooLarge { max, .. } => ApiError::PayloadTooLarge(max),
            UploadError::UnsupportedMediaType(t) => ApiError::UnsupportedMediaType(t),
            UploadError::Store(e) => e.into(),
            UploadError::Storage(e) => ApiError::StorageFailed(e.to_string()),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        ApiError::SearchFailed(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, _) = self.error_metadata();
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code, "request failed: {}", self);
        } else {
            tracing::debug!(code, "request rejected: {}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.client_message(),
            timestamp: timestamp(),
        };
        (status, Json(body)).into_response()
    }
}
