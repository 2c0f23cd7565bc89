use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pdf_qa_core::{IngestError, QueryError, StoreError};
use serde_json::json;
use tracing::error;

/// Error response rendered as `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, detail = %self.detail, "request failed");
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(value: IngestError) -> Self {
        match value {
            IngestError::NotPdf(_) => Self::bad_request("Please upload a PDF file."),
            IngestError::MissingFileName(_)
            | IngestError::InvalidChunkConfig(_)
            | IngestError::InvalidArgument(_)
            | IngestError::Storage(StoreError::InvalidName(_)) => {
                Self::bad_request(value.to_string())
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(value: QueryError) -> Self {
        match value {
            QueryError::InvalidArgument(_) | QueryError::Storage(StoreError::InvalidName(_)) => {
                Self::bad_request(value.to_string())
            }
            QueryError::NotLoaded(_)
            | QueryError::RawTextMissing(_)
            | QueryError::MissingArtifacts(_) => Self::not_found(value.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InvalidName(_) => Self::bad_request(value.to_string()),
            StoreError::NotFound(_) => Self::not_found(value.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(value: MultipartError) -> Self {
        Self::new(value.status(), value.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(value: MultipartRejection) -> Self {
        Self::new(value.status(), value.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::new(value.status(), value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self::new(value.status(), value.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        let error = ApiError::from(IngestError::NotPdf("notes.txt".to_string()));
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.detail, "Please upload a PDF file.");

        let error = ApiError::from(IngestError::InvalidChunkConfig("overlap".to_string()));
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unloaded_contexts_map_to_not_found() {
        let error = ApiError::from(QueryError::NotLoaded("policy".to_string()));
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert!(error.detail.contains("policy"));
    }

    #[test]
    fn missing_artifacts_map_to_not_found() {
        let error = ApiError::from(QueryError::MissingArtifacts("policy".to_string()));
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn provider_failures_map_to_internal_errors() {
        let error = ApiError::from(StoreError::Presign {
            key: "policy.pdf".to_string(),
            details: "no credentials".to_string(),
        });
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.detail.contains("no credentials"));
    }
}
