//! 统一的 API 错误类型与转换。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::io::ErrorKind;
use tracing::error;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Rejected {
        message: String,
        rejected: Vec<String>,
    },
    Unauthorized(String),
    NotFound(String),
    PayloadTooLarge(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rejected: Vec<String>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Rejected { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Rejected { message, rejected } => ErrorBody { message, rejected },
            ApiError::BadRequest(message)
            | ApiError::Unauthorized(message)
            | ApiError::NotFound(message)
            | ApiError::PayloadTooLarge(message)
            | ApiError::Internal(message) => ErrorBody {
                message,
                rejected: Vec::new(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidName => ApiError::BadRequest("invalid file name".into()),
            StorageError::NotFound => ApiError::NotFound("File not found".into()),
            StorageError::Io(err) => match err.kind() {
                ErrorKind::NotFound => ApiError::NotFound("File not found".into()),
                _ => {
                    error!(error = %err, "storage failure");
                    ApiError::Internal("internal server error".into())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::io;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn rejected_lists_blocked_names() {
        let (status, body) = body_json(ApiError::Rejected {
            message: "No valid files uploaded.".into(),
            rejected: vec!["virus.exe".into()],
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No valid files uploaded.");
        assert_eq!(body["rejected"][0], "virus.exe");
    }

    #[tokio::test]
    async fn io_errors_are_generic_server_failures() {
        let error = ApiError::from(StorageError::Io(io::Error::other("disk on fire")));
        let (status, body) = body_json(error).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "internal server error");
        assert!(body.get("rejected").is_none());
    }

    #[test]
    fn storage_errors_map_to_client_statuses() {
        assert_eq!(
            ApiError::from(StorageError::InvalidName).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        let missing = io::Error::new(ErrorKind::NotFound, "gone");
        assert_eq!(
            ApiError::from(StorageError::Io(missing)).status(),
            StatusCode::NOT_FOUND
        );
    }
}
