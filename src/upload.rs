//! multipart 上传处理器。

use axum::extract::Extension;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::storage::{FileStore, IncomingFile, StoredFile};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadResponse {
    message: String,
    files: Vec<StoredFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rejected: Vec<String>,
}

/// 接收一个或多个文件并写入存储。
///
/// Every multipart field that carries a filename is treated as a file;
/// other fields are ignored.
pub async fn upload_files(
    Extension(storage): Extension<Arc<FileStore>>,
    mut multipart: Multipart,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if name.trim().is_empty() {
            warn!(
                field = field.name().unwrap_or_default(),
                "skipped file field with blank filename"
            );
            continue;
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        files.push(IncomingFile {
            name,
            bytes: bytes.to_vec(),
        });
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded.".into()));
    }

    let outcome = storage.upload(files).await?;
    if outcome.accepted.is_empty() {
        return Err(ApiError::Rejected {
            message: "No valid files uploaded.".into(),
            rejected: outcome.rejected,
        });
    }

    let message = if outcome.rejected.is_empty() {
        format!("{} files uploaded successfully", outcome.accepted.len())
    } else {
        format!(
            "{} files uploaded successfully, {} rejected (blocked file type)",
            outcome.accepted.len(),
            outcome.rejected.len()
        )
    };
    info!(
        accepted = outcome.accepted.len(),
        rejected = outcome.rejected.len(),
        "upload batch stored"
    );
    Ok(JsonResponse(UploadResponse {
        message,
        files: outcome.accepted,
        rejected: outcome.rejected,
    }))
}

fn multipart_error(err: MultipartError) -> ApiError {
    let status = err.status();
    warn!(error = %err.body_text(), %status, "multipart read failed");
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("upload exceeds size limit".into())
    } else {
        ApiError::BadRequest(format!("invalid multipart body: {}", err.body_text()))
    }
}
