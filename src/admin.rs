//! 管理面板处理器：完整列表、单个删除与批量删除。

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json, Path};
use axum::response::Json as JsonResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::storage::{AdminEntry, FileStore};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BulkDeleteRequest {
    stored_names: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BulkDeleteResponse {
    deleted_count: usize,
    deleted: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct MessageResponse {
    message: &'static str,
}

/// 管理员文件列表（包含 storedName、上传时间与下载次数）。
pub async fn list_admin_files(
    Extension(storage): Extension<Arc<FileStore>>,
) -> Result<JsonResponse<Vec<AdminEntry>>, ApiError> {
    let entries = storage.list_admin().await?;
    info!(count = entries.len(), "admin list files");
    Ok(JsonResponse(entries))
}

/// 删除单个文件。
pub async fn delete_file(
    Path(stored_name): Path<String>,
    Extension(storage): Extension<Arc<FileStore>>,
) -> Result<JsonResponse<MessageResponse>, ApiError> {
    storage.delete(&stored_name).await?;
    Ok(JsonResponse(MessageResponse {
        message: "File deleted successfully",
    }))
}

/// 批量删除；不存在的名称被忽略。
pub async fn bulk_delete_files(
    Extension(storage): Extension<Arc<FileStore>>,
    payload: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<JsonResponse<BulkDeleteResponse>, ApiError> {
    let Json(BulkDeleteRequest { stored_names }) = payload.map_err(|err| {
        ApiError::BadRequest(format!("invalid request body: {}", err.body_text()))
    })?;
    if stored_names.is_empty() {
        return Err(ApiError::BadRequest("storedNames must not be empty".into()));
    }

    let deleted = storage.bulk_delete(&stored_names).await?;
    Ok(JsonResponse(BulkDeleteResponse {
        deleted_count: deleted.len(),
        deleted,
    }))
}
