//! 公开文件列表与下载处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use httpdate::fmt_http_date;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::naming::sanitize_original_name;
use crate::storage::{FileStore, PublicEntry};

/// 列出所有文件（仅原始文件名与下载地址）。
pub async fn list_files(
    Extension(storage): Extension<Arc<FileStore>>,
) -> Result<JsonResponse<Vec<PublicEntry>>, ApiError> {
    let entries = storage.list_public().await?;
    info!(count = entries.len(), "list files");
    Ok(JsonResponse(entries))
}

/// 下载文件并增加下载计数。
pub async fn download_file(
    Path(stored_name): Path<String>,
    Extension(storage): Extension<Arc<FileStore>>,
) -> Result<Response, ApiError> {
    let opened = storage.open(&stored_name).await?;
    let mime = mime_guess::from_path(&opened.save_name).first_or_octet_stream();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
    );
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(&opened.save_name)?,
    );
    response_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&opened.size.to_string())
            .map_err(|_| ApiError::Internal("failed to build response headers".into()))?,
    );
    if let Some(modified) = opened.modified {
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&fmt_http_date(modified))
                .map_err(|_| ApiError::Internal("failed to build response headers".into()))?,
        );
    }

    match storage.record_download(&stored_name).await {
        Ok(downloads) => info!(stored_name, size = opened.size, ?downloads, "download"),
        Err(err) => warn!(stored_name, error = ?err, "download counter not updated"),
    }

    let stream = ReaderStream::new(opened.file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// `attachment` with an ASCII fallback name and an RFC 5987 UTF-8 name.
fn content_disposition(save_name: &str) -> Result<HeaderValue, ApiError> {
    let safe_name = sanitize_original_name(save_name);
    let ascii_fallback: String = safe_name
        .chars()
        .map(|ch| {
            if ch.is_ascii_graphic() && ch != '"' && ch != '\\' || ch == ' ' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback,
        urlencoding::encode(&safe_name)
    );
    HeaderValue::from_str(&value)
        .map_err(|_| ApiError::Internal("failed to build response headers".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ExtensionBlocklist;
    use crate::storage::IncomingFile;
    use http_body_util::BodyExt;
    use tempfile::tempdir;

    fn make_storage() -> (tempfile::TempDir, Arc<FileStore>) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create upload dir");
        let store = FileStore::new(root, ExtensionBlocklist::new(["exe"]));
        (temp, Arc::new(store))
    }

    #[test]
    fn content_disposition_encodes_unicode_names() {
        let value = content_disposition("résumé final.pdf").expect("header");
        assert_eq!(
            value.to_str().expect("ascii header"),
            "attachment; filename=\"r_sum_ final.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9%20final.pdf"
        );
    }

    #[tokio::test]
    async fn download_streams_bytes_under_original_name() {
        let (_temp, storage) = make_storage();
        let outcome = storage
            .upload(vec![IncomingFile {
                name: "notes.txt".into(),
                bytes: b"hello".to_vec(),
            }])
            .await
            .expect("upload");
        let stored_name = outcome.accepted[0].stored_name.clone();

        let response = download_file(Path(stored_name.clone()), Extension(storage.clone()))
            .await
            .expect("download");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            HeaderValue::from_static("text/plain")
        );
        assert!(
            response.headers()[header::CONTENT_DISPOSITION]
                .to_str()
                .expect("header")
                .contains("filename=\"notes.txt\"")
        );
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect")
            .to_bytes();
        assert_eq!(&body[..], b"hello");

        let table = storage.metadata().load().await.expect("load");
        assert_eq!(table[&stored_name].downloads, 1);
    }

    #[tokio::test]
    async fn download_rejects_traversal() {
        let (_temp, storage) = make_storage();
        let result = download_file(Path("../metadata.json".into()), Extension(storage)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn download_missing_file_is_not_found() {
        let (_temp, storage) = make_storage();
        let result = download_file(Path("1-2-missing.txt".into()), Extension(storage)).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
