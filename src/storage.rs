//! 文件存储服务：上传、列表、下载计数与删除，以及统一的文件名安全解析。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{self, File};
use tracing::{info, warn};

use crate::atomic::AtomicFile;
use crate::config::METADATA_FILE_NAME;
use crate::metadata::{FileRecord, MetadataStore, MetadataTable};
use crate::naming::{ExtensionBlocklist, download_url, generate_stored_name};

/// Longest single file name most filesystems accept.
const MAX_STORED_NAME_LEN: usize = 255;
const STORED_NAME_ATTEMPTS: usize = 8;

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    metadata: MetadataStore,
    blocklist: ExtensionBlocklist,
}

/// One file received from a client.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub stored_name: String,
    pub original_name: String,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub accepted: Vec<StoredFile>,
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEntry {
    pub original_name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEntry {
    pub stored_name: String,
    pub original_name: String,
    pub upload_date: Option<DateTime<Utc>>,
    pub downloads: u64,
    pub size: u64,
    pub url: String,
}

/// An opened stored file ready to be streamed to a client.
#[derive(Debug)]
pub struct OpenedFile {
    pub file: File,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub save_name: String,
}

impl FileStore {
    pub fn new(root: PathBuf, blocklist: ExtensionBlocklist) -> Self {
        let metadata = MetadataStore::new(root.join(METADATA_FILE_NAME));
        Self {
            root,
            metadata,
            blocklist,
        }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// 将调用方提供的 storedName 解析为上传目录下的文件路径。
    ///
    /// Only a single plain path component is accepted; separators, `.`/`..`,
    /// dotfiles, the metadata file and symlinks are refused.
    pub async fn resolve_stored_name(&self, name: &str) -> Result<PathBuf, StorageError> {
        let target = self.resolve(name)?;
        match fs::symlink_metadata(&target).await {
            Ok(metadata) if metadata.file_type().is_symlink() => Err(StorageError::InvalidName),
            Ok(_) => Ok(target),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(target),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty()
            || name.len() > MAX_STORED_NAME_LEN
            || name.contains(['/', '\\', '\0'])
            || name.starts_with('.')
            || name == METADATA_FILE_NAME
        {
            return Err(StorageError::InvalidName);
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(segment)), None) => Ok(self.root.join(segment)),
            _ => Err(StorageError::InvalidName),
        }
    }

    /// 保存一批上传文件：过滤黑名单扩展名，写入文件，并一次性提交元数据。
    pub async fn upload(&self, files: Vec<IncomingFile>) -> Result<UploadOutcome, StorageError> {
        let mut outcome = UploadOutcome::default();
        let mut pending = Vec::new();

        for file in files {
            if self.blocklist.is_blocked(&file.name) {
                warn!(name = file.name, "upload rejected by extension blocklist");
                outcome.rejected.push(file.name);
                continue;
            }

            let now = Utc::now();
            let written = self
                .write_unique(&file.bytes, || generate_stored_name(&file.name, now))
                .await;
            let stored_name = match written {
                Ok(stored_name) => stored_name,
                Err(err) => {
                    self.remove_written(&pending).await;
                    return Err(err);
                }
            };
            pending.push((stored_name, FileRecord::new(file.name, now), file.bytes.len()));
        }

        if pending.is_empty() {
            return Ok(outcome);
        }

        if let Err(err) = self.commit_records(&pending).await {
            self.remove_written(&pending).await;
            return Err(StorageError::Io(err));
        }

        for (stored_name, record, size) in pending {
            info!(
                stored_name,
                original_name = record.original_name,
                size,
                "file uploaded"
            );
            outcome.accepted.push(StoredFile {
                url: download_url(&stored_name),
                stored_name,
                original_name: record.original_name,
            });
        }
        Ok(outcome)
    }

    /// Writes a blob under the first generated name that is not taken yet.
    async fn write_unique(
        &self,
        bytes: &[u8],
        mut next_name: impl FnMut() -> String,
    ) -> Result<String, StorageError> {
        for _ in 0..STORED_NAME_ATTEMPTS {
            let stored_name = next_name();
            let target = self.resolve(&stored_name)?;
            match AtomicFile::write_new(&target, bytes).await {
                Ok(()) => return Ok(stored_name),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    warn!(stored_name, "stored name already taken, regenerating");
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
        Err(StorageError::Io(io::Error::new(
            ErrorKind::AlreadyExists,
            "no free stored name",
        )))
    }

    async fn commit_records(&self, pending: &[(String, FileRecord, usize)]) -> io::Result<()> {
        let mut txn = self.metadata.begin().await?;
        for (stored_name, record, _) in pending {
            txn.table_mut().insert(stored_name.clone(), record.clone());
        }
        txn.commit().await
    }

    async fn remove_written(&self, pending: &[(String, FileRecord, usize)]) {
        for (stored_name, _, _) in pending {
            if let Err(err) = fs::remove_file(self.root.join(stored_name)).await {
                warn!(stored_name, error = %err, "failed to remove partially uploaded batch");
            }
        }
    }

    /// 面向匿名访问者的列表：只暴露原始文件名与下载地址。
    pub async fn list_public(&self) -> Result<Vec<PublicEntry>, StorageError> {
        let (stored, table) = self.snapshot().await?;
        Ok(stored
            .into_iter()
            .map(|(stored_name, _)| PublicEntry {
                original_name: display_name(&table, &stored_name),
                url: download_url(&stored_name),
            })
            .collect())
    }

    /// 管理员列表：包含完整元数据与文件大小。
    pub async fn list_admin(&self) -> Result<Vec<AdminEntry>, StorageError> {
        let (stored, table) = self.snapshot().await?;
        Ok(stored
            .into_iter()
            .map(|(stored_name, size)| {
                let record = table.get(&stored_name);
                AdminEntry {
                    original_name: display_name(&table, &stored_name),
                    upload_date: record.map(|record| record.upload_date),
                    downloads: record.map(|record| record.downloads).unwrap_or(0),
                    size,
                    url: download_url(&stored_name),
                    stored_name,
                }
            })
            .collect())
    }

    /// Enumerates stored blobs (name, size) sorted by name and loads the
    /// metadata table. Records whose blob is gone are not listed.
    async fn snapshot(&self) -> Result<(Vec<(String, u64)>, MetadataTable), StorageError> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut stored = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == METADATA_FILE_NAME || name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            stored.push((name, metadata.len()));
        }
        stored.sort_by(|a, b| a.0.cmp(&b.0));
        let table = self.metadata.load().await?;
        Ok((stored, table))
    }

    /// 打开待下载的文件并给出建议的保存文件名。
    pub async fn open(&self, stored_name: &str) -> Result<OpenedFile, StorageError> {
        let target = self.resolve_stored_name(stored_name).await?;
        let metadata = match fs::metadata(&target).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(StorageError::NotFound),
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound),
            Err(err) => return Err(StorageError::Io(err)),
        };
        let file = File::open(&target).await?;
        let table = self.metadata.load().await?;
        Ok(OpenedFile {
            file,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            save_name: display_name(&table, stored_name),
        })
    }

    /// 下载计数加一；没有元数据记录时直接跳过。
    pub async fn record_download(&self, stored_name: &str) -> Result<Option<u64>, StorageError> {
        let mut txn = self.metadata.begin().await?;
        let Some(record) = txn.table_mut().get_mut(stored_name) else {
            return Ok(None);
        };
        record.downloads = record.downloads.saturating_add(1);
        let downloads = record.downloads;
        txn.commit().await?;
        Ok(Some(downloads))
    }

    /// 删除单个文件及其元数据记录，文件不存在时返回 NotFound。
    pub async fn delete(&self, stored_name: &str) -> Result<(), StorageError> {
        let target = self.resolve_stored_name(stored_name).await?;
        let mut txn = self.metadata.begin().await?;
        if !remove_blob(&target).await? {
            return Err(StorageError::NotFound);
        }
        txn.table_mut().remove(stored_name);
        txn.commit().await?;
        info!(stored_name, "file deleted");
        Ok(())
    }

    /// 批量删除：无效或不存在的名称被跳过，返回实际删除的名称。
    pub async fn bulk_delete(&self, stored_names: &[String]) -> Result<Vec<String>, StorageError> {
        let mut txn = self.metadata.begin().await?;
        let mut deleted = Vec::new();
        for stored_name in stored_names {
            let target = match self.resolve_stored_name(stored_name).await {
                Ok(target) => target,
                Err(StorageError::InvalidName) => {
                    warn!(stored_name, "bulk delete skipped invalid name");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if remove_blob(&target).await? {
                txn.table_mut().remove(stored_name);
                deleted.push(stored_name.clone());
            }
        }
        if !deleted.is_empty() {
            txn.commit().await?;
        }
        info!(
            requested = stored_names.len(),
            deleted = deleted.len(),
            "bulk delete"
        );
        Ok(deleted)
    }
}

/// Removes a regular file, returning `false` when there is nothing to remove.
async fn remove_blob(target: &Path) -> Result<bool, StorageError> {
    match fs::metadata(target).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return Ok(false),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(StorageError::Io(err)),
    }
    match fs::remove_file(target).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StorageError::Io(err)),
    }
}

fn display_name(table: &MetadataTable, stored_name: &str) -> String {
    table
        .get(stored_name)
        .map(|record| record.original_name.clone())
        .unwrap_or_else(|| stored_name.to_string())
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName,
    NotFound,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
