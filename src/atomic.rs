//! 临时写入与原子替换的辅助方法。

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// 可用于原子替换的临时文件封装。
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl AtomicFile {
    /// 在目标路径同目录创建临时文件（以点开头，列表时会被跳过）。
    pub async fn new(target: &Path) -> io::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")
        })?;
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| "file".into());
        let temp_name = format!(".{base}.tmp.{}", Uuid::new_v4());
        let temp_path = parent.join(temp_name);
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    /// 一次性写入全部内容并替换目标文件，失败时清理临时文件。
    pub async fn write(target: &Path, contents: &[u8]) -> io::Result<()> {
        let mut atomic = Self::new(target).await?;
        if let Err(err) = atomic.file.write_all(contents).await {
            atomic.cleanup().await;
            return Err(err);
        }
        atomic.finalize().await
    }

    /// 写入新文件；目标已存在时返回 `AlreadyExists`，已有文件保持不变。
    pub async fn write_new(target: &Path, contents: &[u8]) -> io::Result<()> {
        let mut atomic = Self::new(target).await?;
        if let Err(err) = atomic.file.write_all(contents).await {
            atomic.cleanup().await;
            return Err(err);
        }
        atomic.finalize_new().await
    }

    /// 放弃并清理临时文件。
    pub async fn cleanup(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// 同步并原子替换目标文件。
    pub async fn finalize(self) -> io::Result<()> {
        if let Err(err) = self.file.sync_all().await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            #[cfg(windows)]
            {
                if fs::remove_file(&self.target).await.is_ok() {
                    return fs::rename(&self.temp_path, &self.target).await;
                }
            }
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(())
    }

    /// Publishes the temp file under the target name without ever replacing
    /// an existing file. A hard link fails with `AlreadyExists` when taken.
    pub async fn finalize_new(self) -> io::Result<()> {
        if let Err(err) = self.file.sync_all().await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }
        drop(self.file);

        let linked = fs::hard_link(&self.temp_path, &self.target).await;
        let _ = fs::remove_file(&self.temp_path).await;
        linked?;

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }

        Ok(())
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::AtomicFile;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_replaces_target_without_leftovers() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("blob.bin");
        std::fs::write(&target, b"old").expect("seed");

        AtomicFile::write(&target, b"new contents")
            .await
            .expect("atomic write");

        assert_eq!(std::fs::read(&target).expect("read"), b"new contents");
        let entries: Vec<_> = std::fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["blob.bin".to_string()]);
    }

    #[tokio::test]
    async fn write_new_never_replaces_existing_target() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("blob.bin");
        std::fs::write(&target, b"old").expect("seed");

        let err = AtomicFile::write_new(&target, b"new")
            .await
            .expect_err("target exists");
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&target).expect("read"), b"old");
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 1);

        let fresh = temp.path().join("fresh.bin");
        AtomicFile::write_new(&fresh, b"new").await.expect("write new");
        assert_eq!(std::fs::read(&fresh).expect("read"), b"new");
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 2);
    }

    #[tokio::test]
    async fn cleanup_removes_temp_file() {
        let temp = tempdir().expect("tempdir");
        let target = temp.path().join("blob.bin");
        let atomic = AtomicFile::new(&target).await.expect("create temp");
        atomic.cleanup().await;

        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(temp.path()).expect("read dir").count(), 0);
    }
}
