//! 上传元数据：以单个 JSON 文件保存 storedName 到记录的映射。
//!
//! Every mutation is a full load → mutate → save cycle. Writers are
//! serialized through [`MetadataStore::begin`]; readers take a lock-free
//! snapshot with [`MetadataStore::load`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::atomic::AtomicFile;

/// Descriptive data kept for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub original_name: String,
    pub upload_date: DateTime<Utc>,
    pub downloads: u64,
}

impl FileRecord {
    pub fn new(original_name: impl Into<String>, upload_date: DateTime<Utc>) -> Self {
        Self {
            original_name: original_name.into(),
            upload_date,
            downloads: 0,
        }
    }
}

pub type MetadataTable = BTreeMap<String, FileRecord>;

#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取元数据；文件缺失返回空表，内容损坏时记录告警并返回空表。
    pub async fn load(&self) -> io::Result<MetadataTable> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(MetadataTable::new()),
            Err(err) => return Err(err),
        };
        match serde_json::from_slice(&bytes) {
            Ok(table) => Ok(table),
            Err(err) => {
                warn!(
                    path = ?self.path,
                    error = %err,
                    "metadata file is corrupt, continuing with an empty table"
                );
                Ok(MetadataTable::new())
            }
        }
    }

    /// 序列化整张表并原子覆盖元数据文件。
    pub async fn save(&self, table: &MetadataTable) -> io::Result<()> {
        let contents = serde_json::to_vec_pretty(table).map_err(io::Error::other)?;
        AtomicFile::write(&self.path, &contents).await
    }

    /// 获取写锁并加载当前表，返回的事务在 `commit` 时写回。
    pub async fn begin(&self) -> io::Result<MetadataTxn<'_>> {
        let guard = self.write_lock.lock().await;
        let table = self.load().await?;
        Ok(MetadataTxn {
            store: self,
            table,
            _guard: guard,
        })
    }
}

/// Exclusive read-modify-write access to the metadata table.
///
/// Dropping the transaction without calling [`MetadataTxn::commit`] discards
/// the in-memory changes and releases the lock.
pub struct MetadataTxn<'a> {
    store: &'a MetadataStore,
    table: MetadataTable,
    _guard: MutexGuard<'a, ()>,
}

impl MetadataTxn<'_> {
    pub fn table_mut(&mut self) -> &mut MetadataTable {
        &mut self.table
    }

    pub async fn commit(self) -> io::Result<()> {
        self.store.save(&self.table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(name: &str, downloads: u64) -> FileRecord {
        FileRecord {
            original_name: name.to_string(),
            upload_date: Utc::now(),
            downloads,
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty_table() {
        let temp = tempdir().expect("tempdir");
        let store = MetadataStore::new(temp.path().join("metadata.json"));
        assert!(store.load().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let temp = tempdir().expect("tempdir");
        let store = MetadataStore::new(temp.path().join("metadata.json"));
        let mut table = MetadataTable::new();
        table.insert("1-2-a.txt".into(), record("a.txt", 0));
        table.insert("3-4-b.png".into(), record("b.png", 7));

        store.save(&table).await.expect("save");
        assert_eq!(store.load().await.expect("load"), table);
    }

    #[tokio::test]
    async fn corrupt_file_recovers_with_empty_table() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("metadata.json");
        std::fs::write(&path, b"{ not json").expect("write garbage");
        let store = MetadataStore::new(path);

        assert!(store.load().await.expect("load").is_empty());

        let mut txn = store.begin().await.expect("begin");
        txn.table_mut().insert("1-1-x".into(), record("x", 0));
        txn.commit().await.expect("commit");
        assert_eq!(store.load().await.expect("load").len(), 1);
    }

    #[tokio::test]
    async fn persisted_shape_uses_camel_case_fields() {
        let temp = tempdir().expect("tempdir");
        let store = MetadataStore::new(temp.path().join("metadata.json"));
        let mut table = MetadataTable::new();
        table.insert("1-2-a.txt".into(), record("a.txt", 3));
        store.save(&table).await.expect("save");

        let raw = std::fs::read(store.path()).expect("read");
        let value: serde_json::Value = serde_json::from_slice(&raw).expect("json");
        let entry = &value["1-2-a.txt"];
        assert_eq!(entry["originalName"], "a.txt");
        assert_eq!(entry["downloads"], 3);
        assert!(entry["uploadDate"].is_string());
    }

    #[tokio::test]
    async fn dropped_transaction_discards_changes() {
        let temp = tempdir().expect("tempdir");
        let store = MetadataStore::new(temp.path().join("metadata.json"));
        {
            let mut txn = store.begin().await.expect("begin");
            txn.table_mut().insert("1-1-x".into(), record("x", 0));
        }
        assert!(store.load().await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn concurrent_transactions_do_not_lose_updates() {
        let temp = tempdir().expect("tempdir");
        let store = Arc::new(MetadataStore::new(temp.path().join("metadata.json")));
        let mut handles = Vec::new();
        for index in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut txn = store.begin().await.expect("begin");
                txn.table_mut()
                    .insert(format!("{index}-0-f"), record("f", 0));
                txn.commit().await.expect("commit");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }
        assert_eq!(store.load().await.expect("load").len(), 16);
    }
}
