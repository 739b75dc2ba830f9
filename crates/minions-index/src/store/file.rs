//! JSON-file-backed [`KeyValueStore`].
//!
//! The whole map lives in memory. Mutations only mark it dirty; the
//! snapshot is rewritten (temp file + rename) on [`KeyValueStore::flush`],
//! so a crash leaves either the previous or the new snapshot. The indexer
//! flushes once at the end of each operation. Suited to single-workspace
//! CLI use, not large shared indexes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{matching_keys, KeyValueStore, StoreError};

/// Key-value store persisted as a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<BTreeMap<String, Value>>,
    dirty: AtomicBool,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing contents if the file exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let data: BTreeMap<String, Value> = serde_json::from_slice(&bytes)?;
                debug!("Loaded {} keys from {:?}", data.len(), path);
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether there are mutations not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    async fn persist(&self, data: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let encoded = serde_json::to_vec(data)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, encoded).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn write(&self, key: &str, value: &Value) -> Result<bool, StoreError> {
        self.data.write().await.insert(key.to_string(), value.clone());
        self.dirty.store(true, Ordering::Release);
        Ok(true)
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        if self.data.write().await.remove(key).is_none() {
            return Ok(false);
        }
        self.dirty.store(true, Ordering::Release);
        Ok(true)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().await;
        matching_keys(data.keys(), pattern)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        // Writers need the write lock, so nothing slips in between the
        // dirty check and the snapshot.
        let data = self.data.read().await;
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        if let Err(e) = self.persist(&data).await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        debug!("Flushed {} keys to {:?}", data.len(), self.path);
        Ok(())
    }
}
