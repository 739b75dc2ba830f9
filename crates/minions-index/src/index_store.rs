//! Typed access to index records in the key-value store.
//!
//! File records live under `codebase:index:<md5(relative path)>` and chunk
//! records under `codebase:chunk:<chunk id>`. The two prefixes are distinct
//! so a single `keys()` call enumerates one record type.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::IndexError;
use crate::hashing::path_hash;
use crate::records::{EmbeddingChunk, IndexedFile};
use crate::store::{KeyValueStore, StoreError};

/// Key prefix for [`IndexedFile`] records
pub const INDEX_PREFIX: &str = "codebase:index:";

/// Key prefix for [`EmbeddingChunk`] records
pub const CHUNK_PREFIX: &str = "codebase:chunk:";

/// Record-level view over a [`KeyValueStore`].
#[derive(Clone)]
pub struct IndexStore {
    store: Arc<dyn KeyValueStore>,
}

impl IndexStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying key-value backend.
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn file_key(relative_path: &str) -> String {
        format!("{}{}", INDEX_PREFIX, path_hash(relative_path))
    }

    pub fn chunk_key(chunk_id: &str) -> String {
        format!("{}{}", CHUNK_PREFIX, chunk_id)
    }

    pub async fn get_file(&self, relative_path: &str) -> Result<Option<IndexedFile>, IndexError> {
        self.read_record(&Self::file_key(relative_path)).await
    }

    pub async fn get_file_by_key(&self, key: &str) -> Result<Option<IndexedFile>, IndexError> {
        self.read_record(key).await
    }

    pub async fn put_file(&self, file: &IndexedFile) -> Result<(), IndexError> {
        self.write_record(&Self::file_key(&file.file_path), file).await
    }

    pub async fn delete_file(&self, relative_path: &str) -> Result<bool, IndexError> {
        Ok(self.store.delete(&Self::file_key(relative_path)).await?)
    }

    pub async fn get_chunk_by_key(&self, key: &str) -> Result<Option<EmbeddingChunk>, IndexError> {
        self.read_record(key).await
    }

    pub async fn put_chunk(&self, chunk: &EmbeddingChunk) -> Result<(), IndexError> {
        self.write_record(&Self::chunk_key(&chunk.chunk_id), chunk).await
    }

    pub async fn delete_chunk(&self, chunk_id: &str) -> Result<bool, IndexError> {
        Ok(self.store.delete(&Self::chunk_key(chunk_id)).await?)
    }

    /// Delete every listed chunk, returning how many existed.
    pub async fn delete_chunks(&self, chunk_ids: &[String]) -> Result<usize, IndexError> {
        let mut deleted = 0;
        for chunk_id in chunk_ids {
            if self.delete_chunk(chunk_id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub async fn file_keys(&self) -> Result<Vec<String>, IndexError> {
        Ok(self.store.keys(&format!("{}*", INDEX_PREFIX)).await?)
    }

    pub async fn chunk_keys(&self) -> Result<Vec<String>, IndexError> {
        Ok(self.store.keys(&format!("{}*", CHUNK_PREFIX)).await?)
    }

    /// Delete a raw key in either namespace.
    pub async fn delete_key(&self, key: &str) -> Result<bool, IndexError> {
        Ok(self.store.delete(key).await?)
    }

    /// Make buffered writes durable.
    pub async fn flush(&self) -> Result<(), IndexError> {
        Ok(self.store.flush().await?)
    }

    async fn read_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, IndexError> {
        match self.store.read(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| IndexError::CorruptRecord {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn write_record<T: Serialize>(&self, key: &str, record: &T) -> Result<(), IndexError> {
        let value: Value = serde_json::to_value(record).map_err(StoreError::from)?;
        self.store.write(key, &value).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn chunk(id: &str, path: &str) -> EmbeddingChunk {
        EmbeddingChunk {
            chunk_id: id.to_string(),
            file_path: path.to_string(),
            content: "fn main() {}\n".to_string(),
            embedding: vec![1.0, 0.0],
            line_start: 1,
            line_end: 1,
        }
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(
            IndexStore::file_key("main.py"),
            format!("codebase:index:{}", path_hash("main.py"))
        );
        assert_eq!(IndexStore::chunk_key("abc"), "codebase:chunk:abc");
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let store = IndexStore::new(Arc::new(MemoryStore::new()));
        let file = IndexedFile::new("src/a.rs".to_string(), "h".to_string(), vec!["1".to_string()]);

        store.put_file(&file).await.unwrap();
        assert_eq!(store.get_file("src/a.rs").await.unwrap(), Some(file));
        assert_eq!(store.file_keys().await.unwrap().len(), 1);

        assert!(store.delete_file("src/a.rs").await.unwrap());
        assert_eq!(store.get_file("src/a.rs").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chunk_namespace_separate_from_files() {
        let store = IndexStore::new(Arc::new(MemoryStore::new()));
        store.put_chunk(&chunk("c1", "a.rs")).await.unwrap();
        store.put_chunk(&chunk("c2", "a.rs")).await.unwrap();
        store
            .put_file(&IndexedFile::new("a.rs".to_string(), "h".to_string(), vec![]))
            .await
            .unwrap();

        assert_eq!(store.chunk_keys().await.unwrap().len(), 2);
        assert_eq!(store.file_keys().await.unwrap().len(), 1);

        let deleted = store
            .delete_chunks(&["c1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.chunk_keys().await.unwrap(), vec!["codebase:chunk:c2"]);
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .write("codebase:chunk:bad", &serde_json::json!({"nope": true}))
            .await
            .unwrap();
        let store = IndexStore::new(backend);

        let err = store.get_chunk_by_key("codebase:chunk:bad").await.unwrap_err();
        assert!(matches!(err, IndexError::CorruptRecord { .. }));
    }
}
