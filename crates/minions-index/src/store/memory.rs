//! In-memory [`KeyValueStore`] for tests and one-shot runs.
//!
//! Values are kept as serialized JSON strings so every read hands out a
//! fresh copy, the same way a networked store would.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{append_value, into_list, matching_keys, KeyValueStore, StoreError};

/// Process-local key-value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Remove every key.
    pub async fn clear(&self) {
        self.data.write().await.clear();
    }
}

fn decode(raw: Option<&String>) -> Result<Option<Value>, StoreError> {
    raw.map(|s| serde_json::from_str(s)).transpose().map_err(StoreError::from)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn write(&self, key: &str, value: &Value) -> Result<bool, StoreError> {
        let encoded = serde_json::to_string(value)?;
        self.data.write().await.insert(key.to_string(), encoded);
        Ok(true)
    }

    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let data = self.data.read().await;
        decode(data.get(key))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().await;
        matching_keys(data.keys(), pattern)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.data.read().await.contains_key(key))
    }

    async fn list_append(&self, key: &str, value: Value) -> Result<(), StoreError> {
        // Single write lock so concurrent appends are not lost.
        let mut data = self.data.write().await;
        let existing = decode(data.get(key))?;
        let encoded = serde_json::to_string(&append_value(existing, value))?;
        data.insert(key.to_string(), encoded);
        Ok(())
    }

    async fn list_get(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        let data = self.data.read().await;
        Ok(into_list(decode(data.get(key))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.write("k", &json!({"a": 1})).await.unwrap());
        assert_eq!(store.read("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.read("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let store = MemoryStore::new();
        store.write("k", &json!(1)).await.unwrap();
        store.write("k", &json!(2)).await.unwrap();
        assert_eq!(store.read("k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryStore::new();
        store.write("k", &json!("v")).await.unwrap();
        assert!(store.exists("k").await.unwrap());
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_by_namespace() {
        let store = MemoryStore::new();
        store.write("codebase:index:a", &json!({})).await.unwrap();
        store.write("codebase:chunk:1", &json!({})).await.unwrap();
        store.write("codebase:chunk:2", &json!({})).await.unwrap();

        let chunks = store.keys("codebase:chunk:*").await.unwrap();
        assert_eq!(chunks, vec!["codebase:chunk:1", "codebase:chunk:2"]);
        assert_eq!(store.keys("codebase:index:*").await.unwrap().len(), 1);
        assert!(store.keys("nothing:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_append_and_get() {
        let store = MemoryStore::new();
        assert!(store.list_get("turns").await.unwrap().is_empty());

        store.list_append("turns", json!("hello")).await.unwrap();
        store.list_append("turns", json!({"role": "user"})).await.unwrap();

        let list = store.list_get("turns").await.unwrap();
        assert_eq!(list, vec![json!("hello"), json!({"role": "user"})]);
    }

    #[tokio::test]
    async fn test_list_get_wraps_scalar() {
        let store = MemoryStore::new();
        store.write("single", &json!(7)).await.unwrap();
        assert_eq!(store.list_get("single").await.unwrap(), vec![json!(7)]);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        store.write("a", &json!(1)).await.unwrap();
        store.flush().await.unwrap();
        assert!(!store.is_empty().await);

        store.clear().await;
        assert!(store.is_empty().await);
    }
}
