//! Generic key-value persistence used by the index.
//!
//! The [`KeyValueStore`] trait is the minimal contract the indexer needs
//! from a backend: JSON values under string keys, glob enumeration of keys,
//! and list-append semantics. Writes are last-write-wins; there is no
//! compare-and-swap.
//!
//! Backends:
//! - [`MemoryStore`]: process-local map, used by tests and one-shot runs
//! - [`JsonFileStore`]: the same map persisted to a JSON file on [`flush`](KeyValueStore::flush)
//! - [`RedisStore`]: a Redis server, one string key per record

mod file;
mod memory;
mod redis;

pub use self::file::JsonFileStore;
pub use self::memory::MemoryStore;
pub use self::redis::{RedisSettings, RedisStore};

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by store backends.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid key pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Abstract key-value backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`write`](KeyValueStore::write) | Store a value, overwriting any previous one |
/// | [`read`](KeyValueStore::read) | Fetch a value, `None` if absent |
/// | [`delete`](KeyValueStore::delete) | Remove a key, `true` if it existed |
/// | [`keys`](KeyValueStore::keys) | Enumerate keys matching a glob (`*` wildcard) |
/// | [`list_append`](KeyValueStore::list_append) | Append to the list stored at a key |
/// | [`list_get`](KeyValueStore::list_get) | Read the list stored at a key |
/// | [`flush`](KeyValueStore::flush) | Make buffered mutations durable |
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`. Returns `true` once the value is stored.
    async fn write(&self, key: &str, value: &Value) -> Result<bool, StoreError>;

    /// Retrieve the value stored under `key`.
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Remove `key`. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys matching a glob pattern, in ascending order.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read(key).await?.is_some())
    }

    /// Append `value` to the list at `key`.
    ///
    /// A missing key starts a new list; a non-list value is wrapped into a
    /// one-element list first.
    async fn list_append(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let existing = self.read(key).await?;
        let appended = append_value(existing, value);
        self.write(key, &appended).await?;
        Ok(())
    }

    /// The list stored at `key`; empty if absent, one element if not a list.
    async fn list_get(&self, key: &str) -> Result<Vec<Value>, StoreError> {
        Ok(into_list(self.read(key).await?))
    }

    /// Persist buffered mutations. A no-op for backends that write through.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Compile a glob pattern for key matching.
pub(crate) fn compile_pattern(pattern: &str) -> Result<glob::Pattern, StoreError> {
    glob::Pattern::new(pattern).map_err(|e| StoreError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Keys from `keys` matching `pattern`, sorted.
pub(crate) fn matching_keys<'a>(
    keys: impl Iterator<Item = &'a String>,
    pattern: &str,
) -> Result<Vec<String>, StoreError> {
    let pattern = compile_pattern(pattern)?;
    let mut matched: Vec<String> = keys.filter(|k| pattern.matches(k)).cloned().collect();
    matched.sort();
    Ok(matched)
}

pub(crate) fn append_value(existing: Option<Value>, value: Value) -> Value {
    let mut list = into_list(existing);
    list.push(value);
    Value::Array(list)
}

pub(crate) fn into_list(value: Option<Value>) -> Vec<Value> {
    match value {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matching_keys_wildcard() {
        let keys = vec![
            "codebase:index:abc".to_string(),
            "codebase:chunk:2".to_string(),
            "codebase:chunk:1".to_string(),
            "chat:last".to_string(),
        ];
        let matched = matching_keys(keys.iter(), "codebase:chunk:*").unwrap();
        assert_eq!(matched, vec!["codebase:chunk:1", "codebase:chunk:2"]);

        let all = matching_keys(keys.iter(), "*").unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_invalid_pattern() {
        let keys: Vec<String> = Vec::new();
        let err = matching_keys(keys.iter(), "[").unwrap_err();
        assert!(matches!(err, StoreError::InvalidPattern { .. }));
    }

    #[test]
    fn test_append_value_wraps_scalars() {
        assert_eq!(append_value(None, json!(1)), json!([1]));
        assert_eq!(append_value(Some(json!("a")), json!("b")), json!(["a", "b"]));
        assert_eq!(append_value(Some(json!([1, 2])), json!(3)), json!([1, 2, 3]));
    }
}
