//! Persistent store seam.
//!
//! The real store is an external collaborator; the core assumes only
//! single-key atomicity and prefix listing over opaque string keys.
//! [`MemoryStore`] backs tests and embedders that run without one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::SyncError;

/// Key-value store with prefix listing. Single-key atomic, no cross-key
/// transactions.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one value.
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError>;

    /// Write one value, replacing any existing one.
    async fn set(&self, key: &str, value: Value) -> Result<(), SyncError>;

    /// Delete one key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), SyncError>;

    /// List all entries whose key starts with `prefix`, in key order.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, SyncError>;
}

/// In-memory [`KvStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, SyncError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), SyncError> {
        let _ = self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SyncError> {
        let _ = self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>, SyncError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let store = MemoryStore::new();
        store.set("thread:t1:status", json!("running")).await.unwrap();
        assert_eq!(
            store.get("thread:t1:status").await.unwrap(),
            Some(json!("running"))
        );
        store.delete("thread:t1:status").await.unwrap();
        assert_eq!(store.get("thread:t1:status").await.unwrap(), None);
        // Deleting again is fine.
        store.delete("thread:t1:status").await.unwrap();
    }

    #[tokio::test]
    async fn prefix_listing_is_ordered_and_scoped() {
        let store = MemoryStore::new();
        store.set("thread:t1:status", json!("idle")).await.unwrap();
        store.set("thread:t2:status", json!("running")).await.unwrap();
        store.set("unit:u1", json!(1)).await.unwrap();

        let threads = store.list_by_prefix("thread:").await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].0, "thread:t1:status");
        assert_eq!(threads[1].0, "thread:t2:status");
        assert!(store.list_by_prefix("run:").await.unwrap().is_empty());
    }
}
