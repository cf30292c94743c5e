//! Debate log storage.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One persisted debate, minus token streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateLogRecord {
    pub request_id: String,
    pub created_at: DateTime<Utc>,
    /// The immutable `DebateResult`, serialized by the caller.
    pub result: serde_json::Value,
}

/// Key/value interface for debate logs.
#[async_trait]
pub trait DebateLogStore: Send + Sync {
    async fn put(&self, record: DebateLogRecord) -> Result<()>;
    async fn get(&self, request_id: &str) -> Result<Option<DebateLogRecord>>;
    async fn list_ids(&self) -> Result<Vec<String>>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryLogStore {
    records: DashMap<String, DebateLogRecord>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DebateLogStore for MemoryLogStore {
    async fn put(&self, record: DebateLogRecord) -> Result<()> {
        self.records.insert(record.request_id.clone(), record);
        Ok(())
    }

    async fn get(&self, request_id: &str) -> Result<Option<DebateLogRecord>> {
        Ok(self.records.get(request_id).map(|entry| entry.value().clone()))
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

/// Writes a debate log in the background, best-effort.
///
/// Failures are logged and dropped; nothing downstream waits on the write.
pub fn spawn_log_write(store: Arc<dyn DebateLogStore>, record: DebateLogRecord) {
    tokio::spawn(async move {
        let request_id = record.request_id.clone();
        if let Err(error) = store.put(record).await {
            warn!(request_id = %request_id, error = %error, "debate log write failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> DebateLogRecord {
        DebateLogRecord {
            request_id: id.to_string(),
            created_at: Utc::now(),
            result: serde_json::json!({"final_answer": "42"}),
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryLogStore::new();
        store.put(record("req-00000001")).await.unwrap();
        let loaded = store.get("req-00000001").await.unwrap().unwrap();
        assert_eq!(loaded.result["final_answer"], "42");
        assert!(store.get("req-00000099").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_ids_sorted() {
        let store = MemoryLogStore::new();
        store.put(record("req-00000002")).await.unwrap();
        store.put(record("req-00000001")).await.unwrap();
        assert_eq!(
            store.list_ids().await.unwrap(),
            vec!["req-00000001".to_string(), "req-00000002".to_string()]
        );
    }

    #[tokio::test]
    async fn test_background_write_lands() {
        let store = Arc::new(MemoryLogStore::new());
        spawn_log_write(store.clone(), record("req-00000003"));
        tokio::task::yield_now().await;
        // The write task may need a moment on a busy executor.
        for _ in 0..50 {
            if store.get("req-00000003").await.unwrap().is_some() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("background write never landed");
    }
}
