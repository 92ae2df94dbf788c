//! In-process queue and result store.
//!
//! Expiry uses the tokio clock, so tests can pause and advance time.

use super::{JobQueue, QueueEntry, ResultStore, MAX_RESULT_TTL};
use crate::types::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
pub struct MemoryQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, entry: QueueEntry) -> Result<()> {
        self.entries.lock().push_back(entry);
        Ok(())
    }

    async fn pop(&self) -> Result<Option<QueueEntry>> {
        Ok(self.entries.lock().pop_front())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().len())
    }
}

#[derive(Default)]
pub struct MemoryResultStore {
    values: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut values = self.values.lock();
        values.retain(|_, (_, expires)| *expires > now);
        values.insert(key.to_string(), (value, now + ttl.min(MAX_RESULT_TTL)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut values = self.values.lock();
        match values.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.values.lock().remove(key);
        Ok(matches!(removed, Some((_, expires)) if expires > Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> QueueEntry {
        QueueEntry {
            job_id: id.to_string(),
            payload: format!("{{\"job_id\":\"{}\"}}", id),
        }
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let queue = MemoryQueue::new();
        assert_eq!(queue.pop().await.unwrap(), None);

        queue.push(entry("a")).await.unwrap();
        queue.push(entry("b")).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, "a");
        assert_eq!(queue.pop().await.unwrap().unwrap().job_id, "b");
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_expires_after_ttl() {
        let store = MemoryResultStore::new();
        store
            .set("result:1", "done".to_string(), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(store.get("result:1").await.unwrap().as_deref(), Some("done"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(store.get("result:1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("result:1").await.unwrap(), None);
        assert!(!store.delete("result:1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_ttl_is_capped() {
        let store = MemoryResultStore::new();
        store
            .set("result:1", "done".to_string(), Duration::MAX)
            .await
            .unwrap();
        assert!(store.get("result:1").await.unwrap().is_some());

        tokio::time::advance(MAX_RESULT_TTL + Duration::from_secs(1)).await;
        assert_eq!(store.get("result:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_removes_value() {
        let store = MemoryResultStore::new();
        store
            .set("k", "v".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
