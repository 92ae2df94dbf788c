//! Queue and result store on a local libsql database file.
//!
//! Several processes may open the same file: the dispatcher pops jobs while
//! `switchboard submit` invocations push them and poll for results. A pop is a
//! single `DELETE ... RETURNING` statement, so no two consumers get the same job.

use super::{JobQueue, QueueEntry, ResultStore, MAX_RESULT_TTL};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::time::Duration;

pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Queue(format!("Failed to create '{}': {}", parent.display(), e))
            })?;
        }

        let db = Builder::new_local(&path)
            .build()
            .await
            .map_err(|e| AppError::Queue(format!("Failed to open queue database: {}", e)))?;

        let backend = Self { db };
        backend.initialize_schema().await?;
        Ok(backend)
    }

    async fn connection(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| AppError::Queue(format!("Failed to get connection: {}", e)))?;
        // other processes hold the file too; wait for their locks instead of failing
        conn.query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| AppError::Queue(format!("Failed to set busy timeout: {}", e)))?;
        Ok(conn)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection().await?;

        conn.query("PRAGMA journal_mode = WAL", ())
            .await
            .map_err(|e| AppError::Queue(format!("Failed to enable WAL: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS job_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL,
                payload TEXT NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Queue(format!("Failed to create job_queue table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS job_results (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Queue(format!("Failed to create job_results table: {}", e)))?;

        Ok(())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl JobQueue for SqliteBackend {
    async fn push(&self, entry: QueueEntry) -> Result<()> {
        let conn = self.connection().await?;
        conn.execute(
            "INSERT INTO job_queue (job_id, payload) VALUES (?, ?)",
            (entry.job_id.as_str(), entry.payload.as_str()),
        )
        .await
        .map_err(|e| AppError::Queue(format!("Failed to enqueue job: {}", e)))?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<QueueEntry>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "DELETE FROM job_queue
                 WHERE seq = (SELECT MIN(seq) FROM job_queue)
                 RETURNING job_id, payload",
                (),
            )
            .await
            .map_err(|e| AppError::Queue(format!("Failed to pop job: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?
        {
            Some(row) => Ok(Some(QueueEntry {
                job_id: row.get(0).map_err(|e| AppError::Queue(e.to_string()))?,
                payload: row.get(1).map_err(|e| AppError::Queue(e.to_string()))?,
            })),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM job_queue", ())
            .await
            .map_err(|e| AppError::Queue(format!("Failed to count jobs: {}", e)))?;

        let count = match rows
            .next()
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?
        {
            Some(row) => row
                .get::<i64>(0)
                .map_err(|e| AppError::Queue(e.to_string()))?,
            None => 0,
        };
        Ok(count as usize)
    }
}

#[async_trait]
impl ResultStore for SqliteBackend {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let conn = self.connection().await?;
        let now = now_millis();
        let expires_at = now + ttl.min(MAX_RESULT_TTL).as_millis() as i64;

        conn.execute("DELETE FROM job_results WHERE expires_at <= ?", [now])
            .await
            .map_err(|e| AppError::Queue(format!("Failed to purge results: {}", e)))?;

        conn.execute(
            "INSERT INTO job_results (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            (key, value.as_str(), expires_at),
        )
        .await
        .map_err(|e| AppError::Queue(format!("Failed to store result: {}", e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT value FROM job_results WHERE key = ?1 AND expires_at > ?2",
                (key, now_millis()),
            )
            .await
            .map_err(|e| AppError::Queue(format!("Failed to read result: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Queue(e.to_string()))?
        {
            Some(row) => Ok(Some(
                row.get(0).map_err(|e| AppError::Queue(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.connection().await?;
        let removed = conn
            .execute(
                "DELETE FROM job_results WHERE key = ?1 AND expires_at > ?2",
                (key, now_millis()),
            )
            .await
            .map_err(|e| AppError::Queue(format!("Failed to delete result: {}", e)))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn backend(dir: &TempDir) -> SqliteBackend {
        SqliteBackend::open(dir.path().join("queue/switchboard.db"))
            .await
            .unwrap()
    }

    fn entry(id: &str) -> QueueEntry {
        QueueEntry {
            job_id: id.to_string(),
            payload: format!("{{\"job_id\":\"{}\",\"user_query\":\"q\"}}", id),
        }
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;

        assert_eq!(backend.pop().await.unwrap(), None);
        for id in ["a", "b", "c"] {
            backend.push(entry(id)).await.unwrap();
        }
        assert_eq!(backend.len().await.unwrap(), 3);
        assert_eq!(backend.pop().await.unwrap(), Some(entry("a")));
        assert_eq!(backend.pop().await.unwrap(), Some(entry("b")));
        assert_eq!(backend.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let dir = TempDir::new().unwrap();
        backend(&dir).await.push(entry("persisted")).await.unwrap();

        let reopened = backend(&dir).await;
        assert_eq!(reopened.pop().await.unwrap(), Some(entry("persisted")));
    }

    #[tokio::test]
    async fn test_result_round_trip_and_expiry() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;

        backend
            .set("result:1", "done".to_string(), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(backend.get("result:1").await.unwrap().as_deref(), Some("done"));

        backend
            .set("result:2", "short".to_string(), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(backend.get("result:2").await.unwrap(), None);

        assert!(backend.delete("result:1").await.unwrap());
        assert_eq!(backend.get("result:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_capped_not_wrapped() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir).await;

        backend
            .set("result:1", "done".to_string(), Duration::MAX)
            .await
            .unwrap();
        assert_eq!(backend.get("result:1").await.unwrap().as_deref(), Some("done"));
    }
}
