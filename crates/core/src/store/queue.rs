//! Mutation queue operations.
//!
//! The queue holds every non-idempotent request that failed to reach the
//! origin, in enqueue order. Entries advance monotonically toward a
//! terminal state: delivered (2xx), rejected (4xx), or abandoned to the
//! dead-letter log once the retry ceiling is exceeded.

use std::collections::HashMap;

use super::connection::CacheDb;
use crate::Error;
use crate::exchange::HttpRequest;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// One queued mutation: a serialized request snapshot plus retry
/// accounting. The retry count only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMutation {
    pub id: String,
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub enqueued_at: String,
    pub retry_count: u32,
}

impl QueuedMutation {
    /// Snapshot a write request that could not be sent.
    ///
    /// Ids are time-ordered (UUID v7) so id order agrees with enqueue
    /// order even within one timestamp.
    pub fn from_request(request: &HttpRequest) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            url: request.url.to_string(),
            method: request.method.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            enqueued_at: chrono::Utc::now().to_rfc3339(),
            retry_count: 0,
        }
    }
}

/// A mutation abandoned after exceeding the retry ceiling, preserved
/// for diagnostics rather than dropped silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: String,
    pub url: String,
    pub method: String,
    pub body: Option<String>,
    pub enqueued_at: String,
    pub retry_count: u32,
    pub abandoned_at: String,
    pub reason: String,
}

impl CacheDb {
    /// Persist a new queued mutation.
    pub async fn enqueue_mutation(&self, mutation: &QueuedMutation) -> Result<(), Error> {
        let mutation = mutation.clone();
        let headers_json = serde_json::to_string(&mutation.headers)?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO mutation_queue (id, url, method, headers_json, body, enqueued_at, retry_count)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        &mutation.id,
                        &mutation.url,
                        &mutation.method,
                        &headers_json,
                        &mutation.body,
                        &mutation.enqueued_at,
                        mutation.retry_count,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// All pending mutations in enqueue order (FIFO).
    pub async fn pending_mutations(&self) -> Result<Vec<QueuedMutation>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<QueuedMutation>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, url, method, headers_json, body, enqueued_at, retry_count
                    FROM mutation_queue ORDER BY enqueued_at, id",
                )?;

                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, u32>(6)?,
                    ))
                })?;

                let mut mutations = Vec::new();
                for row in rows {
                    let (id, url, method, headers_json, body, enqueued_at, retry_count) = row?;
                    let headers: HashMap<String, String> =
                        serde_json::from_str(&headers_json).map_err(Error::from)?;
                    mutations.push(QueuedMutation { id, url, method, headers, body, enqueued_at, retry_count });
                }
                Ok(mutations)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of pending mutations.
    pub async fn queue_len(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove a mutation that reached a terminal state.
    ///
    /// Returns false if no entry with that id existed (already removed
    /// by an earlier pass, which is not an error).
    pub async fn delete_mutation(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM mutation_queue WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Record one more failed delivery attempt. Returns the new count.
    pub async fn bump_mutation_retry(&self, id: &str) -> Result<u32, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<u32, Error> {
                let updated = conn
                    .execute("UPDATE mutation_queue SET retry_count = retry_count + 1 WHERE id = ?1", params![id])?;
                if updated == 0 {
                    return Err(Error::MutationNotFound(id));
                }
                let count: u32 =
                    conn.query_row("SELECT retry_count FROM mutation_queue WHERE id = ?1", params![id], |row| {
                        row.get(0)
                    })?;
                Ok(count)
            })
            .await
            .map_err(Error::from)
    }

    /// Move a mutation from the queue to the dead-letter log in one
    /// transaction, then trim the log to `cap` newest entries.
    pub async fn dead_letter_mutation(&self, id: &str, reason: &str, cap: usize) -> Result<(), Error> {
        let id = id.to_string();
        let reason = reason.to_string();
        let abandoned_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;

                let moved = tx.execute(
                    "INSERT INTO dead_letters
                        (id, url, method, headers_json, body, enqueued_at, retry_count, abandoned_at, reason)
                    SELECT id, url, method, headers_json, body, enqueued_at, retry_count, ?2, ?3
                    FROM mutation_queue WHERE id = ?1",
                    params![id, abandoned_at, reason],
                )?;
                if moved == 0 {
                    return Err(Error::MutationNotFound(id));
                }

                tx.execute("DELETE FROM mutation_queue WHERE id = ?1", params![id])?;
                tx.execute(
                    "DELETE FROM dead_letters WHERE id NOT IN (
                        SELECT id FROM dead_letters ORDER BY abandoned_at DESC, id DESC LIMIT ?1
                    )",
                    params![cap as i64],
                )?;

                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Abandoned mutations, newest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<DeadLetter>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, url, method, body, enqueued_at, retry_count, abandoned_at, reason
                    FROM dead_letters ORDER BY abandoned_at DESC, id DESC",
                )?;

                let letters = stmt
                    .query_map([], |row| {
                        Ok(DeadLetter {
                            id: row.get(0)?,
                            url: row.get(1)?,
                            method: row.get(2)?,
                            body: row.get(3)?,
                            enqueued_at: row.get(4)?,
                            retry_count: row.get(5)?,
                            abandoned_at: row.get(6)?,
                            reason: row.get(7)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(letters)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of dead-lettered mutations.
    pub async fn dead_letter_len(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM dead_letters", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn make_mutation(url: &str, body: &str) -> QueuedMutation {
        let request = HttpRequest::with_body("POST", Url::parse(url).unwrap(), body);
        QueuedMutation::from_request(&request)
    }

    #[tokio::test]
    async fn test_enqueue_and_pending() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mutation = make_mutation("https://planner.test/api/guests", r#"{"name":"A"}"#);

        db.enqueue_mutation(&mutation).await.unwrap();

        let pending = db.pending_mutations().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, mutation.id);
        assert_eq!(pending[0].method, "POST");
        assert_eq!(pending[0].body.as_deref(), Some(r#"{"name":"A"}"#));
        assert_eq!(pending[0].retry_count, 0);
    }

    #[tokio::test]
    async fn test_pending_is_fifo() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let first = make_mutation("https://planner.test/api/guests", "1");
        let second = make_mutation("https://planner.test/api/vendors", "2");
        let third = make_mutation("https://planner.test/api/budget", "3");
        for m in [&first, &second, &third] {
            db.enqueue_mutation(m).await.unwrap();
        }

        let pending = db.pending_mutations().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str(), third.id.as_str()]);
    }

    #[tokio::test]
    async fn test_delete_mutation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mutation = make_mutation("https://planner.test/api/guests", "{}");
        db.enqueue_mutation(&mutation).await.unwrap();

        assert!(db.delete_mutation(&mutation.id).await.unwrap());
        assert!(!db.delete_mutation(&mutation.id).await.unwrap());
        assert_eq!(db.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bump_retry_is_monotone() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mutation = make_mutation("https://planner.test/api/guests", "{}");
        db.enqueue_mutation(&mutation).await.unwrap();

        assert_eq!(db.bump_mutation_retry(&mutation.id).await.unwrap(), 1);
        assert_eq!(db.bump_mutation_retry(&mutation.id).await.unwrap(), 2);
        assert_eq!(db.bump_mutation_retry(&mutation.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bump_retry_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.bump_mutation_retry("no-such-id").await;
        assert!(matches!(result, Err(Error::MutationNotFound(_))));
    }

    #[tokio::test]
    async fn test_dead_letter_moves_record() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mutation = make_mutation("https://planner.test/api/guests", r#"{"name":"A"}"#);
        db.enqueue_mutation(&mutation).await.unwrap();
        db.bump_mutation_retry(&mutation.id).await.unwrap();

        db.dead_letter_mutation(&mutation.id, "retry ceiling exceeded", 100).await.unwrap();

        assert_eq!(db.queue_len().await.unwrap(), 0);
        let letters = db.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].id, mutation.id);
        assert_eq!(letters[0].retry_count, 1);
        assert_eq!(letters[0].reason, "retry ceiling exceeded");
    }

    #[tokio::test]
    async fn test_dead_letter_cap_trims_oldest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mut ids = Vec::new();
        for i in 0..4 {
            let mutation = make_mutation("https://planner.test/api/guests", &format!("{{\"n\":{i}}}"));
            ids.push(mutation.id.clone());
            db.enqueue_mutation(&mutation).await.unwrap();
            db.dead_letter_mutation(&mutation.id, "retry ceiling exceeded", 2).await.unwrap();
        }

        let letters = db.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 2);
        // Newest two survive.
        assert_eq!(letters[0].id, ids[3]);
        assert_eq!(letters[1].id, ids[2]);
    }

    #[tokio::test]
    async fn test_dead_letter_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.dead_letter_mutation("no-such-id", "reason", 100).await;
        assert!(matches!(result, Err(Error::MutationNotFound(_))));
    }
}
