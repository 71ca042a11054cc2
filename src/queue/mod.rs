//! Work Queue (C5, §4.5): priority-ordered, persistent, per-stage queues
//! backed by the Graph Store's `processing_queue` table — durable by
//! construction, since every enqueue and transition is a row write there.
//!
//! Grounded in `other_examples/b4518660_.../job_processor_v2.rs.rs`'s
//! `JobProcessorV2` (poll-loop + per-repository job fetch over
//! `sqlx::SqlitePool`) for the persistent-queue-over-SQL pattern.

use crate::error::RefNetResult;
use crate::models::{QueueItem, Stage, Status};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::instrument;

#[derive(Clone)]
pub struct WorkQueue {
    pool: SqlitePool,
}

impl WorkQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `Enqueue(paper, stage, priority, params)`: idempotent on
    /// `(paper, stage, non-terminal)`. If a row with status in
    /// `{pending, running}` already exists, no new row is inserted;
    /// priority is raised to the max of old and new (§4.5).
    #[instrument(skip(self, params))]
    pub async fn enqueue(
        &self,
        paper_id: &str,
        stage: Stage,
        priority: i32,
        params: &str,
    ) -> RefNetResult<i64> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, i32)> = sqlx::query_as(
            r#"
            SELECT id, priority FROM processing_queue
            WHERE paper_id = ? AND task_type = ? AND status IN ('pending', 'running')
            LIMIT 1
            "#,
        )
        .bind(paper_id)
        .bind(stage.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let id = if let Some((id, existing_priority)) = existing {
            if priority > existing_priority {
                sqlx::query("UPDATE processing_queue SET priority = ? WHERE id = ?")
                    .bind(priority)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            id
        } else {
            let result = sqlx::query(
                r#"
                INSERT INTO processing_queue
                    (paper_id, task_type, status, priority, retry_count, max_retries, parameters, created_at)
                VALUES (?, ?, 'pending', ?, 0, ?, ?, ?)
                "#,
            )
            .bind(paper_id)
            .bind(stage.as_str())
            .bind(priority)
            .bind(3i32)
            .bind(params)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            result.last_insert_rowid()
        };

        tx.commit().await?;
        Ok(id)
    }

    /// `Claim(stage, worker_id) -> Item|none`: atomically picks the
    /// highest-priority pending row for `stage` (priority desc, then
    /// created_at asc), transitions it to `running`.
    #[instrument(skip(self))]
    pub async fn claim(&self, stage: Stage, worker_id: &str) -> RefNetResult<Option<QueueItem>> {
        let mut tx = self.pool.begin().await?;

        let candidate: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM processing_queue
            WHERE task_type = ? AND status = 'pending'
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(stage.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query(
            "UPDATE processing_queue SET status = 'running', started_at = ?, worker_id = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(worker_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let item = sqlx::query_as::<_, QueueItem>("SELECT * FROM processing_queue WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(item))
    }

    /// `Complete(item, status, err?)`: transitions `running -> completed|failed`.
    #[instrument(skip(self))]
    pub async fn complete(
        &self,
        item_id: i64,
        status: Status,
        error_message: Option<&str>,
    ) -> RefNetResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE processing_queue
            SET status = ?,
                error_message = ?,
                completed_at = ?,
                execution_time_ms = CAST((JULIANDAY(?) - JULIANDAY(started_at)) * 86400000 AS INTEGER)
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(error_message)
        .bind(now)
        .bind(now)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `Reclaim()`: rows in `running` with `started_at` older than
    /// `lease` revert to `pending` with incremented `retry_count`; past
    /// `max_retries` they go terminal `failed` (§4.5).
    #[instrument(skip(self))]
    pub async fn reclaim(&self, lease: chrono::Duration) -> RefNetResult<u64> {
        let cutoff = Utc::now() - lease;

        let expired: Vec<(i64, i32, i32)> = sqlx::query_as(
            "SELECT id, retry_count, max_retries FROM processing_queue WHERE status = 'running' AND started_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut reclaimed = 0u64;
        for (id, retry_count, max_retries) in expired {
            if retry_count + 1 > max_retries {
                sqlx::query(
                    "UPDATE processing_queue SET status = 'failed', retry_count = retry_count + 1, error_message = 'lease_expired_terminal' WHERE id = ?",
                )
                .bind(id)
                .execute(&self.pool)
                .await?;
            } else {
                sqlx::query(
                    "UPDATE processing_queue SET status = 'pending', retry_count = retry_count + 1, started_at = NULL, worker_id = NULL WHERE id = ?",
                )
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    /// Worker-side completion path for a failed attempt (§7): `Transient`/
    /// `RateLimited` errors retry (back to `pending`, `retry_count`
    /// incremented) while the budget allows; everything else, and retries
    /// once the budget is exhausted, goes terminal `failed` immediately
    /// rather than waiting for a lease to expire.
    #[instrument(skip(self, reason))]
    pub async fn retry_or_fail(
        &self,
        item_id: i64,
        retry_count: i32,
        max_retries: i32,
        retryable: bool,
        reason: &str,
    ) -> RefNetResult<()> {
        if retryable && retry_count + 1 <= max_retries {
            sqlx::query(
                "UPDATE processing_queue SET status = 'pending', retry_count = retry_count + 1, error_message = ?, started_at = NULL, worker_id = NULL WHERE id = ?",
            )
            .bind(reason)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        } else {
            self.complete(item_id, Status::Failed, Some(reason)).await
        }
    }

    /// Purges terminal rows older than `retention_days` (§4.9 maintenance sweep).
    pub async fn purge_old(&self, retention_days: i64) -> RefNetResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let result = sqlx::query(
            "DELETE FROM processing_queue WHERE status IN ('completed', 'failed') AND completed_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// `ListPending(stage, limit)`.
    pub async fn list_pending(&self, stage: Stage, limit: i64) -> RefNetResult<Vec<QueueItem>> {
        let rows = sqlx::query_as::<_, QueueItem>(
            r#"
            SELECT * FROM processing_queue
            WHERE task_type = ? AND status = 'pending'
            ORDER BY priority DESC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(stage.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_queue() -> (WorkQueue, SqlitePool) {
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        for statement in include_str!("../store/schema.sql").split(';') {
            let s = statement.trim();
            if !s.is_empty() {
                sqlx::query(s).execute(&pool).await.unwrap();
            }
        }
        sqlx::query("INSERT INTO papers (id, title, created_at, updated_at) VALUES ('X', 'X', datetime('now'), datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();
        (WorkQueue::new(pool.clone()), pool)
    }

    #[tokio::test]
    async fn duplicate_enqueue_raises_priority_to_max() {
        let (queue, pool) = memory_queue().await;
        queue.enqueue("X", Stage::Crawl, 40, "{}").await.unwrap();
        queue.enqueue("X", Stage::Crawl, 80, "{}").await.unwrap();

        let rows: Vec<(i32,)> =
            sqlx::query_as("SELECT priority FROM processing_queue WHERE paper_id = 'X'")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, 80);
    }

    #[tokio::test]
    async fn claim_returns_highest_priority_first() {
        let (queue, pool) = memory_queue().await;
        sqlx::query("INSERT INTO papers (id, title, created_at, updated_at) VALUES ('Y', 'Y', datetime('now'), datetime('now'))")
            .execute(&pool)
            .await
            .unwrap();
        queue.enqueue("X", Stage::Crawl, 10, "{}").await.unwrap();
        queue.enqueue("Y", Stage::Crawl, 90, "{}").await.unwrap();

        let claimed = queue.claim(Stage::Crawl, "worker-1").await.unwrap().unwrap();
        assert_eq!(claimed.paper_id, "Y");
        assert_eq!(claimed.status, Status::Running);
    }

    #[tokio::test]
    async fn claim_returns_none_when_queue_is_empty() {
        let (queue, _pool) = memory_queue().await;
        let claimed = queue.claim(Stage::Crawl, "worker-1").await.unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn complete_transitions_running_to_completed() {
        let (queue, _pool) = memory_queue().await;
        let id = queue.enqueue("X", Stage::Crawl, 50, "{}").await.unwrap();
        queue.claim(Stage::Crawl, "worker-1").await.unwrap();
        queue.complete(id, Status::Completed, None).await.unwrap();

        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn reclaim_returns_expired_lease_to_pending_with_incremented_retry() {
        let (queue, pool) = memory_queue().await;
        queue.enqueue("X", Stage::Crawl, 50, "{}").await.unwrap();
        queue.claim(Stage::Crawl, "worker-1").await.unwrap();
        // Backdate started_at beyond the lease window.
        sqlx::query("UPDATE processing_queue SET started_at = datetime('now', '-1 hour')")
            .execute(&pool)
            .await
            .unwrap();

        let reclaimed = queue.reclaim(chrono::Duration::minutes(30)).await.unwrap();
        assert_eq!(reclaimed, 1);

        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
    }
}
