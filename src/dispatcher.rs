//! Dispatcher (C9, §4.9): a periodic control loop that re-enqueues missing
//! queue rows for papers stuck `pending` on a stage, reclaims expired
//! queue leases, and purges old terminal rows.
//!
//! Grounded in `other_examples/b4518660_.../job_processor_v2.rs.rs`'s
//! `run()` loop (`loop { poll; sleep(JOB_POLL_INTERVAL) }`) as the direct
//! template for the tick loop; the per-stage scan-and-enqueue logic is new,
//! since no teacher module scans for orphaned work.

use crate::error::RefNetResult;
use crate::models::Stage;
use crate::queue::WorkQueue;
use crate::store::GraphStore;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Per-tick maintenance outcome, surfaced for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub crawl_enqueued: u64,
    pub reclaimed: u64,
    pub purged: u64,
}

pub struct Dispatcher {
    store: GraphStore,
    queue: WorkQueue,
    queue_lease: Duration,
    queue_retention_days: i64,
    scan_limit: i64,
}

impl Dispatcher {
    pub fn new(
        store: GraphStore,
        queue: WorkQueue,
        queue_lease: Duration,
        queue_retention_days: i64,
    ) -> Self {
        Self {
            store,
            queue,
            queue_lease,
            queue_retention_days,
            scan_limit: 500,
        }
    }

    /// Runs ticks forever at `interval`, sleeping between them. Each tick's
    /// errors are logged and swallowed — a transient storage blip should
    /// not kill the dispatcher process; the next tick tries again (§5
    /// "structured concurrency", no process-wide panic on a single
    /// maintenance failure).
    pub async fn run_forever(&self, interval: Duration) -> RefNetResult<()> {
        loop {
            match self.tick().await {
                Ok(report) => info!(?report, "dispatcher tick complete"),
                Err(e) => warn!(error = %e, "dispatcher tick failed"),
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// One full maintenance pass (§4.9): scan for papers `pending` a stage
    /// with no corresponding queue row, Reclaim expired leases, purge
    /// retention-expired terminal rows.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> RefNetResult<TickReport> {
        let crawl_enqueued = self.enqueue_missing_crawl().await?;
        let reclaimed = self.queue.reclaim(chrono::Duration::from_std(self.queue_lease).unwrap_or(chrono::Duration::minutes(30))).await?;
        let purged = self.queue.purge_old(self.queue_retention_days).await?;
        Ok(TickReport {
            crawl_enqueued,
            reclaimed,
            purged,
        })
    }

    /// Re-enqueues `crawl` jobs for papers whose `crawl_status = pending`
    /// but have no matching non-terminal queue row — covering the case
    /// where an enqueue was attempted but lost (process crash between
    /// `UpsertPaper` and `Enqueue`, broker message dropped, ...).
    async fn enqueue_missing_crawl(&self) -> RefNetResult<u64> {
        let candidates = self.store.papers_pending_stage_without_queue_row(Stage::Crawl, self.scan_limit).await?;
        let mut enqueued = 0u64;
        for paper_id in candidates {
            self.queue
                .enqueue(&paper_id, Stage::Crawl, crate::recursion::PRIORITY_FLOOR, "{\"hop\":0,\"max_hops\":0}")
                .await?;
            enqueued += 1;
        }
        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Paper, Status};

    async fn harness() -> (GraphStore, WorkQueue) {
        let store = GraphStore::connect("sqlite::memory:").await.unwrap();
        let queue = WorkQueue::new(store.pool().clone());
        (store, queue)
    }

    #[tokio::test]
    async fn tick_reclaims_expired_leases() {
        let (store, queue) = harness().await;
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();
        queue.enqueue("X", Stage::Crawl, 50, "{}").await.unwrap();
        queue.claim(Stage::Crawl, "w1").await.unwrap();
        sqlx::query("UPDATE processing_queue SET started_at = datetime('now', '-2 hours')")
            .execute(store.pool())
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), Duration::from_secs(1800), 30);
        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.reclaimed, 1);

        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
    }

    #[tokio::test]
    async fn tick_enqueues_missing_crawl_jobs() {
        let (store, queue) = harness().await;
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();
        // X has crawl_status = pending (default) but no queue row at all.

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), Duration::from_secs(1800), 30);
        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.crawl_enqueued, 1);

        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].paper_id, "X");
    }

    #[tokio::test]
    async fn tick_does_not_duplicate_existing_crawl_row() {
        let (store, queue) = harness().await;
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();
        queue.enqueue("X", Stage::Crawl, 50, "{}").await.unwrap();

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), Duration::from_secs(1800), 30);
        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.crawl_enqueued, 0);

        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn tick_skips_papers_whose_crawl_already_completed() {
        let (store, queue) = harness().await;
        let mut paper = Paper::placeholder("X", "X");
        paper.crawl_status = Status::Completed;
        store.upsert_paper(&paper).await.unwrap();

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), Duration::from_secs(1800), 30);
        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.crawl_enqueued, 0);
    }
}
