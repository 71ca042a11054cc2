//! Ingress (C10, §4.10): the single external entry point. `Start(seed_id,
//! max_hops)` creates a placeholder Paper row and enqueues its first
//! `crawl` job at max priority.
//!
//! Grounded in the teacher's `src/client/mod.rs` request-building pattern
//! (thin typed wrapper in front of one side effect) for the function shape;
//! the HTTP collaborator described in §6 ("Ingress API... described here
//! only for its contract with the core") is out of scope — this module is
//! the core's callable surface a thin HTTP layer would sit in front of.

use crate::error::RefNetResult;
use crate::models::{CrawlParams, Paper, Stage};
use crate::queue::WorkQueue;
use crate::store::GraphStore;
use tracing::instrument;

/// Highest queue priority, reserved for seed papers (§4.10).
const SEED_PRIORITY: i32 = 100;

/// Result of `Start`: the seed paper's id and the queue item id a caller
/// can poll for status (§4.10, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartResult {
    pub paper_id: String,
    pub task_id: i64,
}

pub struct Ingress {
    store: GraphStore,
    queue: WorkQueue,
}

impl Ingress {
    pub fn new(store: GraphStore, queue: WorkQueue) -> Self {
        Self { store, queue }
    }

    /// `Start(seed_id, max_hops)` (§4.10): creates the seed Paper row if
    /// absent (all three statuses `pending`, via `Paper::placeholder`) and
    /// enqueues its `crawl` job at priority 100 with `hop_count=0`.
    /// Idempotent: calling `Start` again for an id already mid-crawl just
    /// returns a fresh (or existing, per `Enqueue`'s own idempotency) queue
    /// item rather than erroring.
    #[instrument(skip(self))]
    pub async fn start(&self, seed_id: &str, max_hops: u32) -> RefNetResult<StartResult> {
        if self.store.get_paper(seed_id).await?.is_none() {
            self.store
                .upsert_paper(&Paper::placeholder(seed_id, seed_id))
                .await?;
        }

        let params = serde_json::to_string(&CrawlParams { hop: 0, max_hops }).unwrap();
        let task_id = self
            .queue
            .enqueue(seed_id, Stage::Crawl, SEED_PRIORITY, &params)
            .await?;

        Ok(StartResult {
            paper_id: seed_id.to_string(),
            task_id,
        })
    }

    /// `{paper_id, crawl_status, pdf_status, summary_status}` for status
    /// polling (§6 Ingress API GET contract).
    pub async fn status(&self, paper_id: &str) -> RefNetResult<Option<PaperStatus>> {
        Ok(self
            .store
            .get_paper(paper_id)
            .await?
            .map(|p| PaperStatus {
                paper_id: p.id,
                crawl_status: p.crawl_status,
                pdf_status: p.pdf_status,
                summary_status: p.summary_status,
            }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperStatus {
    pub paper_id: String,
    pub crawl_status: crate::models::Status,
    pub pdf_status: crate::models::Status,
    pub summary_status: crate::models::Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;

    async fn harness() -> (GraphStore, WorkQueue) {
        let store = GraphStore::connect("sqlite::memory:").await.unwrap();
        let queue = WorkQueue::new(store.pool().clone());
        (store, queue)
    }

    #[tokio::test]
    async fn start_creates_placeholder_and_enqueues_at_max_priority() {
        let (store, queue) = harness().await;
        let ingress = Ingress::new(store.clone(), queue.clone());

        let result = ingress.start("SEED1", 2).await.unwrap();
        assert_eq!(result.paper_id, "SEED1");

        let paper = store.get_paper("SEED1").await.unwrap().unwrap();
        assert_eq!(paper.crawl_status, Status::Pending);
        assert_eq!(paper.pdf_status, Status::Pending);
        assert_eq!(paper.summary_status, Status::Pending);

        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, result.task_id);
        assert_eq!(pending[0].priority, SEED_PRIORITY);

        let params: CrawlParams = serde_json::from_str(&pending[0].parameters).unwrap();
        assert_eq!(params.hop, 0);
        assert_eq!(params.max_hops, 2);
    }

    #[tokio::test]
    async fn start_is_idempotent_on_existing_paper() {
        let (store, queue) = harness().await;
        let ingress = Ingress::new(store.clone(), queue.clone());

        ingress.start("SEED1", 2).await.unwrap();
        ingress.start("SEED1", 2).await.unwrap();

        // Enqueue's own non-terminal uniqueness keeps this at one row.
        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn status_reports_none_for_unknown_paper() {
        let (store, queue) = harness().await;
        let ingress = Ingress::new(store, queue);
        assert!(ingress.status("UNKNOWN").await.unwrap().is_none());
    }
}
