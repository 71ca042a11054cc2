//! Crawl Worker (C6, §4.6): resolves a paper via the Catalog Client, writes
//! it and its neighbors to the Graph Store, and fans out qualified
//! neighbors as further `crawl` jobs.

use crate::catalog::{CatalogClient, NormalizedPaper};
use crate::error::RefNetResult;
use crate::models::{Author, CrawlParams, Paper, RelationType, Stage, Status};
use crate::queue::WorkQueue;
use crate::recursion::{qualify, Candidate, Qualification};
use crate::store::GraphStore;
use chrono::Duration as ChronoDuration;
use tracing::instrument;

/// Papers re-crawled within this window of their last successful crawl are
/// not re-fetched from the catalog (§4.6 edge-case policy).
const STALENESS_WINDOW: ChronoDuration = ChronoDuration::hours(24);

/// Per-call page size when fetching citations/references (§4.6 step 4).
const NEIGHBOR_PAGE_SIZE: u32 = 100;

pub struct CrawlWorker<C: CatalogClient> {
    store: GraphStore,
    queue: WorkQueue,
    catalog: C,
    max_hops: u32,
}

impl<C: CatalogClient> CrawlWorker<C> {
    pub fn new(store: GraphStore, queue: WorkQueue, catalog: C, max_hops: u32) -> Self {
        Self {
            store,
            queue,
            catalog,
            max_hops,
        }
    }

    /// Handles one claimed `crawl` queue item end to end (§4.6 steps 1-6).
    #[instrument(skip(self, item), fields(paper_id = %item.paper_id))]
    pub async fn handle(&self, item: crate::models::QueueItem) -> RefNetResult<()> {
        let params: CrawlParams =
            serde_json::from_str(&item.parameters).unwrap_or(CrawlParams { hop: 0, max_hops: self.max_hops });
        let paper_id = item.paper_id.clone();

        self.store.set_status(&paper_id, Stage::Crawl, Status::Running).await?;

        let cached = self.store.get_paper(&paper_id).await?;
        let reuse_cached = cached.as_ref().is_some_and(|p| {
            p.crawl_status == Status::Completed
                && p.last_crawled_at
                    .is_some_and(|t| chrono::Utc::now() - t < STALENESS_WINDOW)
        });

        let paper = if reuse_cached {
            cached.unwrap()
        } else {
            let fetched = match self.catalog.get_paper(&paper_id).await {
                Ok(p) => p,
                Err(e) => {
                    self.store
                        .set_status(&paper_id, Stage::Crawl, Status::Failed)
                        .await
                        .ok();
                    self.queue
                        .complete(item.id, Status::Failed, Some(e.reason_code()))
                        .await?;
                    return Ok(());
                }
            };

            self.upsert_normalized(&fetched).await?;

            if params.hop < self.max_hops {
                self.fan_out(&paper_id, params.hop).await?;
            }

            self.store.set_status(&paper_id, Stage::Crawl, Status::Completed).await?;
            self.store.get_paper(&paper_id).await?.expect("just upserted")
        };

        if paper.pdf_url.is_some() {
            self.queue.enqueue(&paper_id, Stage::Summarize, 50, "{}").await?;
        } else {
            self.queue.enqueue(&paper_id, Stage::Generate, 30, "{}").await?;
        }

        self.queue.complete(item.id, Status::Completed, None).await
    }

    async fn upsert_normalized(&self, fetched: &NormalizedPaper) -> RefNetResult<()> {
        let mut paper = Paper::placeholder(&fetched.id, &fetched.title);
        paper.abstract_text = fetched.abstract_text.clone();
        paper.year = fetched.year;
        paper.citation_count = fetched.citation_count;
        paper.reference_count = fetched.reference_count;
        paper.pdf_url = fetched.open_access_pdf_url.clone();
        paper.is_open_access = fetched.open_access_pdf_url.is_some();
        self.store.upsert_paper(&paper).await?;

        for (position, author) in fetched.authors.iter().enumerate() {
            self.store
                .upsert_author(&Author::new(&author.id, &author.name))
                .await?;
            self.store
                .link_author(&fetched.id, &author.id, position as i32)
                .await?;
        }

        for (id_type, external_id) in &fetched.external_ids {
            self.store.insert_external_id(&fetched.id, id_type, external_id).await?;
        }

        Ok(())
    }

    /// Fetches citations and references for `paper_id` and enqueues
    /// qualified neighbors as `crawl` jobs at `hop + 1` (§4.6 step 4).
    async fn fan_out(&self, paper_id: &str, hop: u32) -> RefNetResult<()> {
        let citations = self.catalog.get_citations(paper_id, NEIGHBOR_PAGE_SIZE, 0).await?;
        let references = self.catalog.get_references(paper_id, NEIGHBOR_PAGE_SIZE, 0).await?;

        for neighbor in &citations {
            self.discover_neighbor(paper_id, neighbor, RelationType::Citation, hop).await?;
        }
        for neighbor in &references {
            self.discover_neighbor(paper_id, neighbor, RelationType::Reference, hop).await?;
        }
        Ok(())
    }

    async fn discover_neighbor(
        &self,
        paper_id: &str,
        neighbor: &NormalizedPaper,
        relation: RelationType,
        hop: u32,
    ) -> RefNetResult<()> {
        if neighbor.id.is_empty() || neighbor.id == paper_id {
            return Ok(());
        }

        let (source, target) = match relation {
            RelationType::Citation => (neighbor.id.as_str(), paper_id),
            RelationType::Reference => (paper_id, neighbor.id.as_str()),
        };
        self.store.insert_edge(source, target, relation, hop as i32 + 1).await?;

        if self.store.get_paper(&neighbor.id).await?.is_none() {
            self.store
                .upsert_paper(&Paper::placeholder(&neighbor.id, &neighbor.title))
                .await?;
        }

        let candidate = Candidate {
            paper_id: neighbor.id.clone(),
            title: neighbor.title.clone(),
            citation_count: neighbor.citation_count,
        };
        if let Qualification::Enqueue { paper_id, priority, hop } =
            qualify(&candidate, hop + 1, self.max_hops)
        {
            let params = serde_json::to_string(&CrawlParams { hop, max_hops: self.max_hops })
                .unwrap_or_else(|_| "{}".to_string());
            self.queue.enqueue(&paper_id, Stage::Crawl, priority, &params).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MockCatalogClient;
    use crate::models::QueueItem;

    async fn harness() -> (GraphStore, WorkQueue) {
        let store = GraphStore::connect("sqlite::memory:").await.unwrap();
        let queue = WorkQueue::new(store.pool().clone());
        (store, queue)
    }

    fn paper(id: &str, title: &str, citations: i64, pdf: Option<&str>) -> NormalizedPaper {
        NormalizedPaper {
            id: id.to_string(),
            title: title.to_string(),
            abstract_text: None,
            year: Some(2020),
            citation_count: citations,
            reference_count: 0,
            authors: vec![],
            venue: None,
            journal: None,
            external_ids: vec![],
            fields_of_study: vec![],
            open_access_pdf_url: pdf.map(|s| s.to_string()),
        }
    }

    fn item(paper_id: &str, hop: u32, max_hops: u32) -> QueueItem {
        QueueItem {
            id: 1,
            paper_id: paper_id.to_string(),
            task_type: "crawl".to_string(),
            status: Status::Running,
            priority: 100,
            retry_count: 0,
            max_retries: 3,
            error_message: None,
            execution_time_ms: None,
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
            worker_id: Some("test".to_string()),
            parameters: serde_json::to_string(&CrawlParams { hop, max_hops }).unwrap(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn seed_with_no_pdf_completes_crawl_and_enqueues_generate() {
        let (store, queue) = harness().await;
        let mut catalog = MockCatalogClient::new();
        catalog.papers.insert("X".into(), paper("X", "Seed", 0, None));
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();

        let worker = CrawlWorker::new(store.clone(), queue.clone(), catalog, 0);
        worker.handle(item("X", 0, 0)).await.unwrap();

        let p = store.get_paper("X").await.unwrap().unwrap();
        assert_eq!(p.crawl_status, Status::Completed);
        let pending = queue.list_pending(Stage::Generate, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn with_pdf_url_enqueues_summarize_instead_of_generate() {
        let (store, queue) = harness().await;
        let mut catalog = MockCatalogClient::new();
        catalog
            .papers
            .insert("X".into(), paper("X", "Seed", 0, Some("https://example.com/x.pdf")));
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();

        let worker = CrawlWorker::new(store.clone(), queue.clone(), catalog, 0);
        worker.handle(item("X", 0, 0)).await.unwrap();

        let pending = queue.list_pending(Stage::Summarize, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn expansion_near_hop_budget_drops_low_citation_neighbor() {
        // Mirrors recursion.rs's `should_recurse_rejects_below_priority_floor`
        // (hop=9, max_hops=10, citation_count=0 -> priority=5): the floor is
        // only reachable once `1 - hop/max_hops` is small, so the fixture
        // runs X at hop=8/max_hops=10 rather than hop=0/max_hops=2 — at
        // hop=1/max_hops=2 the lowest achievable priority is 25, which never
        // clears the floor regardless of citation count.
        let (store, queue) = harness().await;
        let mut catalog = MockCatalogClient::new();
        catalog.papers.insert("X".into(), paper("X", "Seed", 0, None));
        catalog.citations.insert(
            "X".into(),
            vec![paper("Y", "High citation", 500, None), paper("Z", "Low citation", 2, None)],
        );
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();

        let worker = CrawlWorker::new(store.clone(), queue.clone(), catalog, 10);
        worker.handle(item("X", 8, 10)).await.unwrap();

        assert!(store.get_paper("Y").await.unwrap().is_some());
        assert!(store.get_paper("Z").await.unwrap().is_some());
        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        let qualified_ids: Vec<_> = pending.iter().map(|i| i.paper_id.as_str()).collect();
        assert!(qualified_ids.contains(&"Y"));
        assert!(!qualified_ids.contains(&"Z"));
    }

    #[tokio::test]
    async fn unknown_paper_marks_crawl_failed() {
        let (store, queue) = harness().await;
        let catalog = MockCatalogClient::new();
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();

        let worker = CrawlWorker::new(store.clone(), queue.clone(), catalog, 0);
        worker.handle(item("X", 0, 0)).await.unwrap();

        let p = store.get_paper("X").await.unwrap().unwrap();
        assert_eq!(p.crawl_status, Status::Failed);
    }
}
