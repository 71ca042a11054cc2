//! Summarize Worker (C7, §4.7): claim -> fetch PDF -> extract text ->
//! summarize + extract keywords -> schedule `generate`.
//!
//! Grounded in the teacher's `src/agents/paper_analyzer.rs`
//! (`analyze_and_update`'s fetch-text, call-LLM, persist-structured-result
//! sequencing) for the overall body shape; the PDF leg is new, delegating
//! to [`crate::pdf`] (C2).

use crate::error::RefNetResult;
use crate::models::{QueueItem, Stage, Status};
use crate::pdf;
use crate::queue::WorkQueue;
use crate::store::GraphStore;
use crate::summarizer::{LlmProvider, SummarizerClient};
use tracing::instrument;

/// Text shorter than this after extraction fails with `"extraction_failed"` (§4.7).
const MIN_EXTRACTED_CHARS: usize = 100;

/// How many keywords to request and persist per paper (§4.7: `Keywords(text, 10)`).
const KEYWORD_COUNT: usize = 10;

pub struct SummarizeWorker<P: LlmProvider> {
    store: GraphStore,
    queue: WorkQueue,
    http: reqwest::Client,
    summarizer: SummarizerClient<P>,
    max_pdf_bytes: Option<usize>,
}

impl<P: LlmProvider> SummarizeWorker<P> {
    pub fn new(
        store: GraphStore,
        queue: WorkQueue,
        http: reqwest::Client,
        summarizer: SummarizerClient<P>,
        max_pdf_bytes: Option<usize>,
    ) -> Self {
        Self {
            store,
            queue,
            http,
            summarizer,
            max_pdf_bytes,
        }
    }

    /// Handles one claimed `summarize` queue item end to end (§4.7).
    #[instrument(skip(self, item), fields(paper_id = %item.paper_id))]
    pub async fn handle(&self, item: QueueItem) -> RefNetResult<()> {
        let paper_id = item.paper_id.clone();
        self.store
            .set_status(&paper_id, Stage::Summarize, Status::Running)
            .await?;

        let Some(paper) = self.store.get_paper(&paper_id).await? else {
            self.store
                .set_status(&paper_id, Stage::Summarize, Status::Failed)
                .await?;
            self.queue
                .complete(item.id, Status::Failed, Some("not_found"))
                .await?;
            return Ok(());
        };

        let Some(pdf_url) = paper.pdf_url.clone() else {
            return self.no_pdf(&paper_id, &item).await;
        };

        let fetched = match pdf::fetch(&self.http, &pdf_url, self.max_pdf_bytes).await {
            Ok(f) => f,
            Err(_) => return self.no_pdf(&paper_id, &item).await,
        };

        self.store
            .store_pdf_metadata(&paper_id, &fetched.sha256_hex, fetched.size as i64)
            .await?;
        self.store
            .set_pdf_status(&paper_id, Status::Completed)
            .await?;

        let text = pdf::extract(&fetched.bytes).await;
        if text.chars().count() < MIN_EXTRACTED_CHARS {
            self.store
                .set_status(&paper_id, Stage::Summarize, Status::Failed)
                .await?;
            self.queue
                .complete(item.id, Status::Failed, Some("extraction_failed"))
                .await?;
            return Ok(());
        }

        let summary = self.summarizer.summarize(&text).await?;
        self.store
            .store_summary(&paper_id, &summary, &self.summarizer.model_name())
            .await?;

        let keywords = self.summarizer.keywords(&text, KEYWORD_COUNT).await?;
        for (rank, keyword) in keywords.iter().enumerate() {
            let relevance = 1.0 - (rank as f64 / KEYWORD_COUNT.max(1) as f64);
            self.store
                .store_keyword(&paper_id, keyword, relevance, "llm")
                .await?;
        }

        self.store
            .set_status(&paper_id, Stage::Summarize, Status::Completed)
            .await?;
        self.queue.enqueue(&paper_id, Stage::Generate, 60, "{}").await?;
        self.queue.complete(item.id, Status::Completed, None).await
    }

    /// No PDF available (missing URL, or fetch returned `Unavailable`):
    /// `pdf_status=unavailable`, `summary_status=failed("no_pdf")`, still
    /// schedule `generate` (§4.7).
    async fn no_pdf(&self, paper_id: &str, item: &QueueItem) -> RefNetResult<()> {
        self.store
            .set_pdf_status(paper_id, Status::Unavailable)
            .await?;
        self.store
            .set_status(paper_id, Stage::Summarize, Status::Failed)
            .await?;
        self.queue.enqueue(paper_id, Stage::Generate, 60, "{}").await?;
        self.queue
            .complete(item.id, Status::Failed, Some("no_pdf"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Paper;
    use crate::summarizer::{LlmConfig, Message};
    use async_trait::async_trait;

    struct StubProvider {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        fn default_model(&self) -> &str {
            "stub-model"
        }
        async fn complete(&self, _messages: Vec<Message>, _config: &LlmConfig) -> RefNetResult<String> {
            Ok(self.response.clone())
        }
    }

    async fn harness() -> (GraphStore, WorkQueue) {
        let store = GraphStore::connect("sqlite::memory:").await.unwrap();
        let queue = WorkQueue::new(store.pool().clone());
        (store, queue)
    }

    #[tokio::test]
    async fn missing_pdf_url_marks_unavailable_and_schedules_generate() {
        let (store, queue) = harness().await;
        let paper = Paper::placeholder("X", "X");
        store.upsert_paper(&paper).await.unwrap();
        let item_id = queue.enqueue("X", Stage::Summarize, 50, "{}").await.unwrap();
        let item = queue.claim(Stage::Summarize, "w1").await.unwrap().unwrap();
        assert_eq!(item.id, item_id);

        let provider = StubProvider {
            response: "a summary".to_string(),
        };
        let summarizer = SummarizerClient::new(provider, None, 0.3, 1024);
        let worker = SummarizeWorker::new(store.clone(), queue.clone(), reqwest::Client::new(), summarizer, None);
        worker.handle(item).await.unwrap();

        let p = store.get_paper("X").await.unwrap().unwrap();
        assert_eq!(p.pdf_status, Status::Unavailable);
        assert_eq!(p.summary_status, Status::Failed);
        let pending = queue.list_pending(Stage::Generate, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
