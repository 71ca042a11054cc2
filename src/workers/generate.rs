//! Generate Worker (C8, §4.8): renders a paper's Markdown vault entry,
//! (re)generates the vault index and viewer config, and may enqueue a
//! bounded number of follow-up `crawl` jobs for unseen references.
//!
//! No teacher module renders Markdown (the template strings are data per
//! §1's non-goals, but assembling them is still this worker's job), so the
//! front-matter/section assembly below is new, written in the teacher's
//! plain `format!`-based string-building style (no templating engine
//! dependency, matching the absence of one anywhere in the teacher's
//! stack). The aggregate statistics backing the index file are grounded in
//! the teacher's `CitationStatistics::from_papers` (`src/export.rs`):
//! year histogram, top-N by citation count, most-recent — computed here
//! directly over [`GraphStore`] rows instead of an in-memory `Vec`.

use crate::error::RefNetResult;
use crate::models::{Paper, QueueItem, RelationType, Stage, Status};
use crate::queue::WorkQueue;
use crate::recursion::{qualify, Candidate, Qualification};
use crate::store::GraphStore;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Cap on follow-up `crawl` jobs enqueued per `generate` run (§4.8: "up to N (e.g., 5)").
const MAX_FOLLOWUP_CRAWLS: usize = 5;

/// Delay parameter recorded on follow-up crawl jobs to avoid immediate
/// bursts (§4.8: "countdown ≈ 10s"). The queue itself has no native delay
/// mechanism, so this is carried in `parameters` for a dispatcher/worker
/// that chooses to honor it; claim ordering (priority, then FIFO) already
/// keeps a burst of low-priority follow-ups from starving other work.
const FOLLOWUP_COUNTDOWN_SECS: u64 = 10;

/// Directory under the vault holding per-paper Markdown (§6).
const PAPERS_SUBDIR: &str = "papers";

pub struct GenerateWorker {
    store: GraphStore,
    queue: WorkQueue,
    vault_path: PathBuf,
    max_hops: u32,
}

impl GenerateWorker {
    pub fn new(store: GraphStore, queue: WorkQueue, vault_path: impl Into<PathBuf>, max_hops: u32) -> Self {
        Self {
            store,
            queue,
            vault_path: vault_path.into(),
            max_hops,
        }
    }

    /// Handles one claimed `generate` queue item end to end (§4.8).
    #[instrument(skip(self, item), fields(paper_id = %item.paper_id))]
    pub async fn handle(&self, item: QueueItem) -> RefNetResult<()> {
        let paper_id = item.paper_id.clone();
        let Some(paper) = self.store.get_paper(&paper_id).await? else {
            self.queue
                .complete(item.id, Status::Failed, Some("not_found"))
                .await?;
            return Ok(());
        };

        let neighbors = self.store.get_neighbors(&paper_id, 500).await?;
        let markdown = self.render_markdown(&paper, &neighbors).await?;
        self.write_atomic(&self.paper_path(&paper_id), &markdown)?;

        self.regenerate_index().await?;
        self.write_viewer_config_if_absent()?;

        self.schedule_followup_crawls(&paper_id, &neighbors).await?;

        self.queue.complete(item.id, Status::Completed, None).await
    }

    fn paper_path(&self, paper_id: &str) -> PathBuf {
        self.vault_path.join(PAPERS_SUBDIR).join(format!("{}.md", sanitize_filename(paper_id)))
    }

    /// Front-matter + sections: basic info, summary, abstract, relations
    /// grouped by hop distance, keywords ordered by relevance desc,
    /// external links, metadata (§4.8).
    async fn render_markdown(
        &self,
        paper: &Paper,
        neighbors: &[crate::models::PaperRelation],
    ) -> RefNetResult<String> {
        let keywords = self.keywords_for(&paper.id).await?;
        let external_ids = self.external_ids_for(&paper.id).await?;
        let authors = self.authors_for(&paper.id).await?;

        let mut out = String::new();

        out.push_str("---\n");
        out.push_str(&format!("paper_id: {}\n", paper.id));
        out.push_str(&format!("title: \"{}\"\n", escape_yaml(&paper.title)));
        out.push_str(&format!("year: {}\n", opt_to_yaml(paper.year)));
        out.push_str(&format!("citation_count: {}\n", paper.citation_count));
        out.push_str(&format!("reference_count: {}\n", paper.reference_count));
        out.push_str(&format!(
            "authors: [{}]\n",
            authors.iter().map(|a| format!("\"{}\"", escape_yaml(a))).collect::<Vec<_>>().join(", ")
        ));
        out.push_str(&format!(
            "tags: [{}]\n",
            derive_tags(paper).iter().map(|t| format!("\"{t}\"")).collect::<Vec<_>>().join(", ")
        ));
        out.push_str(&format!(
            "keywords: [{}]\n",
            keywords.iter().map(|(k, _)| format!("\"{}\"", escape_yaml(k))).collect::<Vec<_>>().join(", ")
        ));
        out.push_str("---\n\n");

        out.push_str(&format!("# {}\n\n", paper.title));

        out.push_str("## Basic Info\n\n");
        out.push_str(&format!("- **Year:** {}\n", opt_to_display(paper.year)));
        out.push_str(&format!("- **Authors:** {}\n", if authors.is_empty() { "unknown".into() } else { authors.join(", ") }));
        out.push_str(&format!("- **Citations:** {}\n", paper.citation_count));
        out.push_str(&format!("- **References:** {}\n", paper.reference_count));
        out.push_str(&format!("- **Open access:** {}\n\n", paper.is_open_access));

        out.push_str("## Summary\n\n");
        match &paper.summary {
            Some(s) if !s.is_empty() => out.push_str(&format!("{s}\n\n")),
            _ if paper.pdf_url.is_none() => out.push_str("_PDF not available; no summary could be generated._\n\n"),
            _ => out.push_str("_No summary available._\n\n"),
        }

        out.push_str("## Abstract\n\n");
        match &paper.abstract_text {
            Some(a) if !a.is_empty() => out.push_str(&format!("{a}\n\n")),
            _ => out.push_str("_No abstract available._\n\n"),
        }

        out.push_str("## Relations\n\n");
        self.render_relations(&mut out, paper, neighbors).await?;

        out.push_str("## Keywords\n\n");
        if keywords.is_empty() {
            out.push_str("_No keywords extracted._\n\n");
        } else {
            for (keyword, relevance) in &keywords {
                out.push_str(&format!("- {keyword} ({relevance:.2})\n"));
            }
            out.push('\n');
        }

        out.push_str("## External Links\n\n");
        if external_ids.is_empty() {
            out.push_str("_No external identifiers._\n\n");
        } else {
            for (id_type, external_id) in &external_ids {
                out.push_str(&format!("- **{id_type}:** {external_id}\n"));
            }
            out.push('\n');
        }

        out.push_str("## Metadata\n\n");
        out.push_str(&format!("- **Crawl status:** {}\n", paper.crawl_status));
        out.push_str(&format!("- **PDF status:** {}\n", paper.pdf_status));
        out.push_str(&format!("- **Summary status:** {}\n", paper.summary_status));
        out.push_str(&format!("- **Last crawled:** {}\n", opt_time_to_display(paper.last_crawled_at)));
        out.push_str(&format!("- **Generated at:** {}\n", chrono::Utc::now().to_rfc3339()));

        Ok(out)
    }

    async fn render_relations(
        &self,
        out: &mut String,
        paper: &Paper,
        neighbors: &[crate::models::PaperRelation],
    ) -> RefNetResult<()> {
        let mut citing = Vec::new();
        let mut cited = Vec::new();
        for rel in neighbors {
            match rel.relation_type {
                RelationType::Citation if rel.target_id == paper.id => citing.push(rel),
                RelationType::Reference if rel.source_id == paper.id => cited.push(rel),
                _ => {}
            }
        }
        citing.sort_by_key(|r| r.hop_count);
        cited.sort_by_key(|r| r.hop_count);

        out.push_str(&format!("### Cited by ({})\n\n", citing.len()));
        for rel in &citing {
            let other = self.store.get_paper(&rel.source_id).await?;
            let title = other.map(|p| p.title).unwrap_or_else(|| rel.source_id.clone());
            out.push_str(&format!(
                "- [[{}|{}]] (hop {})\n",
                sanitize_filename(&rel.source_id),
                title,
                rel.hop_count
            ));
        }
        out.push('\n');

        out.push_str(&format!("### References ({})\n\n", cited.len()));
        for rel in &cited {
            let other = self.store.get_paper(&rel.target_id).await?;
            let title = other.map(|p| p.title).unwrap_or_else(|| rel.target_id.clone());
            out.push_str(&format!(
                "- [[{}|{}]] (hop {})\n",
                sanitize_filename(&rel.target_id),
                title,
                rel.hop_count
            ));
        }
        out.push('\n');
        Ok(())
    }

    async fn keywords_for(&self, paper_id: &str) -> RefNetResult<Vec<(String, f64)>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT keyword, relevance FROM keywords WHERE paper_id = ? ORDER BY relevance DESC",
        )
        .bind(paper_id)
        .fetch_all(self.store.pool())
        .await?;
        Ok(rows)
    }

    async fn external_ids_for(&self, paper_id: &str) -> RefNetResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id_type, external_id FROM external_ids WHERE paper_id = ?",
        )
        .bind(paper_id)
        .fetch_all(self.store.pool())
        .await?;
        Ok(rows)
    }

    async fn authors_for(&self, paper_id: &str) -> RefNetResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT a.name FROM authors a
            JOIN paper_authors pa ON pa.author_id = a.id
            WHERE pa.paper_id = ?
            ORDER BY pa.position ASC
            "#,
        )
        .bind(paper_id)
        .fetch_all(self.store.pool())
        .await?;
        Ok(rows.into_iter().map(|(n,)| n).collect())
    }

    /// (Re)generates `<vault>/README.md`: total paper count, total
    /// citations, year histogram, top-10 by citation count, 10 most recent
    /// (§4.8).
    async fn regenerate_index(&self) -> RefNetResult<()> {
        let count = self.store.paper_count().await?;
        let total_citations = self.store.total_citation_count().await?;
        let histogram = self.store.year_histogram().await?;
        let top_cited = self.store.top_cited(10).await?;
        let recent = self.store.most_recent(10).await?;

        let mut out = String::new();
        out.push_str("# RefNet Vault\n\n");
        out.push_str(&format!("- **Papers:** {count}\n"));
        out.push_str(&format!("- **Total citations:** {total_citations}\n\n"));

        out.push_str("## Papers by Year\n\n");
        for (year, n) in &histogram {
            out.push_str(&format!("- {year}: {n}\n"));
        }
        out.push('\n');

        out.push_str("## Top 10 by Citations\n\n");
        for p in &top_cited {
            out.push_str(&format!(
                "- [[{}|{}]] ({} citations)\n",
                sanitize_filename(&p.id),
                p.title,
                p.citation_count
            ));
        }
        out.push('\n');

        out.push_str("## 10 Most Recent\n\n");
        for p in &recent {
            out.push_str(&format!("- [[{}|{}]]\n", sanitize_filename(&p.id), p.title));
        }
        out.push('\n');

        self.write_atomic(&self.vault_path.join("README.md"), &out)
    }

    /// Writes the viewer's graph-display tuning parameters once; later
    /// runs leave an existing config untouched (§4.8: "writes a viewer
    /// configuration ... once").
    fn write_viewer_config_if_absent(&self) -> RefNetResult<()> {
        let dir = self.vault_path.join(".refnet");
        let path = dir.join("graph.json");
        if path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&dir)?;
        let config = serde_json::json!({
            "node_size_by": "citation_count",
            "edge_color_by": "relation_type",
            "max_hops_displayed": self.max_hops,
            "layout": "force-directed",
        });
        self.write_atomic(&path, &serde_json::to_string_pretty(&config)?)
    }

    /// Enqueues up to [`MAX_FOLLOWUP_CRAWLS`] `crawl` jobs for references
    /// whose `crawl_status = pending` and whose Paper row is still a
    /// placeholder (§4.8). Delegates the recursion predicate to
    /// [`crate::recursion::qualify`], the same function the Crawl Worker's
    /// fan-out calls (§9 Open Questions: one predicate, two call sites).
    async fn schedule_followup_crawls(
        &self,
        paper_id: &str,
        neighbors: &[crate::models::PaperRelation],
    ) -> RefNetResult<()> {
        let current_hop = neighbors
            .iter()
            .filter(|r| r.target_id == paper_id)
            .map(|r| r.hop_count)
            .min()
            .unwrap_or(0) as u32;

        if current_hop >= self.max_hops {
            return Ok(());
        }

        let mut scheduled = 0usize;
        for rel in neighbors {
            if scheduled >= MAX_FOLLOWUP_CRAWLS {
                break;
            }
            if rel.relation_type != RelationType::Reference || rel.source_id != paper_id {
                continue;
            }
            let Some(target) = self.store.get_paper(&rel.target_id).await? else {
                continue;
            };
            let is_placeholder = target.abstract_text.is_none() && target.year.is_none();
            if target.crawl_status != Status::Pending || !is_placeholder {
                continue;
            }

            let candidate = Candidate {
                paper_id: target.id.clone(),
                title: target.title.clone(),
                citation_count: target.citation_count,
            };
            if let Qualification::Enqueue { paper_id, priority, hop } =
                qualify(&candidate, current_hop + 1, self.max_hops)
            {
                let params = serde_json::json!({
                    "hop": hop,
                    "max_hops": self.max_hops,
                    "countdown_secs": FOLLOWUP_COUNTDOWN_SECS,
                })
                .to_string();
                self.queue.enqueue(&paper_id, Stage::Crawl, priority, &params).await?;
                scheduled += 1;
            }
        }
        Ok(())
    }

    /// Write-to-tempfile-then-rename (§3 "rewrites replace atomically").
    fn write_atomic(&self, path: &Path, contents: &str) -> RefNetResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// Replaces `[<>:"/\|?*]` with underscores and truncates to 100 chars (§4.8).
pub fn sanitize_filename(id: &str) -> String {
    let replaced: String = id
        .chars()
        .map(|c| if "<>:\"/\\|?*".contains(c) { '_' } else { c })
        .collect();
    replaced.chars().take(100).collect()
}

fn escape_yaml(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn opt_to_yaml(v: Option<i32>) -> String {
    v.map(|y| y.to_string()).unwrap_or_else(|| "null".to_string())
}

fn opt_to_display(v: Option<i32>) -> String {
    v.map(|y| y.to_string()).unwrap_or_else(|| "unknown".to_string())
}

fn opt_time_to_display(v: Option<chrono::DateTime<chrono::Utc>>) -> String {
    v.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
}

/// Tags derived from year and venue (§4.8 front-matter: "tags derived from year and venue").
fn derive_tags(paper: &Paper) -> Vec<String> {
    let mut tags = Vec::new();
    if let Some(year) = paper.year {
        tags.push(format!("year/{year}"));
    }
    if let Some(venue_id) = &paper.venue_id {
        tags.push(format!("venue/{venue_id}"));
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RelationType;

    /// A scratch vault directory cleaned up on drop, avoiding a dev-only
    /// temp-dir crate dependency for tests alone.
    struct ScratchVault(PathBuf);

    impl ScratchVault {
        fn new(label: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "refnet-test-{label}-{}-{}",
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .as_nanos()
            ));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for ScratchVault {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    async fn harness() -> (GraphStore, WorkQueue, ScratchVault) {
        let store = GraphStore::connect("sqlite::memory:").await.unwrap();
        let queue = WorkQueue::new(store.pool().clone());
        let dir = ScratchVault::new("generate");
        (store, queue, dir)
    }

    #[test]
    fn sanitize_filename_replaces_reserved_characters() {
        assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
    }

    #[test]
    fn sanitize_filename_truncates_to_100_chars() {
        let long = "x".repeat(150);
        assert_eq!(sanitize_filename(&long).len(), 100);
    }

    #[tokio::test]
    async fn generate_writes_markdown_with_no_pdf_note() {
        let (store, queue, dir) = harness().await;
        let paper = Paper::placeholder("X", "Seed Paper");
        store.upsert_paper(&paper).await.unwrap();
        let item_id = queue.enqueue("X", Stage::Generate, 50, "{}").await.unwrap();
        let item = queue.claim(Stage::Generate, "w1").await.unwrap().unwrap();
        assert_eq!(item.id, item_id);

        let worker = GenerateWorker::new(store.clone(), queue.clone(), dir.path(), 2);
        worker.handle(item).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("papers/X.md")).unwrap();
        assert!(content.contains("Seed Paper"));
        assert!(content.contains("PDF not available"));
        assert!(dir.path().join("README.md").exists());
        assert!(dir.path().join(".refnet/graph.json").exists());
    }

    #[tokio::test]
    async fn generate_is_idempotent_modulo_generated_at_line() {
        let (store, queue, dir) = harness().await;
        let paper = Paper::placeholder("X", "Seed Paper");
        store.upsert_paper(&paper).await.unwrap();
        queue.enqueue("X", Stage::Generate, 50, "{}").await.unwrap();
        let item1 = queue.claim(Stage::Generate, "w1").await.unwrap().unwrap();
        let worker = GenerateWorker::new(store.clone(), queue.clone(), dir.path(), 2);
        worker.handle(item1).await.unwrap();
        let first = std::fs::read_to_string(dir.path().join("papers/X.md")).unwrap();

        queue.enqueue("X", Stage::Generate, 50, "{}").await.unwrap();
        let item2 = queue.claim(Stage::Generate, "w1").await.unwrap().unwrap();
        worker.handle(item2).await.unwrap();
        let second = std::fs::read_to_string(dir.path().join("papers/X.md")).unwrap();

        let mask = |s: &str| {
            s.lines()
                .filter(|l| !l.starts_with("- **Generated at:**"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(mask(&first), mask(&second));
    }

    #[tokio::test]
    async fn followup_crawl_skips_neighbors_past_hop_budget() {
        let (store, queue, dir) = harness().await;
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();
        store.upsert_paper(&Paper::placeholder("Y", "Y")).await.unwrap();
        store.insert_edge("X", "Y", RelationType::Reference, 1).await.unwrap();

        queue.enqueue("X", Stage::Generate, 50, "{}").await.unwrap();
        let item = queue.claim(Stage::Generate, "w1").await.unwrap().unwrap();
        let worker = GenerateWorker::new(store.clone(), queue.clone(), dir.path(), 0);
        worker.handle(item).await.unwrap();

        let pending = queue.list_pending(Stage::Crawl, 10).await.unwrap();
        assert!(pending.is_empty());
    }
}
