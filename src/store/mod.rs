//! Graph Store (C4, §4.4): the sole owner of all persistent state.
//!
//! Grounded in `other_examples/3ac25c90_pma1999-research_hub_mcp__src-repositories-paper.rs.rs`
//! for the repository-trait contract shape (`store`/`find_by_doi`/`search`/
//! `update`/`count`) and `other_examples/b4518660_.../job_processor_v2.rs.rs`
//! for the `sqlx::SqlitePool`-backed repository wiring. No teacher module
//! persists anything, so this is new code written in the idiom those two
//! pack examples demonstrate.
//!
//! Schema creation is embedded SQL run once at construction (no migration
//! runner — out of scope per §1) rather than `sqlx::migrate!`, since this
//! environment has no live database to validate migrations against at
//! write time.

use crate::error::{RefNetError, RefNetResult};
use crate::models::{Author, Paper, PaperRelation, RelationType, Stage, Status};
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::instrument;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// A handle to the SQLite-backed relational store. Cheaply cloneable — the
/// inner `SqlitePool` is reference-counted, so every worker and the
/// dispatcher share one pool against one database file.
#[derive(Clone)]
pub struct GraphStore {
    pool: SqlitePool,
}

impl GraphStore {
    pub async fn connect(db_url: &str) -> RefNetResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(db_url)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> RefNetResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// `UpsertPaper(p)`: create if absent; otherwise merge non-null fields
    /// and bump `updated_at` (§4.4). Rejects out-of-range years and
    /// negative counts (§3 invariant), since SQLite CHECK constraints in
    /// the embedded schema are defense in depth, not the primary
    /// enforcement point here (§9 Open Questions).
    #[instrument(skip(self, paper))]
    pub async fn upsert_paper(&self, paper: &Paper) -> RefNetResult<()> {
        if !Paper::year_in_range(paper.year) {
            return Err(RefNetError::Permanent(format!(
                "year {:?} out of range [1900, 2100]",
                paper.year
            )));
        }
        if paper.citation_count < 0 || paper.reference_count < 0 {
            return Err(RefNetError::Permanent(
                "citation_count/reference_count must be non-negative".into(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO papers (
                id, title, abstract_text, year, citation_count, reference_count,
                influence_score, is_open_access, language, pdf_url, pdf_hash, pdf_size,
                venue_id, journal_id, summary, summary_model, summary_created_at,
                last_crawled_at, crawl_status, pdf_status, summary_status,
                created_at, updated_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                abstract_text = COALESCE(excluded.abstract_text, papers.abstract_text),
                year = COALESCE(excluded.year, papers.year),
                citation_count = MAX(excluded.citation_count, papers.citation_count),
                reference_count = MAX(excluded.reference_count, papers.reference_count),
                influence_score = COALESCE(excluded.influence_score, papers.influence_score),
                is_open_access = excluded.is_open_access OR papers.is_open_access,
                language = COALESCE(excluded.language, papers.language),
                pdf_url = COALESCE(excluded.pdf_url, papers.pdf_url),
                pdf_hash = COALESCE(excluded.pdf_hash, papers.pdf_hash),
                pdf_size = COALESCE(excluded.pdf_size, papers.pdf_size),
                venue_id = COALESCE(excluded.venue_id, papers.venue_id),
                journal_id = COALESCE(excluded.journal_id, papers.journal_id),
                summary = COALESCE(excluded.summary, papers.summary),
                summary_model = COALESCE(excluded.summary_model, papers.summary_model),
                summary_created_at = COALESCE(excluded.summary_created_at, papers.summary_created_at),
                last_crawled_at = COALESCE(excluded.last_crawled_at, papers.last_crawled_at),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&paper.id)
        .bind(&paper.title)
        .bind(&paper.abstract_text)
        .bind(paper.year)
        .bind(paper.citation_count)
        .bind(paper.reference_count)
        .bind(paper.influence_score)
        .bind(paper.is_open_access)
        .bind(&paper.language)
        .bind(&paper.pdf_url)
        .bind(&paper.pdf_hash)
        .bind(paper.pdf_size)
        .bind(&paper.venue_id)
        .bind(&paper.journal_id)
        .bind(&paper.summary)
        .bind(&paper.summary_model)
        .bind(paper.summary_created_at)
        .bind(paper.last_crawled_at)
        .bind(paper.crawl_status)
        .bind(paper.pdf_status)
        .bind(paper.summary_status)
        .bind(paper.created_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_paper(&self, id: &str) -> RefNetResult<Option<Paper>> {
        let paper = sqlx::query_as::<_, Paper>("SELECT * FROM papers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(paper)
    }

    /// `UpsertAuthor(a)` — idempotent.
    pub async fn upsert_author(&self, author: &Author) -> RefNetResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authors (id, name, paper_count, citation_count, h_index, orcid)
            VALUES (?,?,?,?,?,?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                paper_count = MAX(excluded.paper_count, authors.paper_count),
                citation_count = MAX(excluded.citation_count, authors.citation_count),
                h_index = COALESCE(excluded.h_index, authors.h_index),
                orcid = COALESCE(excluded.orcid, authors.orcid)
            "#,
        )
        .bind(&author.id)
        .bind(&author.name)
        .bind(author.paper_count)
        .bind(author.citation_count)
        .bind(author.h_index)
        .bind(&author.orcid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `LinkAuthor(paper, author, position)` — idempotent.
    pub async fn link_author(&self, paper_id: &str, author_id: &str, position: i32) -> RefNetResult<()> {
        sqlx::query(
            r#"
            INSERT INTO paper_authors (paper_id, author_id, position)
            VALUES (?,?,?)
            ON CONFLICT(paper_id, author_id) DO UPDATE SET position = excluded.position
            "#,
        )
        .bind(paper_id)
        .bind(author_id)
        .bind(position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `InsertEdge(src, dst, type, hop)`: no-op if the triple already
    /// exists; updates `hop_count` downward if the new value is smaller
    /// (§4.4). Silently rejects self-citations (§4.6 edge-case policy).
    #[instrument(skip(self))]
    pub async fn insert_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: RelationType,
        hop_count: i32,
    ) -> RefNetResult<()> {
        if source_id == target_id {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO paper_relations (source_id, target_id, relation_type, hop_count, confidence)
            VALUES (?,?,?,?,NULL)
            ON CONFLICT(source_id, target_id, relation_type)
            DO UPDATE SET hop_count = MIN(excluded.hop_count, paper_relations.hop_count)
            "#,
        )
        .bind(source_id)
        .bind(target_id)
        .bind(relation_type)
        .bind(hop_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `GetNeighbors(paper)`: in-edges (citations) and out-edges (references).
    pub async fn get_neighbors(&self, paper_id: &str, limit: i64) -> RefNetResult<Vec<PaperRelation>> {
        let rows = sqlx::query_as::<_, PaperRelation>(
            "SELECT * FROM paper_relations WHERE source_id = ? OR target_id = ? LIMIT ?",
        )
        .bind(paper_id)
        .bind(paper_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// `SetStatus(paper, stage, status, err?)` — single-row update of the
    /// relevant status column.
    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        paper_id: &str,
        stage: Stage,
        status: Status,
    ) -> RefNetResult<()> {
        // §3 defines exactly three status columns (crawl_status, pdf_status,
        // summary_status) for two pipeline concerns (crawl, pdf+summarize);
        // "generate" has no terminal-state column of its own on the Paper
        // row — its completion is observed via the queue row instead.
        let column = match stage {
            Stage::Crawl => "crawl_status",
            Stage::Summarize => "summary_status",
            Stage::Generate => return Ok(()),
        };
        let sql = format!(
            "UPDATE papers SET {column} = ?, updated_at = ? WHERE id = ?",
            column = column
        );
        sqlx::query(&sql)
            .bind(status)
            .bind(Utc::now())
            .bind(paper_id)
            .execute(&self.pool)
            .await?;
        if stage == Stage::Crawl && status == Status::Completed {
            sqlx::query("UPDATE papers SET last_crawled_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(paper_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn set_pdf_status(&self, paper_id: &str, status: Status) -> RefNetResult<()> {
        sqlx::query("UPDATE papers SET pdf_status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(paper_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn store_pdf_metadata(
        &self,
        paper_id: &str,
        pdf_hash: &str,
        pdf_size: i64,
    ) -> RefNetResult<()> {
        sqlx::query(
            "UPDATE papers SET pdf_hash = ?, pdf_size = ?, updated_at = ? WHERE id = ?",
        )
        .bind(pdf_hash)
        .bind(pdf_size)
        .bind(Utc::now())
        .bind(paper_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn store_summary(
        &self,
        paper_id: &str,
        summary: &str,
        summary_model: &str,
    ) -> RefNetResult<()> {
        sqlx::query(
            "UPDATE papers SET summary = ?, summary_model = ?, summary_created_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(summary)
        .bind(summary_model)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(paper_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn store_keyword(
        &self,
        paper_id: &str,
        keyword: &str,
        relevance: f64,
        extraction_method: &str,
    ) -> RefNetResult<()> {
        sqlx::query(
            r#"
            INSERT INTO keywords (paper_id, keyword, relevance, extraction_method)
            VALUES (?,?,?,?)
            ON CONFLICT(paper_id, keyword) DO UPDATE SET
                relevance = excluded.relevance,
                extraction_method = excluded.extraction_method
            "#,
        )
        .bind(paper_id)
        .bind(keyword)
        .bind(relevance)
        .bind(extraction_method)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_external_id(
        &self,
        paper_id: &str,
        id_type: &str,
        external_id: &str,
    ) -> RefNetResult<()> {
        sqlx::query(
            r#"
            INSERT INTO external_ids (paper_id, id_type, external_id)
            VALUES (?,?,?)
            ON CONFLICT(paper_id, id_type, external_id) DO NOTHING
            "#,
        )
        .bind(paper_id)
        .bind(id_type)
        .bind(external_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregate statistics backing the Generate Worker's index file (§4.8):
    /// total paper count, total citations, year histogram, top-10 by
    /// citations, 10 most recent.
    pub async fn paper_count(&self) -> RefNetResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM papers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn total_citation_count(&self) -> RefNetResult<i64> {
        let (total,): (i64,) = sqlx::query_as("SELECT COALESCE(SUM(citation_count), 0) FROM papers")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    pub async fn year_histogram(&self) -> RefNetResult<Vec<(i32, i64)>> {
        let rows: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT year, COUNT(*) FROM papers WHERE year IS NOT NULL GROUP BY year ORDER BY year",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn top_cited(&self, limit: i64) -> RefNetResult<Vec<Paper>> {
        let rows = sqlx::query_as::<_, Paper>(
            "SELECT * FROM papers ORDER BY citation_count DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn most_recent(&self, limit: i64) -> RefNetResult<Vec<Paper>> {
        let rows = sqlx::query_as::<_, Paper>(
            "SELECT * FROM papers ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Dispatcher support (§4.9): ids of papers `pending` the given stage
    /// with no non-terminal `processing_queue` row for it — an enqueue that
    /// never landed (crash between `UpsertPaper` and `Enqueue`, a dropped
    /// broker message, ...).
    pub async fn papers_pending_stage_without_queue_row(
        &self,
        stage: Stage,
        limit: i64,
    ) -> RefNetResult<Vec<String>> {
        let column = match stage {
            Stage::Crawl => "crawl_status",
            Stage::Summarize => "summary_status",
            Stage::Generate => return Ok(Vec::new()),
        };
        let sql = format!(
            "SELECT papers.id FROM papers \
             WHERE papers.{column} = 'pending' \
             AND NOT EXISTS ( \
                 SELECT 1 FROM processing_queue \
                 WHERE processing_queue.paper_id = papers.id \
                 AND processing_queue.task_type = ? \
                 AND processing_queue.status IN ('pending', 'running') \
             ) \
             LIMIT ?",
            column = column
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(stage.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> GraphStore {
        GraphStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn upsert_paper_creates_then_merges_non_null_fields() {
        let store = memory_store().await;
        let mut p = Paper::placeholder("P1", "Placeholder Title");
        store.upsert_paper(&p).await.unwrap();

        p.title = "Full Title".to_string();
        p.abstract_text = Some("an abstract".to_string());
        p.citation_count = 10;
        store.upsert_paper(&p).await.unwrap();

        let fetched = store.get_paper("P1").await.unwrap().unwrap();
        assert_eq!(fetched.title, "Full Title");
        assert_eq!(fetched.abstract_text.as_deref(), Some("an abstract"));
        assert_eq!(fetched.citation_count, 10);
    }

    #[tokio::test]
    async fn upsert_paper_rejects_year_out_of_range() {
        let store = memory_store().await;
        let mut p = Paper::placeholder("P1", "X");
        p.year = Some(1899);
        let err = store.upsert_paper(&p).await.unwrap_err();
        assert!(matches!(err, RefNetError::Permanent(_)));
    }

    #[tokio::test]
    async fn insert_edge_is_idempotent_and_keeps_min_hop() {
        let store = memory_store().await;
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();
        store.upsert_paper(&Paper::placeholder("Y", "Y")).await.unwrap();

        store
            .insert_edge("X", "Y", RelationType::Citation, 3)
            .await
            .unwrap();
        store
            .insert_edge("X", "Y", RelationType::Citation, 1)
            .await
            .unwrap();
        store
            .insert_edge("X", "Y", RelationType::Citation, 5)
            .await
            .unwrap();

        let neighbors = store.get_neighbors("X", 10).await.unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].hop_count, 1);
    }

    #[tokio::test]
    async fn insert_edge_rejects_self_citation_silently() {
        let store = memory_store().await;
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();
        store
            .insert_edge("X", "X", RelationType::Citation, 1)
            .await
            .unwrap();
        let neighbors = store.get_neighbors("X", 10).await.unwrap();
        assert!(neighbors.is_empty());
    }

    #[tokio::test]
    async fn set_status_updates_only_named_stage_column() {
        let store = memory_store().await;
        store.upsert_paper(&Paper::placeholder("X", "X")).await.unwrap();
        store
            .set_status("X", Stage::Crawl, Status::Completed)
            .await
            .unwrap();
        let p = store.get_paper("X").await.unwrap().unwrap();
        assert_eq!(p.crawl_status, Status::Completed);
        assert_eq!(p.pdf_status, Status::Pending);
        assert_eq!(p.summary_status, Status::Pending);
        assert!(p.last_crawled_at.is_some());
    }
}
