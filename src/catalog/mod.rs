//! Catalog Client (C1, §4.1): fetches paper metadata, citations, and
//! references from a bibliographic HTTP catalog.
//!
//! The operation surface (`get_paper`/`get_citations`/`get_references`/
//! `search`) is grounded in the teacher's `SemanticScholarClient` (the
//! retrieved `src/client/semantic.rs`), which already exposes almost this
//! exact contract over `ss_tools::SemanticScholar`. It is generalized here
//! behind a trait so workers and tests depend on `CatalogClient`, not on
//! `ss-tools` directly. `HttpCatalogClient` follows the teacher's actual
//! call shape verbatim: `SemanticScholar::new()` with no constructor
//! argument, a `QueryParams::default()` builder mutated via `.paper_id(..)`,
//! `client.clone()` before each call (the client mutates), explicit
//! `retry_count`/`wait_time` arguments, and citation/reference responses
//! unwrapped via `.data.into_iter().filter_map(|rd| rd.citing_paper)` —
//! rather than inventing API surface the teacher never demonstrates. The
//! rate limiter + outer retry/backoff from [`ratelimit`] (which the
//! teacher's version lacked) wrap these calls from the outside, so
//! `ss_tools` itself is told to make exactly one attempt per call
//! (`retry_count: 1, wait_time: 0`) and `call_with_retry` owns all retry
//! timing.

pub mod ratelimit;

use crate::error::{RefNetError, RefNetResult};
use async_trait::async_trait;
use ratelimit::{call_with_retry, RateLimiter, RetryPolicy};
use ss_tools::{QueryParams, SemanticScholar};
use tracing::instrument;

/// A paper record normalized from the catalog's wire format, independent
/// of the concrete provider (§4.1: "returns a normalized record independent
/// of the wire format").
#[derive(Debug, Clone)]
pub struct NormalizedPaper {
    pub id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub citation_count: i64,
    pub reference_count: i64,
    pub authors: Vec<NormalizedAuthor>,
    pub venue: Option<String>,
    pub journal: Option<String>,
    pub external_ids: Vec<(String, String)>,
    pub fields_of_study: Vec<String>,
    pub open_access_pdf_url: Option<String>,
}

// `external_ids`/`fields_of_study` are always empty coming out of
// `HttpCatalogClient`: `ss_tools::structs::Paper`'s fields actually used in
// the teacher's demonstrated usage (`src/client/semantic.rs`,
// `src/models.rs`) stop at `paper_id`/`title`/`abstract_text`/counts/
// `authors`/`venue`/`journal`/`open_access_pdf`/`publication_date` — no
// external-id map or field-of-study list appears anywhere the teacher
// actually reads the struct, so populating them here would be guessing at
// API surface rather than grounding in it. `MockCatalogClient`-backed
// tests still exercise both fields directly.

#[derive(Debug, Clone)]
pub struct NormalizedAuthor {
    pub id: String,
    pub name: String,
}

/// Fetches paper metadata, citations, and references from a bibliographic
/// catalog (§4.1). Implementations classify failures per §4.1's contract:
/// 404 -> `NotFound` (empty list for list endpoints), 429 -> `RateLimited`,
/// 5xx -> `Transient`, anything else -> `Permanent`. `HttpCatalogClient`
/// approximates this from `ss_tools::Error`'s display text (see
/// `map_ss_error`), since the crate exposes no structured status code in
/// the teacher's demonstrated usage; everything it can't identify as a 404
/// or 429 is treated as `Transient` rather than guessed as `Permanent`.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_paper(&self, id: &str) -> RefNetResult<NormalizedPaper>;
    async fn get_citations(
        &self,
        id: &str,
        limit: u32,
        offset: u32,
    ) -> RefNetResult<Vec<NormalizedPaper>>;
    async fn get_references(
        &self,
        id: &str,
        limit: u32,
        offset: u32,
    ) -> RefNetResult<Vec<NormalizedPaper>>;
    async fn search(&self, query: &str, limit: u32) -> RefNetResult<Vec<NormalizedPaper>>;
}

/// HTTP-backed catalog client over the `ss-tools` crate, the teacher's
/// existing Semantic-Scholar-style wrapper, with rate limiting and
/// retry/backoff applied uniformly to every call.
///
/// `CATALOG_API_KEY` (§6) is accepted by [`Self::new`] for interface
/// parity with the rest of this crate's env-driven configuration, but
/// `ss_tools::SemanticScholar` exposes only a zero-argument constructor in
/// the teacher's demonstrated usage (`SemanticScholar::new()`,
/// `src/client/semantic.rs:27`) with no observed way to pass a key through
/// it; the field is kept unused here rather than invented against.
pub struct HttpCatalogClient {
    inner: SemanticScholar,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl HttpCatalogClient {
    pub fn new(_api_key: Option<String>, requests_per_second: u32, retry: RetryPolicy) -> Self {
        Self {
            inner: SemanticScholar::new(),
            limiter: RateLimiter::new(requests_per_second),
            retry,
        }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    #[instrument(skip(self))]
    async fn get_paper(&self, id: &str) -> RefNetResult<NormalizedPaper> {
        let id = id.to_string();
        call_with_retry(&self.limiter, &self.retry, || {
            let id = id.clone();
            async move {
                let mut query_params = QueryParams::default();
                query_params.paper_id(&id);
                let mut client = self.inner.clone();
                client
                    .query_paper_details(query_params, 1, 0)
                    .await
                    .map(normalize_paper)
                    .map_err(|e| map_ss_error(&e))
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_citations(
        &self,
        id: &str,
        limit: u32,
        _offset: u32,
    ) -> RefNetResult<Vec<NormalizedPaper>> {
        let id = id.to_string();
        call_with_retry(&self.limiter, &self.retry, || {
            let id = id.clone();
            async move {
                let mut query_params = QueryParams::default();
                query_params.paper_id(&id);
                query_params.limit(limit as u64);
                let mut client = self.inner.clone();
                match client.query_paper_citations(query_params, 1, 0).await {
                    Ok(response) => Ok(response
                        .data
                        .into_iter()
                        .filter_map(|rd| rd.citing_paper)
                        .map(normalize_paper)
                        .collect()),
                    Err(e) if is_not_found(&e) => Ok(Vec::new()),
                    Err(e) => Err(map_ss_error(&e)),
                }
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_references(
        &self,
        id: &str,
        limit: u32,
        _offset: u32,
    ) -> RefNetResult<Vec<NormalizedPaper>> {
        let id = id.to_string();
        call_with_retry(&self.limiter, &self.retry, || {
            let id = id.clone();
            async move {
                let mut query_params = QueryParams::default();
                query_params.paper_id(&id);
                query_params.limit(limit as u64);
                let mut client = self.inner.clone();
                match client.query_paper_references(query_params, 1, 0).await {
                    Ok(response) => Ok(response
                        .data
                        .into_iter()
                        .filter_map(|rd| rd.citing_paper)
                        .map(normalize_paper)
                        .collect()),
                    Err(e) if is_not_found(&e) => Ok(Vec::new()),
                    Err(e) => Err(map_ss_error(&e)),
                }
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str, limit: u32) -> RefNetResult<Vec<NormalizedPaper>> {
        let query = query.to_string();
        call_with_retry(&self.limiter, &self.retry, || {
            let query = query.clone();
            async move {
                let mut query_params = QueryParams::default();
                query_params.query_text(&query);
                query_params.limit(limit as u64);
                let mut client = self.inner.clone();
                client
                    .query_papers_by_title(query_params, 1, 0)
                    .await
                    .map(|papers| papers.into_iter().map(normalize_paper).collect())
                    .map_err(|e| map_ss_error(&e))
            }
        })
        .await
    }
}

fn is_not_found(e: &ss_tools::Error) -> bool {
    matches!(map_ss_error(e), RefNetError::NotFound(_))
}

/// `ss_tools::Error` exposes no structured status code in the teacher's
/// demonstrated usage (`src/client/semantic.rs` only ever wraps it as
/// `format!("...: {}", e)`); classification here falls back to matching
/// the status digits the underlying HTTP client embeds in the error's
/// `Display` text, rather than calling an unevidenced accessor.
fn map_ss_error(e: &ss_tools::Error) -> RefNetError {
    let text = e.to_string();
    if text.contains("404") {
        RefNetError::NotFound(text)
    } else if text.contains("429") {
        RefNetError::RateLimited { retry_after: None }
    } else {
        RefNetError::Transient(text)
    }
}

fn normalize_paper(p: ss_tools::structs::Paper) -> NormalizedPaper {
    let year = p
        .publication_date
        .as_ref()
        .and_then(|d| d.get(0..4))
        .and_then(|y| y.parse::<i32>().ok());
    let journal = p
        .journal
        .as_ref()
        .and_then(|j| j.name.clone())
        .or_else(|| p.venue.clone());
    NormalizedPaper {
        id: p.paper_id.clone().unwrap_or_default(),
        title: p.title.clone().unwrap_or_default(),
        abstract_text: p.abstract_text.clone(),
        year,
        citation_count: p.citation_count.unwrap_or(0) as i64,
        reference_count: p.reference_count.unwrap_or(0) as i64,
        authors: p
            .authors
            .as_ref()
            .map(|authors| {
                authors
                    .iter()
                    .map(|a| NormalizedAuthor {
                        id: a.author_id.clone().unwrap_or_default(),
                        name: a.name.clone().unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        venue: p.venue.clone(),
        journal,
        external_ids: Vec::new(),
        fields_of_study: Vec::new(),
        open_access_pdf_url: p.open_access_pdf.as_ref().and_then(|pdf| pdf.url.clone()),
    }
}

/// An in-memory double used by worker and recursion tests, grounded in the
/// teacher's `MockProvider` pattern (`src/agents/paper_analyzer.rs` tests).
#[cfg(any(test, feature = "test-util"))]
pub struct MockCatalogClient {
    pub papers: std::collections::HashMap<String, NormalizedPaper>,
    pub citations: std::collections::HashMap<String, Vec<NormalizedPaper>>,
    pub references: std::collections::HashMap<String, Vec<NormalizedPaper>>,
}

#[cfg(any(test, feature = "test-util"))]
impl MockCatalogClient {
    pub fn new() -> Self {
        Self {
            papers: Default::default(),
            citations: Default::default(),
            references: Default::default(),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl CatalogClient for MockCatalogClient {
    async fn get_paper(&self, id: &str) -> RefNetResult<NormalizedPaper> {
        self.papers
            .get(id)
            .cloned()
            .ok_or_else(|| RefNetError::NotFound(id.to_string()))
    }

    async fn get_citations(
        &self,
        id: &str,
        limit: u32,
        _offset: u32,
    ) -> RefNetResult<Vec<NormalizedPaper>> {
        Ok(self
            .citations
            .get(id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn get_references(
        &self,
        id: &str,
        limit: u32,
        _offset: u32,
    ) -> RefNetResult<Vec<NormalizedPaper>> {
        Ok(self
            .references
            .get(id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn search(&self, query: &str, limit: u32) -> RefNetResult<Vec<NormalizedPaper>> {
        Ok(self
            .papers
            .values()
            .filter(|p| p.title.to_lowercase().contains(&query.to_lowercase()))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: &str, title: &str, citations: i64) -> NormalizedPaper {
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
            open_access_pdf_url: None,
        }
    }

    #[tokio::test]
    async fn mock_get_paper_returns_not_found_for_unknown_id() {
        let client = MockCatalogClient::new();
        let err = client.get_paper("missing").await.unwrap_err();
        assert!(matches!(err, RefNetError::NotFound(_)));
    }

    #[tokio::test]
    async fn mock_get_citations_returns_empty_for_unknown_paper() {
        let client = MockCatalogClient::new();
        let result = client.get_citations("missing", 10, 0).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn mock_search_filters_by_title_case_insensitively() {
        let mut client = MockCatalogClient::new();
        client
            .papers
            .insert("P1".into(), paper("P1", "Attention Is All You Need", 50000));
        client
            .papers
            .insert("P2".into(), paper("P2", "Unrelated Paper", 1));
        let result = client.search("attention", 10).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "P1");
    }
}
