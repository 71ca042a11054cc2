//! Data model (§3): `Paper`, `Author`, edges, external ids, keywords, venues,
//! journals, and the processing-queue row shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Per-stage lifecycle status. `Pdf` additionally uses `Unavailable`; the
/// other two stages never take that value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Running,
    Completed,
    Failed,
    Unavailable,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Unavailable => "unavailable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Status::Pending),
            "running" => Some(Status::Running),
            "completed" => Some(Status::Completed),
            "failed" => Some(Status::Failed),
            "unavailable" => Some(Status::Unavailable),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl sqlx::Type<sqlx::Sqlite> for Status {
    fn type_info() -> <sqlx::Sqlite as sqlx::Database>::TypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for Status {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for Status {
    fn decode(
        value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <&str as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
        Status::parse(s).ok_or_else(|| format!("invalid status: {s}").into())
    }
}

/// One of the three pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Crawl,
    Summarize,
    Generate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Crawl => "crawl",
            Stage::Summarize => "summarize",
            Stage::Generate => "generate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "crawl" => Some(Stage::Crawl),
            "summarize" => Some(Stage::Summarize),
            "generate" => Some(Stage::Generate),
            _ => None,
        }
    }
}

/// `citation` (incoming: papers that cite this one) or `reference`
/// (outgoing: papers this one cites).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Citation,
    Reference,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Citation => "citation",
            RelationType::Reference => "reference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "citation" => Some(RelationType::Citation),
            "reference" => Some(RelationType::Reference),
            _ => None,
        }
    }
}

/// A paper, identified by an opaque external id (§3). Counts are
/// non-negative and `year` (when present) falls in `[1900, 2100]` —
/// enforced by [`crate::store::GraphStore::upsert_paper`], not by the type
/// itself, since values arriving from the catalog must be validated rather
/// than trusted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub citation_count: i64,
    pub reference_count: i64,
    pub influence_score: Option<f64>,
    pub is_open_access: bool,
    pub language: Option<String>,
    pub pdf_url: Option<String>,
    pub pdf_hash: Option<String>,
    pub pdf_size: Option<i64>,
    pub venue_id: Option<String>,
    pub journal_id: Option<String>,
    pub summary: Option<String>,
    pub summary_model: Option<String>,
    pub summary_created_at: Option<DateTime<Utc>>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub crawl_status: Status,
    pub pdf_status: Status,
    pub summary_status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Paper {
    /// A placeholder row created when only an id is known (discovered as a
    /// neighbor, awaiting its own crawl).
    pub fn placeholder(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: None,
            year: None,
            citation_count: 0,
            reference_count: 0,
            influence_score: None,
            is_open_access: false,
            language: None,
            pdf_url: None,
            pdf_hash: None,
            pdf_size: None,
            venue_id: None,
            journal_id: None,
            summary: None,
            summary_model: None,
            summary_created_at: None,
            last_crawled_at: None,
            crawl_status: Status::Pending,
            pdf_status: Status::Pending,
            summary_status: Status::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// `year ∈ [1900, 2100] ∪ {null}` (§3 invariant).
    pub fn year_in_range(year: Option<i32>) -> bool {
        match year {
            None => true,
            Some(y) => (1900..=2100).contains(&y),
        }
    }
}

/// A paper's citation/reference score normalized into `[0, 1]`, used by the
/// priority formula (§4.5). `min(1, citationCount / 100)`.
pub fn citation_score(citation_count: i64) -> f64 {
    (citation_count as f64 / 100.0).min(1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub paper_count: i64,
    pub citation_count: i64,
    pub h_index: Option<i32>,
    pub orcid: Option<String>,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            paper_count: 0,
            citation_count: 0,
            h_index: None,
            orcid: None,
        }
    }
}

/// Ordered many-to-many join row; `(paper_id, author_id)` is unique,
/// `position` preserves byline order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaperAuthor {
    pub paper_id: String,
    pub author_id: String,
    pub position: i32,
}

/// A citation edge. Invariants: unique over `(source, target, type)`;
/// `source != target` (self-citations are discarded by the crawl worker,
/// not stored).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaperRelation {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub hop_count: i32,
    pub confidence: Option<f64>,
}

impl sqlx::Type<sqlx::Sqlite> for RelationType {
    fn type_info() -> <sqlx::Sqlite as sqlx::Database>::TypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}
impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RelationType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<'q, sqlx::Sqlite>>::encode_by_ref(&self.as_str(), buf)
    }
}
impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RelationType {
    fn decode(
        value: <sqlx::Sqlite as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <&str as sqlx::Decode<'r, sqlx::Sqlite>>::decode(value)?;
        RelationType::parse(s).ok_or_else(|| format!("invalid relation type: {s}").into())
    }
}

/// `(paper, id_type, external_id)`, e.g. `("P1", "DOI", "10.1/xyz")`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExternalId {
    pub paper_id: String,
    pub id_type: String,
    pub external_id: String,
}

/// `(paper, keyword)` with a relevance score and the method that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Keyword {
    pub paper_id: String,
    pub keyword: String,
    pub relevance: f64,
    pub extraction_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Venue {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Journal {
    pub id: String,
    pub name: String,
}

/// A row in the persistent work queue (`ProcessingQueue`, §3/§4.5).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueItem {
    pub id: i64,
    pub paper_id: String,
    pub task_type: String,
    pub status: Status,
    pub priority: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    /// Free-form structured parameters (JSON-encoded), e.g. `{"hop": 1, "max_hops": 2}`.
    pub parameters: String,
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn stage(&self) -> Option<Stage> {
        Stage::parse(&self.task_type)
    }
}

/// Parameters carried on a `crawl` queue item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrawlParams {
    pub hop: u32,
    pub max_hops: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_invariant() {
        assert!(Paper::year_in_range(None));
        assert!(Paper::year_in_range(Some(1900)));
        assert!(Paper::year_in_range(Some(2100)));
        assert!(!Paper::year_in_range(Some(1899)));
        assert!(!Paper::year_in_range(Some(2101)));
    }

    #[test]
    fn citation_score_is_capped_at_one() {
        assert_eq!(citation_score(0), 0.0);
        assert_eq!(citation_score(50), 0.5);
        assert_eq!(citation_score(100), 1.0);
        assert_eq!(citation_score(10_000), 1.0);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            Status::Pending,
            Status::Running,
            Status::Completed,
            Status::Failed,
            Status::Unavailable,
        ] {
            assert_eq!(Status::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn placeholder_paper_starts_all_pending() {
        let p = Paper::placeholder("P1", "Unknown");
        assert_eq!(p.crawl_status, Status::Pending);
        assert_eq!(p.pdf_status, Status::Pending);
        assert_eq!(p.summary_status, Status::Pending);
    }
}
