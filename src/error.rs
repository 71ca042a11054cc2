//! Error taxonomy for the library.
//!
//! `RefNetError` is the single error type returned by every public
//! operation. Its variants mirror the external-failure taxonomy workers use
//! to decide whether a queue item retries or goes terminal — see
//! [`RefNetError::classify`].

use std::time::Duration;
use thiserror::Error;

/// The library's error type.
#[derive(Error, Debug)]
pub enum RefNetError {
    /// Upstream has no such resource (catalog 404, missing paper row, ...).
    #[error("not found: {0}")]
    NotFound(String),

    /// Upstream asked us to back off; carries `Retry-After` when present.
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Network failure or 5xx; safe to retry with backoff.
    #[error("transient failure: {0}")]
    Transient(String),

    /// 4xx (other than 404) or malformed response; never retried.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// A PDF could not be obtained in a usable form; never retried.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Persistence failure; the caller's transaction has rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Extracted text failed to meet the minimum usable length.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure raised by `reqwest` before a status
    /// code could be classified.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body failed to parse as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Vault filesystem I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type RefNetResult<T> = Result<T, RefNetError>;

/// What a worker should do with an error once it reaches the queue's
/// completion path (§7: "Only Transient/RateLimited increment retry_count
/// with backoff; others go terminal immediately").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Increment `retry_count`, schedule with backoff, stay `pending` until
    /// the retry budget is exhausted.
    Retry,
    /// Transition straight to terminal `failed`.
    Terminal,
}

impl RefNetError {
    /// Classify this error for the queue's completion path.
    pub fn classify(&self) -> RetryDisposition {
        match self {
            RefNetError::Transient(_) | RefNetError::RateLimited { .. } => RetryDisposition::Retry,
            RefNetError::NotFound(_)
            | RefNetError::Permanent(_)
            | RefNetError::Unavailable(_)
            | RefNetError::Extraction(_)
            | RefNetError::Config(_)
            | RefNetError::Json(_)
            | RefNetError::Io(_) => RetryDisposition::Terminal,
            // A storage failure during a worker's own transaction is
            // surfaced to the caller, who rethrows; the queue marks the
            // item failed and Reclaim retries it later (§7).
            RefNetError::Storage(_) => RetryDisposition::Retry,
            RefNetError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    RetryDisposition::Retry
                } else {
                    RetryDisposition::Terminal
                }
            }
        }
    }

    /// A short machine-stable reason string stored in `error_message`
    /// columns (e.g. `"not_found"`, `"extraction_failed"`).
    pub fn reason_code(&self) -> &'static str {
        match self {
            RefNetError::NotFound(_) => "not_found",
            RefNetError::RateLimited { .. } => "rate_limited",
            RefNetError::Transient(_) => "transient",
            RefNetError::Permanent(_) => "permanent",
            RefNetError::Unavailable(_) => "no_pdf",
            RefNetError::Storage(_) => "storage",
            RefNetError::Extraction(_) => "extraction_failed",
            RefNetError::Config(_) => "config",
            RefNetError::Http(_) => "http",
            RefNetError::Json(_) => "json",
            RefNetError::Io(_) => "io",
        }
    }
}

impl From<&str> for RefNetError {
    fn from(s: &str) -> Self {
        RefNetError::Permanent(s.to_string())
    }
}

impl From<String> for RefNetError {
    fn from(s: String) -> Self {
        RefNetError::Permanent(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_rate_limited_retry() {
        assert_eq!(
            RefNetError::Transient("x".into()).classify(),
            RetryDisposition::Retry
        );
        assert_eq!(
            RefNetError::RateLimited { retry_after: None }.classify(),
            RetryDisposition::Retry
        );
    }

    #[test]
    fn not_found_and_extraction_are_terminal() {
        assert_eq!(
            RefNetError::NotFound("x".into()).classify(),
            RetryDisposition::Terminal
        );
        assert_eq!(
            RefNetError::Extraction("short".into()).classify(),
            RetryDisposition::Terminal
        );
    }

    #[test]
    fn reason_codes_match_spec_strings() {
        assert_eq!(RefNetError::NotFound("x".into()).reason_code(), "not_found");
        assert_eq!(
            RefNetError::Extraction("x".into()).reason_code(),
            "extraction_failed"
        );
        assert_eq!(RefNetError::Unavailable("x".into()).reason_code(), "no_pdf");
    }
}
