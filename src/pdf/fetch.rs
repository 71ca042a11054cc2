//! `Fetch(url) -> bytes|Unavailable` (§4.2): follows redirects up to a
//! bound, enforces `Content-Type` and a max size, hashes the body.

use crate::error::{RefNetError, RefNetResult};
use sha2::{Digest, Sha256};
use tracing::instrument;

const MAX_REDIRECTS: usize = 5;
const DEFAULT_MAX_BYTES: usize = 50 * 1024 * 1024;

pub struct FetchedPdf {
    pub bytes: Vec<u8>,
    pub sha256_hex: String,
    pub size: usize,
}

/// Fetches a PDF, rejecting non-PDF content types and oversized bodies as
/// `Unavailable` rather than retrying (§4.2, §7).
#[instrument(skip(client))]
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    max_bytes: Option<usize>,
) -> RefNetResult<FetchedPdf> {
    let max_bytes = max_bytes.unwrap_or(DEFAULT_MAX_BYTES);

    let response = client
        .get(url)
        .header("Accept", "application/pdf")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                RefNetError::Unavailable(format!("could not reach {url}: {e}"))
            } else {
                RefNetError::Unavailable(e.to_string())
            }
        })?;

    if response.url().as_str() != url {
        // reqwest follows redirects internally up to its own default cap;
        // we additionally assert the final hop count stays bounded by
        // inspecting the redirect history reqwest exposes via extensions
        // is not available post-hoc, so we treat any completed request as
        // within MAX_REDIRECTS (reqwest's client is configured with that
        // limit at construction, see `build_client`).
        let _ = MAX_REDIRECTS;
    }

    if !response.status().is_success() {
        return Err(RefNetError::Unavailable(format!(
            "unexpected status {} fetching {url}",
            response.status()
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.contains("application/pdf") {
        return Err(RefNetError::Unavailable(format!(
            "unexpected content-type '{content_type}' for {url}"
        )));
    }

    if let Some(len) = response.content_length() {
        if len as usize > max_bytes {
            return Err(RefNetError::Unavailable(format!(
                "body too large ({len} bytes) for {url}"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| RefNetError::Unavailable(e.to_string()))?;
    if bytes.len() > max_bytes {
        return Err(RefNetError::Unavailable(format!(
            "body too large ({} bytes) for {url}",
            bytes.len()
        )));
    }

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256_hex = format!("{:x}", hasher.finalize());

    Ok(FetchedPdf {
        size: bytes.len(),
        sha256_hex,
        bytes: bytes.to_vec(),
    })
}

/// Builds the shared `reqwest::Client` used by both the catalog and PDF
/// fetcher, capping automatic redirects per §4.2.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .expect("static reqwest client configuration is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        let mut hasher = Sha256::new();
        hasher.update(b"hello");
        let a = format!("{:x}", hasher.finalize());
        let mut hasher = Sha256::new();
        hasher.update(b"hello");
        let b = format!("{:x}", hasher.finalize());
        assert_eq!(a, b);
    }

    #[test]
    fn build_client_does_not_panic() {
        let _ = build_client();
    }
}
