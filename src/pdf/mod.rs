//! PDF Fetcher + Text Extractor (C2, §4.2).

mod extract;
mod fetch;

pub use extract::{canonicalize, extract};
pub use fetch::{build_client, fetch, FetchedPdf};
