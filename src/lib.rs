//! # refnet
//!
//! A citation-graph crawler: given a seed paper id, recursively discovers
//! its citation neighborhood through a bibliographic catalog, fetches and
//! summarizes available PDFs, and renders the result as a Markdown vault
//! with cross-linked notes.
//!
//! ## Architecture
//!
//! Work flows entirely through a persistent, priority-ordered queue backed
//! by the [`store::GraphStore`] (C4) and [`queue::WorkQueue`] (C5):
//!
//! ```text
//! ingress::Ingress::start
//!     -> enqueue(crawl)
//!     -> workers::crawl::CrawlWorker   (writes graph, fans out)
//!     -> workers::summarize::SummarizeWorker (PDF + LLM summary/keywords)
//!     -> workers::generate::GenerateWorker   (Markdown vault, may re-enqueue crawl)
//! ```
//!
//! [`dispatcher::Dispatcher`] runs alongside the workers, reclaiming
//! expired queue leases, re-enqueuing orphaned work, and purging old
//! terminal rows.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use refnet::config::Config;
//! use refnet::store::GraphStore;
//! use refnet::queue::WorkQueue;
//! use refnet::ingress::Ingress;
//!
//! #[tokio::main]
//! async fn main() -> refnet::error::RefNetResult<()> {
//!     let config = Config::from_env()?;
//!     let store = GraphStore::connect(&config.db_url).await?;
//!     let queue = WorkQueue::new(store.pool().clone());
//!     let ingress = Ingress::new(store, queue);
//!
//!     let result = ingress.start("649def34f8be52c8b66281af98ae884c09aef38e", 2).await?;
//!     println!("queued crawl task {}", result.task_id);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ingress;
pub mod logging;
pub mod models;
pub mod pdf;
pub mod queue;
pub mod recursion;
pub mod store;
pub mod summarizer;
pub mod workers;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{RefNetError, RefNetResult};
pub use ingress::{Ingress, StartResult};
pub use queue::WorkQueue;
pub use store::GraphStore;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::{Config, Dispatcher, Ingress, RefNetError, RefNetResult, StartResult, WorkQueue};
    pub use crate::store::GraphStore;
}
