//! Workers (C6-C8, §4.6-§4.8): uniform `claim -> handle -> complete` loops
//! over the three pipeline stages.
//!
//! Grounded in `other_examples/b4518660_.../job_processor_v2.rs.rs`'s
//! `JobProcessorV2::run` poll loop (claim a batch, process, sleep on empty,
//! sleep-and-retry on fetch error) — generalized here into one shared
//! driver so `crawl`/`summarize`/`generate` only supply their per-item
//! handler.

pub mod crawl;
pub mod generate;
pub mod summarize;

use crate::error::RefNetResult;
use crate::models::{QueueItem, Stage};
use crate::queue::WorkQueue;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, instrument, trace};

/// Interval slept when a stage's queue is empty, before polling again.
const EMPTY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before retrying after a queue-level fetch error (storage outage).
const CLAIM_ERROR_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Runs `handler` against every item claimed for `stage`, forever. Each
/// handler returns `Ok(())` on success or an error that is classified and
/// either retried (back to pending) or terminally failed (§7) — the
/// caller's handler never needs to touch the queue row itself.
#[instrument(skip(queue, handler))]
pub async fn run_loop<F, Fut>(
    queue: &WorkQueue,
    stage: Stage,
    worker_id: &str,
    handler: F,
) -> RefNetResult<()>
where
    F: Fn(QueueItem) -> Fut,
    Fut: Future<Output = RefNetResult<()>>,
{
    loop {
        match queue.claim(stage, worker_id).await {
            Ok(Some(item)) => {
                let item_id = item.id;
                let retry_count = item.retry_count;
                let max_retries = item.max_retries;
                match handler(item).await {
                    Ok(()) => trace!(item_id, "queue item handled"),
                    Err(e) => {
                        let retryable = matches!(e.classify(), crate::error::RetryDisposition::Retry);
                        error!(item_id, retry_count, max_retries, error = %e, "queue item failed");
                        // The handler is responsible for calling `complete`/
                        // `retry_or_fail` on the happy and Storage-error
                        // paths already; this catches anything it didn't
                        // (e.g. a panic-free early return via `?`).
                        let _ = queue
                            .retry_or_fail(item_id, retry_count, max_retries, retryable, e.reason_code())
                            .await;
                    }
                }
            }
            Ok(None) => {
                tokio::time::sleep(EMPTY_POLL_INTERVAL).await;
            }
            Err(e) => {
                error!(error = %e, "failed to claim from queue");
                tokio::time::sleep(CLAIM_ERROR_RETRY_DELAY).await;
            }
        }
    }
}

/// Logs worker start-up once, grounded in the teacher's consistent
/// `tracing::info!` entry logging at the top of long-running operations.
pub fn log_worker_start(stage: Stage, worker_id: &str) {
    info!(stage = %stage, worker_id, "worker loop starting");
}
