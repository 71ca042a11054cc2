//! CLI entry point for the refnet citation-graph crawler.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use refnet::catalog::HttpCatalogClient;
use refnet::catalog::ratelimit::RetryPolicy;
use refnet::config::{AiProvider, Config};
use refnet::dispatcher::Dispatcher;
use refnet::error::{RefNetError, RefNetResult};
use refnet::ingress::Ingress;
use refnet::logging;
use refnet::models::Stage;
use refnet::queue::WorkQueue;
use refnet::store::GraphStore;
use refnet::summarizer::providers::{AnthropicProvider, OpenAiProvider};
use refnet::summarizer::SummarizerClient;
use refnet::workers::crawl::CrawlWorker;
use refnet::workers::generate::GenerateWorker;
use refnet::workers::summarize::SummarizeWorker;
use refnet::workers::{log_worker_start, run_loop};
use std::time::Duration;

/// refnet - citation-graph crawler, summarizer, and Markdown vault generator
#[derive(Parser)]
#[command(name = "refnet")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a crawl from a seed paper id (C10 Ingress)
    Ingress {
        /// Seed paper id as recognized by the catalog (e.g. a Semantic Scholar paper id)
        seed_id: String,

        /// Hop cap for the recursive crawl; overrides MAX_CRAWL_DEPTH
        #[arg(long)]
        max_hops: Option<u32>,

        /// Poll and report crawl/pdf/summary status until all three are terminal
        #[arg(long)]
        wait: bool,
    },

    /// Run a single stage's worker loop, claiming and processing jobs forever
    Worker {
        /// Which stage to process
        #[arg(value_enum)]
        stage: WorkerStage,

        /// Worker identity recorded on claimed queue rows; defaults to `<stage>-<pid>`
        #[arg(long)]
        worker_id: Option<String>,
    },

    /// Run the maintenance loop: reclaim expired leases, re-enqueue orphaned
    /// work, purge old terminal queue rows
    Dispatcher,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum WorkerStage {
    Crawl,
    Summarize,
    Generate,
}

impl From<WorkerStage> for Stage {
    fn from(s: WorkerStage) -> Self {
        match s {
            WorkerStage::Crawl => Stage::Crawl,
            WorkerStage::Summarize => Stage::Summarize,
            WorkerStage::Generate => Stage::Generate,
        }
    }
}

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            match e {
                RefNetError::Config(_) => 1,
                RefNetError::Storage(_) => 2,
                _ => 1,
            }
        }
    };
    std::process::exit(exit_code);
}

async fn run() -> RefNetResult<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    logging::init(config.log_format, &config.log_filter)?;

    match cli.command {
        Commands::Ingress {
            seed_id,
            max_hops,
            wait,
        } => cmd_ingress(&config, seed_id, max_hops, wait).await,
        Commands::Worker { stage, worker_id } => cmd_worker(&config, stage, worker_id).await,
        Commands::Dispatcher => cmd_dispatcher(&config).await,
    }
}

async fn cmd_ingress(config: &Config, seed_id: String, max_hops: Option<u32>, wait: bool) -> RefNetResult<()> {
    let store = GraphStore::connect(&config.db_url).await?;
    let queue = WorkQueue::new(store.pool().clone());
    let ingress = Ingress::new(store.clone(), queue);

    let hops = max_hops.unwrap_or(config.max_crawl_depth);
    let result = ingress.start(&seed_id, hops).await?;
    println!("paper_id={} task_id={}", result.paper_id, result.task_id);

    if !wait {
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    loop {
        let Some(status) = ingress.status(&result.paper_id).await? else {
            break;
        };
        spinner.set_message(format!(
            "crawl={} pdf={} summary={}",
            status.crawl_status, status.pdf_status, status.summary_status
        ));
        spinner.tick();
        if is_terminal(status.crawl_status) && is_terminal(status.pdf_status) && is_terminal(status.summary_status)
        {
            break;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    spinner.finish_with_message("done");
    Ok(())
}

fn is_terminal(status: refnet::models::Status) -> bool {
    matches!(
        status,
        refnet::models::Status::Completed | refnet::models::Status::Failed | refnet::models::Status::Unavailable
    )
}

async fn cmd_worker(config: &Config, stage: WorkerStage, worker_id: Option<String>) -> RefNetResult<()> {
    let store = GraphStore::connect(&config.db_url).await?;
    let queue = WorkQueue::new(store.pool().clone());
    let stage: Stage = stage.into();
    let worker_id = worker_id.unwrap_or_else(|| format!("{}-{}", stage.as_str(), std::process::id()));
    log_worker_start(stage, &worker_id);

    match stage {
        Stage::Crawl => {
            let retry = RetryPolicy {
                max_attempts: config.retry_max,
                backoff_base: config.backoff_base,
                backoff_max: config.backoff_max,
            };
            let requests_per_second = (1.0 / config.crawl_delay.as_secs_f64().max(0.001)).ceil() as u32;
            let catalog = HttpCatalogClient::new(config.catalog_api_key.clone(), requests_per_second, retry);
            let worker = CrawlWorker::new(store, queue.clone(), catalog, config.max_crawl_depth);
            run_loop(&queue, stage, &worker_id, |item| worker.handle(item)).await
        }
        Stage::Summarize => match config.ai_provider {
            AiProvider::OpenAi => {
                let provider = OpenAiProvider::new(config.llm_api_key.clone().unwrap_or_default());
                let summarizer = SummarizerClient::new(
                    provider,
                    config.ai_model.clone(),
                    config.ai_temperature,
                    config.ai_max_tokens,
                );
                let worker = SummarizeWorker::new(store, queue.clone(), refnet::pdf::build_client(), summarizer, None);
                run_loop(&queue, stage, &worker_id, |item| worker.handle(item)).await
            }
            AiProvider::Anthropic => {
                let provider = AnthropicProvider::new(config.llm_api_key.clone().unwrap_or_default());
                let summarizer = SummarizerClient::new(
                    provider,
                    config.ai_model.clone(),
                    config.ai_temperature,
                    config.ai_max_tokens,
                );
                let worker = SummarizeWorker::new(store, queue.clone(), refnet::pdf::build_client(), summarizer, None);
                run_loop(&queue, stage, &worker_id, |item| worker.handle(item)).await
            }
        },
        Stage::Generate => {
            let worker = GenerateWorker::new(store, queue.clone(), config.vault_path.clone(), config.max_crawl_depth);
            run_loop(&queue, stage, &worker_id, |item| worker.handle(item)).await
        }
    }
}

async fn cmd_dispatcher(config: &Config) -> RefNetResult<()> {
    let store = GraphStore::connect(&config.db_url).await?;
    let queue = WorkQueue::new(store.pool().clone());
    let dispatcher = Dispatcher::new(store, queue, config.queue_lease, config.queue_retention_days);
    dispatcher.run_forever(config.dispatcher_tick).await
}
