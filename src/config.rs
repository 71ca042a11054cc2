//! Environment-driven configuration (§6, §10.3).
//!
//! One flat struct populated once at process start and passed by reference
//! into constructors — no module-level mutable settings. The only
//! process-wide state elsewhere in the crate is the catalog rate limiter's
//! token bucket (`catalog::ratelimit`), which this config parameterizes.

use crate::error::{RefNetError, RefNetResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which LLM backend the Summarizer Client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::OpenAi => write!(f, "openai"),
            AiProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Per-stage worker concurrency (§5 suggested defaults: crawl 4, summarize 2, generate 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConcurrency {
    pub crawl: usize,
    pub summarize: usize,
    pub generate: usize,
}

impl Default for WorkerConcurrency {
    fn default() -> Self {
        Self {
            crawl: 4,
            summarize: 2,
            generate: 4,
        }
    }
}

/// Full process configuration, read from the environment once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hop cap for recursive crawling (`MAX_CRAWL_DEPTH`, default 2).
    pub max_crawl_depth: u32,
    /// Minimum interval between catalog calls per worker (`CRAWL_DELAY_SECONDS`, default 1).
    pub crawl_delay: Duration,

    pub ai_provider: AiProvider,
    pub ai_model: Option<String>,
    pub ai_max_tokens: u32,
    pub ai_temperature: f32,

    pub catalog_api_key: Option<String>,
    pub llm_api_key: Option<String>,

    pub vault_path: String,
    pub db_url: String,
    pub queue_url: Option<String>,

    pub worker_concurrency: WorkerConcurrency,

    pub retry_max: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,

    pub log_format: LogFormat,
    pub log_filter: String,

    pub dispatcher_tick: Duration,
    pub queue_lease: Duration,
    pub queue_retention_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_crawl_depth: 2,
            crawl_delay: Duration::from_secs(1),
            ai_provider: AiProvider::default(),
            ai_model: None,
            ai_max_tokens: 4096,
            ai_temperature: 0.3,
            catalog_api_key: None,
            llm_api_key: None,
            vault_path: "./vault".to_string(),
            db_url: "sqlite://refnet.db".to_string(),
            queue_url: None,
            worker_concurrency: WorkerConcurrency::default(),
            retry_max: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(30),
            log_format: LogFormat::default(),
            log_filter: "info".to_string(),
            dispatcher_tick: Duration::from_secs(60),
            queue_lease: Duration::from_secs(1800),
            queue_retention_days: 30,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Errors only on a malformed `AI_PROVIDER`.
    pub fn from_env() -> RefNetResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_crawl_depth: env_parsed("MAX_CRAWL_DEPTH", defaults.max_crawl_depth),
            crawl_delay: Duration::from_secs(env_parsed(
                "CRAWL_DELAY_SECONDS",
                defaults.crawl_delay.as_secs(),
            )),
            ai_provider: Self::parse_provider_from_env()?,
            ai_model: std::env::var("AI_MODEL").ok(),
            ai_max_tokens: env_parsed("AI_MAX_TOKENS", defaults.ai_max_tokens),
            ai_temperature: env_parsed("AI_TEMPERATURE", defaults.ai_temperature),
            catalog_api_key: std::env::var("CATALOG_API_KEY").ok(),
            llm_api_key: std::env::var("LLM_API_KEY").ok(),
            vault_path: std::env::var("VAULT_PATH").unwrap_or(defaults.vault_path),
            db_url: std::env::var("DB_URL").unwrap_or(defaults.db_url),
            queue_url: std::env::var("QUEUE_URL").ok(),
            worker_concurrency: WorkerConcurrency {
                crawl: env_parsed("WORKER_CONCURRENCY_CRAWL", defaults.worker_concurrency.crawl),
                summarize: env_parsed(
                    "WORKER_CONCURRENCY_SUMMARIZE",
                    defaults.worker_concurrency.summarize,
                ),
                generate: env_parsed(
                    "WORKER_CONCURRENCY_GENERATE",
                    defaults.worker_concurrency.generate,
                ),
            },
            retry_max: env_parsed("RETRY_MAX", defaults.retry_max),
            backoff_base: Duration::from_millis(env_parsed(
                "BACKOFF_BASE_MS",
                defaults.backoff_base.as_millis() as u64,
            )),
            backoff_max: Duration::from_millis(env_parsed(
                "BACKOFF_MAX_MS",
                defaults.backoff_max.as_millis() as u64,
            )),
            log_format: Self::parse_log_format_from_env(),
            log_filter: std::env::var("RUST_LOG")
                .or_else(|_| std::env::var("REFNET_LOG"))
                .unwrap_or_else(|_| "info".to_string()),
            dispatcher_tick: Duration::from_secs(env_parsed(
                "DISPATCHER_TICK_SECONDS",
                defaults.dispatcher_tick.as_secs(),
            )),
            queue_lease: Duration::from_secs(env_parsed(
                "QUEUE_LEASE_SECONDS",
                defaults.queue_lease.as_secs(),
            )),
            queue_retention_days: env_parsed(
                "QUEUE_RETENTION_DAYS",
                defaults.queue_retention_days,
            ),
        })
    }

    fn parse_provider_from_env() -> RefNetResult<AiProvider> {
        match std::env::var("AI_PROVIDER").as_deref() {
            Ok("openai") => Ok(AiProvider::OpenAi),
            Ok("anthropic") => Ok(AiProvider::Anthropic),
            Ok(other) => Err(RefNetError::Config(format!(
                "unknown AI_PROVIDER: {other}. Valid options: openai, anthropic"
            ))),
            Err(_) => Ok(AiProvider::default()),
        }
    }

    fn parse_log_format_from_env() -> LogFormat {
        match std::env::var("REFNET_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }

    pub fn with_vault_path(mut self, path: impl Into<String>) -> Self {
        self.vault_path = path.into();
        self
    }

    pub fn with_db_url(mut self, url: impl Into<String>) -> Self {
        self.db_url = url.into();
        self
    }

    pub fn with_provider(mut self, provider: AiProvider) -> Self {
        self.ai_provider = provider;
        self
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.max_crawl_depth, 2);
        assert_eq!(config.crawl_delay, Duration::from_secs(1));
        assert_eq!(config.retry_max, 3);
        assert_eq!(config.ai_provider, AiProvider::OpenAi);
    }

    #[test]
    fn builder_methods_chain() {
        let config = Config::new()
            .with_vault_path("/tmp/vault")
            .with_provider(AiProvider::Anthropic);
        assert_eq!(config.vault_path, "/tmp/vault");
        assert_eq!(config.ai_provider, AiProvider::Anthropic);
    }
}
