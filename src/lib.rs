//! Profile Census - concurrent profile fetcher
//!
//! Enumerates a numeric identifier space, fetches profiles in batches from a
//! remote HTTP API under a fixed concurrency cap, keeps active profiles from
//! the configured area and writes them to one CSV per age bucket. Failed
//! batches are retried in further passes.

pub mod crawling;
pub mod domain;
pub mod infrastructure;
pub mod test_utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::crawling::{FetchEngine, ProfileApi, ResponseFilter, RetryOrchestrator, RunSummary};
use crate::domain::IdSource;
use crate::infrastructure::{AppConfig, HttpClient, HttpClientConfig, OutputSet};

/// Runs every pass over `1..=max_user_id` with the given API
pub async fn run_census(config: &AppConfig, api: Arc<dyn ProfileApi>) -> Result<RunSummary> {
    config.validate().context("Invalid configuration")?;

    let outputs = OutputSet::open(&config.output, &config.buckets)?;
    let engine = FetchEngine::new(
        api,
        ResponseFilter::new(config.filter_criteria()),
        Arc::clone(&outputs.buckets),
        Arc::clone(&outputs.status_log),
        config.engine_settings(),
    );
    let policy = outputs.retry_policy(&config.output, config.crawl.max_retry_attempts);
    info!(
        "🚀 Census over ids 1..={} with concurrency {}, output in {:?}",
        config.crawl.max_user_id, config.crawl.concurrency, outputs.directory
    );

    RetryOrchestrator::new(engine, policy)
        .run(IdSource::full_range(config.crawl.max_user_id))
        .await
}

/// Runs the census against the configured HTTP endpoint
pub async fn run_with_http(config: &AppConfig) -> Result<RunSummary> {
    let client = HttpClient::new(HttpClientConfig::from_api_config(&config.api))?;
    run_census(config, Arc::new(client)).await
}
