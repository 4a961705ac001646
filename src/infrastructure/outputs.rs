//! Opens every output of one run
//!
//! Bucket CSVs and the combined CSV are truncated and get the header line;
//! the status log is appended to. Failure lists are created per pass by the
//! retry orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::config::{BucketConfig, OutputConfig};
use super::sinks::{LineSink, StatusLog};
use crate::crawling::{AgeBucket, BucketSet, RetryPolicy};
use crate::domain::CSV_HEADER;

/// Sinks shared by every pass of a run
pub struct OutputSet {
    pub directory: PathBuf,
    pub buckets: Arc<BucketSet>,
    pub status_log: Arc<StatusLog>,
}

impl OutputSet {
    pub fn open(output: &OutputConfig, buckets: &[BucketConfig]) -> Result<Self> {
        let directory = output.directory.clone();
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create output directory {:?}", directory))?;

        let mut age_buckets = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let sink = open_csv(&directory.join(&bucket.file_name))?;
            age_buckets.push(AgeBucket::new(bucket.name.clone(), bucket.range(), sink));
            info!("📁 Bucket '{}' ({}) -> {}", bucket.name, bucket.range(), bucket.file_name);
        }

        let combined = output
            .combined_file_name
            .as_ref()
            .map(|name| open_csv(&directory.join(name)))
            .transpose()?;

        let status_path = directory.join(&output.status_log_file_name);
        let status_log = StatusLog::open(&status_path)
            .with_context(|| format!("Failed to open status log {:?}", status_path))?;

        Ok(Self {
            directory,
            buckets: Arc::new(BucketSet::new(age_buckets, combined)),
            status_log: Arc::new(status_log),
        })
    }

    /// Failure lists live next to the CSV outputs
    pub fn retry_policy(&self, output: &OutputConfig, max_retry_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            failure_dir: self.directory.clone(),
            failure_file_prefix: output.failure_file_prefix.clone(),
            max_retry_attempts,
        }
    }
}

fn open_csv(path: &Path) -> Result<Arc<LineSink>> {
    let sink = LineSink::create(path, Some(CSV_HEADER)).with_context(|| format!("Failed to open {:?}", path))?;
    Ok(Arc::new(sink))
}
