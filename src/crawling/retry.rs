//! # Retry Orchestrator
//!
//! Runs pass 1 over the full identifier range, then replays each pass's
//! failure list as the next pass's source until a pass ends clean or the
//! retry budget is spent. Every pass writes its own `<prefix>_<n>.txt`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::engine::FetchEngine;
use super::state::PassSummary;
use crate::domain::{IdSource, UserId};
use crate::infrastructure::sinks::{FailureSink, read_failure_list};

/// Where failure lists go and how many retry passes are allowed
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub failure_dir: PathBuf,
    pub failure_file_prefix: String,
    /// Retry passes after the first; total passes never exceed `1 + this`
    pub max_retry_attempts: u32,
}

impl RetryPolicy {
    pub fn failure_path(&self, pass_number: u32) -> PathBuf {
        self.failure_dir
            .join(format!("{}_{}.txt", self.failure_file_prefix, pass_number))
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub passes: Vec<PassSummary>,
    /// Identifiers left in the last pass's failure list
    pub outstanding_failures: usize,
}

impl RunSummary {
    /// Every identifier was resolved; nothing is left in a failure list and
    /// no pass lost track of any identifier
    pub fn is_complete(&self) -> bool {
        self.outstanding_failures == 0 && self.unaccounted() == 0
    }

    /// Identifiers that fell out of every pass without being retried
    pub fn unaccounted(&self) -> u64 {
        self.passes.iter().map(PassSummary::unaccounted).sum()
    }

    pub fn final_failure_file(&self) -> Option<&Path> {
        self.passes.last().and_then(|p| p.failure_file.as_deref())
    }

    pub fn records_written(&self) -> u64 {
        self.passes.iter().map(|p| p.records_written).sum()
    }
}

pub struct RetryOrchestrator {
    engine: FetchEngine,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    pub fn new(engine: FetchEngine, policy: RetryPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs every pass; only failing to create or read a failure list is an
    /// error, running out of retries is reported through [`RunSummary`]
    pub async fn run(&self, initial: IdSource) -> Result<RunSummary> {
        let mut passes = Vec::new();
        let mut source = initial;
        let mut pass_number = 1;

        loop {
            let failed_ids = self.run_one(pass_number, source, &mut passes).await?;
            if failed_ids.is_empty() {
                info!("✅ Pass {} left no failures", pass_number);
                return Ok(RunSummary {
                    passes,
                    outstanding_failures: 0,
                });
            }

            let retries_used = pass_number - 1;
            if retries_used >= self.policy.max_retry_attempts {
                let path = self.policy.failure_path(pass_number);
                warn!(
                    "⚠️ Retry budget of {} spent; {} identifiers remain in {}",
                    self.policy.max_retry_attempts,
                    failed_ids.len(),
                    path.display()
                );
                self.engine.log().log(&format!(
                    "Giving up after {} passes: {} identifiers unresolved, see {}",
                    pass_number,
                    failed_ids.len(),
                    path.display()
                ));
                return Ok(RunSummary {
                    passes,
                    outstanding_failures: failed_ids.len(),
                });
            }

            info!("🔄 Retrying {} failed identifiers in pass {}", failed_ids.len(), pass_number + 1);
            source = IdSource::replay(failed_ids);
            pass_number += 1;
        }
    }

    /// One pass with a fresh failure file, returning that file read back
    async fn run_one(&self, pass_number: u32, source: IdSource, passes: &mut Vec<PassSummary>) -> Result<Vec<UserId>> {
        let path = self.policy.failure_path(pass_number);
        let failures = Arc::new(
            FailureSink::create(&path)
                .with_context(|| format!("Failed to create failure list for pass {pass_number}"))?,
        );

        let summary = self.engine.run_pass(pass_number, source, Arc::clone(&failures)).await;
        if summary.unaccounted() > 0 {
            warn!(
                "⚠️ Pass {} lost track of {} identifiers; they will not be retried",
                pass_number,
                summary.unaccounted()
            );
        }
        failures
            .flush()
            .with_context(|| format!("Failed to flush {}", path.display()))?;
        drop(failures);
        passes.push(summary);

        read_failure_list(&path).with_context(|| format!("Failed to read back {}", path.display()))
    }
}
