//! # Fetch Engine
//!
//! Runs one pass: a dispatch loop hands batches to workers, at most
//! `concurrency` of which are alive at any time. Each worker claims a batch,
//! performs one request, filters the result and routes records to bucket
//! sinks. Any failure, a panicking handler included, marks the whole batch
//! as failed and sends its identifiers to the pass's failure list.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::api::ProfileApi;
use super::batcher::{Batch, Batcher};
use super::buckets::BucketSet;
use super::error::FetchError;
use super::filter::ResponseFilter;
use super::response::decode_response;
use super::state::{PassPhase, PassStats, PassSummary};
use crate::domain::IdSource;
use crate::infrastructure::sinks::{FailureSink, StatusLog};

/// Tuning knobs for the dispatch loop
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Maximum batches with an outstanding request
    pub concurrency: usize,
    /// Joined identifier key must stay shorter than this
    pub max_batch_key_len: usize,
}

/// Collaborators shared by every pass of one run
#[derive(Clone)]
pub struct FetchEngine {
    api: Arc<dyn ProfileApi>,
    filter: Arc<ResponseFilter>,
    buckets: Arc<BucketSet>,
    log: Arc<StatusLog>,
    settings: EngineSettings,
}

impl FetchEngine {
    pub fn new(
        api: Arc<dyn ProfileApi>,
        filter: ResponseFilter,
        buckets: Arc<BucketSet>,
        log: Arc<StatusLog>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            api,
            filter: Arc::new(filter),
            buckets,
            log,
            settings,
        }
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn log(&self) -> &Arc<StatusLog> {
        &self.log
    }

    /// Runs a pass to completion; there is no cancellation once started
    pub async fn run_pass(&self, pass_number: u32, source: IdSource, failures: Arc<FailureSink>) -> PassSummary {
        let pass = Arc::new(Pass::new(self, pass_number, source, failures));
        pass.run(self.settings.concurrency).await
    }
}

/// State owned by one pass and shared with its workers
struct Pass {
    number: u32,
    source: Mutex<IdSource>,
    batcher: Batcher,
    stats: PassStats,
    failures: Arc<FailureSink>,
    api: Arc<dyn ProfileApi>,
    filter: Arc<ResponseFilter>,
    buckets: Arc<BucketSet>,
    log: Arc<StatusLog>,
    started: Instant,
    started_at: DateTime<Local>,
}

impl Pass {
    fn new(engine: &FetchEngine, number: u32, source: IdSource, failures: Arc<FailureSink>) -> Self {
        let total = source.total_count();
        Self {
            number,
            source: Mutex::new(source),
            batcher: Batcher::new(engine.settings.max_batch_key_len),
            stats: PassStats::new(total),
            failures,
            api: Arc::clone(&engine.api),
            filter: Arc::clone(&engine.filter),
            buckets: Arc::clone(&engine.buckets),
            log: Arc::clone(&engine.log),
            started: Instant::now(),
            started_at: Local::now(),
        }
    }

    fn has_more(&self) -> bool {
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .has_more()
    }

    async fn run(self: Arc<Self>, concurrency: usize) -> PassSummary {
        self.enter(PassPhase::Running);
        self.log.log(&format!(
            "Pass {} started: {} identifiers, concurrency {}",
            self.number,
            self.stats.total(),
            concurrency
        ));

        let slots = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut workers = JoinSet::new();

        while self.has_more() {
            // Blocks here while every slot is busy.
            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                error!("Concurrency slots closed; stopping dispatch for pass {}", self.number);
                break;
            };
            let pass = Arc::clone(&self);
            workers.spawn(async move {
                pass.process_next_batch().await;
                drop(permit);
            });

            while let Some(result) = workers.try_join_next() {
                self.reap(result);
            }
        }

        self.enter(PassPhase::Draining);
        debug!("Pass {} draining {} workers", self.number, workers.len());
        while let Some(result) = workers.join_next().await {
            self.reap(result);
        }

        if let Err(e) = self.failures.flush() {
            error!("Failed to flush failure list for pass {}: {}", self.number, e);
        }
        self.enter(PassPhase::Finished);

        let summary = self.summary();
        self.log.log(&format!(
            "Pass {} finished in {:.1}s: succeeded {}, failed {}, records {}",
            summary.pass_number,
            summary.elapsed.as_secs_f64(),
            summary.succeeded,
            summary.failed,
            summary.records_written
        ));
        summary
    }

    fn enter(&self, phase: PassPhase) {
        debug!("Pass {} {:?} -> {:?}", self.number, self.stats.phase(), phase);
        self.stats.set_phase(phase);
    }

    fn reap(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            // Batch handling is guarded below; this only fires if claiming
            // or bookkeeping itself panicked.
            error!("Batch worker in pass {} aborted: {}", self.number, e);
        }
    }

    async fn process_next_batch(self: Arc<Self>) {
        // Losing the race with exhaustion is expected at the tail of a pass.
        let Some(batch) = self.batcher.next_batch(&self.source) else {
            return;
        };

        // The handler runs as its own task so a panic in it still reaches
        // the failure branch with the claimed identifiers.
        let handler = Arc::clone(&self);
        let claimed = batch.clone();
        let outcome = match tokio::spawn(async move { handler.handle_batch(&claimed).await }).await {
            Ok(outcome) => outcome,
            Err(e) => Err(FetchError::Aborted(e.to_string())),
        };

        match outcome {
            Ok(records) => {
                self.stats.record_success(batch.len(), records);
                self.report_progress();
            }
            Err(e) => {
                warn!(
                    "Batch of {} ids ({}..) failed in pass {}: {}",
                    batch.len(),
                    batch.ids().first().copied().unwrap_or_default(),
                    self.number,
                    e
                );
                self.stats.record_failure(batch.len());
                self.report_progress();
                if let Err(e) = self.failures.record(batch.ids()) {
                    error!("Could not record failed ids for pass {}: {}", self.number, e);
                    self.log.log(&format!(
                        "Pass {}: {} failed ids not queued for retry: {}",
                        self.number,
                        batch.len(),
                        batch.key()
                    ));
                }
            }
        }
    }

    /// Request, decode, filter and route one batch; returns records kept
    async fn handle_batch(&self, batch: &Batch) -> Result<usize, FetchError> {
        let body = self.api.fetch_batch(batch.key()).await?;
        let entries = decode_response(&body)?;

        let now = Utc::now();
        let records = self.filter.apply(&entries, self.buckets.ranges(), now);
        let routed = self.buckets.route(&records, now.date_naive())?;
        debug!(
            "Batch of {} ids: {} entries, {} kept, {} bucket lines",
            batch.len(),
            entries.len(),
            records.len(),
            routed.bucket_lines
        );
        Ok(records.len())
    }

    fn report_progress(&self) {
        self.log.log_with(|| {
            self.stats
                .snapshot(self.started.elapsed(), self.started_at)
                .render()
        });
    }

    fn summary(&self) -> PassSummary {
        PassSummary {
            pass_number: self.number,
            total: self.stats.total(),
            succeeded: self.stats.succeeded(),
            failed: self.stats.failed(),
            records_written: self.stats.records_written(),
            elapsed: self.started.elapsed(),
            failure_file: self.failures.path().map(std::path::Path::to_path_buf),
            failures_recorded: self.failures.recorded(),
        }
    }
}

impl Drop for Pass {
    fn drop(&mut self) {
        if self.stats.phase() != PassPhase::Finished {
            info!("Pass {} dropped in phase {:?}", self.number, self.stats.phase());
        }
    }
}
