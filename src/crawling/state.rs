//! # Pass State
//!
//! Counters and lifecycle of a single pass, shared between the dispatch loop
//! and every in-flight batch worker.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Lifecycle of one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassPhase {
    Idle,
    Running,
    Draining,
    Finished,
}

impl PassPhase {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Draining => 2,
            Self::Finished => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Draining,
            3 => Self::Finished,
            _ => Self::Idle,
        }
    }
}

/// Lock-free counters updated by batch workers
#[derive(Debug)]
pub struct PassStats {
    total: usize,
    succeeded: AtomicU64,
    failed: AtomicU64,
    records_written: AtomicU64,
    phase: AtomicU8,
}

impl PassStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            phase: AtomicU8::new(PassPhase::Idle.as_u8()),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn phase(&self) -> PassPhase {
        PassPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: PassPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    pub fn record_success(&self, ids: usize, records: usize) {
        self.succeeded.fetch_add(ids as u64, Ordering::AcqRel);
        self.records_written.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self, ids: usize) {
        self.failed.fetch_add(ids as u64, Ordering::AcqRel);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, elapsed: Duration, started_at: DateTime<Local>) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total as u64,
            succeeded: self.succeeded(),
            failed: self.failed(),
            elapsed,
            started_at,
        }
    }
}

/// Point-in-time view used for progress lines
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub elapsed: Duration,
    pub started_at: DateTime<Local>,
}

impl ProgressSnapshot {
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed() as f64 * 100.0 / self.total as f64
    }

    /// `elapsed × total / processed`; only meaningful once something succeeded
    pub fn projected_duration(&self) -> Option<Duration> {
        if self.succeeded == 0 || self.processed() == 0 {
            return None;
        }
        let scale = self.total as f64 / self.processed() as f64;
        Some(self.elapsed.mul_f64(scale))
    }

    pub fn estimated_finish(&self) -> Option<DateTime<Local>> {
        let projected = chrono::Duration::from_std(self.projected_duration()?).ok()?;
        self.started_at.checked_add_signed(projected)
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Processed {}/{} ({:.2}%): succeeded {}, failed {}",
            self.processed(),
            self.total,
            self.percent(),
            self.succeeded,
            self.failed
        )];
        if let Some(finish) = self.estimated_finish() {
            lines.push(format!(
                "Estimated finish at {}",
                finish.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        lines
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub pass_number: u32,
    pub total: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub records_written: u64,
    pub elapsed: Duration,
    pub failure_file: Option<PathBuf>,
    /// Failed identifiers that actually reached the failure list
    pub failures_recorded: u64,
}

impl PassSummary {
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Identifiers neither resolved nor queued for retry
    pub fn unaccounted(&self) -> u64 {
        let total = self.total as u64;
        total.saturating_sub(self.processed()) + self.failed.saturating_sub(self.failures_recorded)
    }
}
