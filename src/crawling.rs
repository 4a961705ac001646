//! # Crawling Module
//!
//! The concurrent fetch-filter-bucket core.
//! - `batcher`: identifier batches bounded by request key length
//! - `response` / `filter`: decoding and record selection
//! - `buckets`: routing records to age-bucket sinks
//! - `engine`: one bounded-concurrency pass
//! - `retry`: multi-pass replay of failed identifiers

pub mod api;
pub mod batcher;
pub mod buckets;
pub mod engine;
pub mod error;
pub mod filter;
pub mod response;
pub mod retry;
pub mod state;

pub use api::ProfileApi;
pub use batcher::{Batch, Batcher, KEY_SEPARATOR};
pub use buckets::{AgeBucket, BucketSet, RouteSummary};
pub use engine::{EngineSettings, FetchEngine};
pub use error::FetchError;
pub use filter::{FilterCriteria, ResponseFilter, SkipReason, parse_birth_date};
pub use response::{ApiResponse, UserEntry, decode_response};
pub use retry::{RetryOrchestrator, RetryPolicy, RunSummary};
pub use state::{PassPhase, PassStats, PassSummary, ProgressSnapshot};
