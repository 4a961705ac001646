use thiserror::Error;

use crate::infrastructure::sinks::SinkError;

/// Anything that makes a whole batch count as failed
///
/// Transport and decode failures are treated identically by the engine:
/// the batch's identifiers go to the failure list and are retried.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API returned no result array: {0}")]
    MissingResults(String),

    #[error("Batch handler aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
