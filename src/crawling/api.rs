use async_trait::async_trait;

use super::error::FetchError;

/// Remote profile lookup, one call per batch
///
/// `ids_key` is the comma-joined identifier list built by the batcher. The
/// full response body is returned undecoded.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn fetch_batch(&self, ids_key: &str) -> Result<String, FetchError>;
}
