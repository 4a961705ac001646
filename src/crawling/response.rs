//! Wire model of a batch response
//!
//! Every per-user field except `id` is optional: a missing field means the
//! value is unknown, which the filter treats as a skip rather than an error.

use serde::Deserialize;

use super::error::FetchError;
use crate::domain::UserId;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub response: Option<Vec<UserEntry>>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub id: UserId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub city: Option<CityRef>,
    #[serde(default)]
    pub last_seen: Option<LastSeen>,
    #[serde(default)]
    pub bdate: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CityRef {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastSeen {
    /// Unix timestamp, seconds
    pub time: i64,
    #[serde(default)]
    pub platform: Option<i64>,
}

/// Decodes a raw body into its result array
///
/// A body without a `response` array (an API error envelope, for instance)
/// is a decode failure so the batch is retried.
pub fn decode_response(body: &str) -> Result<Vec<UserEntry>, FetchError> {
    let decoded: ApiResponse = serde_json::from_str(body)?;
    match decoded.response {
        Some(entries) => Ok(entries),
        None => Err(FetchError::MissingResults(
            decoded
                .error
                .map_or_else(|| "empty body".to_string(), |e| e.to_string()),
        )),
    }
}
