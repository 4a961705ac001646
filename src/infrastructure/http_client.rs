//! HTTP client for the remote profile API
//!
//! One GET per batch: the endpoint plus fixed query pairs, the joined
//! identifier key and the requested field list.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use url::{Url, form_urlencoded};

use crate::crawling::{FetchError, KEY_SEPARATOR, ProfileApi};
use crate::infrastructure::config::ApiConfig;

/// HTTP client configuration for batch lookups
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub endpoint: String,
    pub ids_param: String,
    pub fields: String,
    pub extra_params: Vec<(String, String)>,
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl HttpClientConfig {
    pub fn from_api_config(api: &ApiConfig) -> Self {
        Self {
            endpoint: api.endpoint.clone(),
            ids_param: api.ids_param.clone(),
            fields: api.fields.clone(),
            extra_params: api.extra_params.clone(),
            user_agent: api.user_agent.clone(),
            timeout_seconds: api.timeout_seconds,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from_api_config(&ApiConfig::default())
    }
}

pub struct HttpClient {
    client: Client,
    endpoint: Url,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = Url::parse(&config.endpoint)
            .with_context(|| format!("Invalid API endpoint: {}", config.endpoint))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// Request URL for one batch key
    ///
    /// Fixed pairs are form-encoded, but the identifier key and the field
    /// list keep their commas literal so the key sent is exactly as long as
    /// the batcher measured it.
    pub fn batch_url(&self, ids_key: &str) -> Url {
        let mut query = form_urlencoded::Serializer::new(self.endpoint.query().unwrap_or_default().to_string());
        for (key, value) in &self.config.extra_params {
            query.append_pair(key, value);
        }
        let mut query = query.finish();

        append_list_pair(&mut query, &self.config.ids_param, ids_key);
        if !self.config.fields.is_empty() {
            append_list_pair(&mut query, "fields", &self.config.fields);
        }

        let mut url = self.endpoint.clone();
        url.set_query(Some(&query));
        url
    }

    /// Get the configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

/// Appends `name=a,b,c`, encoding each item but not the separators
fn append_list_pair(query: &mut String, name: &str, list: &str) {
    if !query.is_empty() {
        query.push('&');
    }
    query.extend(form_urlencoded::byte_serialize(name.as_bytes()));
    query.push('=');
    for (index, item) in list.split(KEY_SEPARATOR).enumerate() {
        if index > 0 {
            query.push(KEY_SEPARATOR);
        }
        query.extend(form_urlencoded::byte_serialize(item.as_bytes()));
    }
}

#[async_trait]
impl ProfileApi for HttpClient {
    async fn fetch_batch(&self, ids_key: &str) -> Result<String, FetchError> {
        let url = self.batch_url(ids_key);
        tracing::trace!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;
        tracing::trace!("Fetched {} chars for {} ids", text.len(), ids_key.split(KEY_SEPARATOR).count());
        Ok(text)
    }
}
