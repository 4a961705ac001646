//! Configuration infrastructure
//!
//! Configuration is organized into five sections:
//! 1. `api` - remote endpoint and request shape
//! 2. `crawl` - identifier space, filter thresholds and concurrency
//! 3. `buckets` - age buckets and their output files
//! 4. `output` - output directory and file naming
//! 5. `logging` - diagnostic log setup

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::crawling::{EngineSettings, FilterCriteria};
use crate::domain::AgeRange;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("crawl.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("crawl.max_user_id must be at least 1")]
    ZeroMaxUserId,

    #[error("crawl.max_batch_key_len must be at least 1")]
    ZeroBatchKeyLength,

    #[error("at least one age bucket is required")]
    NoBuckets,

    #[error("bucket '{name}' has min_age {min_age} greater than max_age {max_age}")]
    InvertedBucket { name: String, min_age: u32, max_age: u32 },

    #[error("bucket file name '{0}' is used more than once")]
    DuplicateFileName(String),

    #[error("region city range {min}..={max} is inverted")]
    InvertedRegion { min: i64, max: i64 },

    #[error("crawl.inactivity_days must not be negative")]
    NegativeInactivity,

    #[error("crawl.inactivity_days {days} exceeds the maximum of {max}")]
    InactivityTooLong { days: i64, max: i64 },

    #[error("api.endpoint '{endpoint}' is not a valid URL: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Identifier space, filter thresholds and concurrency
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Age buckets, each with its own CSV file
    #[serde(default = "default_buckets")]
    pub buckets: Vec<BucketConfig>,

    /// Output files
    #[serde(default)]
    pub output: OutputConfig,

    /// Diagnostic logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote profile API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Endpoint receiving one GET per batch
    pub endpoint: String,

    /// Query parameter carrying the comma-joined identifiers
    pub ids_param: String,

    /// Value of the `fields` query parameter
    pub fields: String,

    /// Fixed query pairs appended to every request (API version, locale, ...)
    pub extra_params: Vec<(String, String)>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// User agent header
    pub user_agent: String,
}

/// Crawl scope and filter thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Pass 1 covers identifiers `1..=max_user_id`
    pub max_user_id: u64,

    /// Maximum batches with an outstanding request
    pub concurrency: usize,

    /// Joined identifier key must stay shorter than this
    pub max_batch_key_len: usize,

    /// Retry passes after the first one
    pub max_retry_attempts: u32,

    /// Single city accepted outside the region range
    pub target_city_id: i64,

    /// Inclusive region city-code range
    pub region_city_min: i64,
    pub region_city_max: i64,

    /// Profiles not seen for longer than this are skipped
    pub inactivity_days: i64,
}

/// One age bucket and the CSV it writes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub name: String,
    pub min_age: u32,
    pub max_age: u32,
    pub file_name: String,
}

/// Output directory and file naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving every output file; created when missing
    pub directory: PathBuf,

    /// All-ages CSV; `None` disables it
    pub combined_file_name: Option<String>,

    /// Failure lists are written as `<prefix>_<pass>.txt`
    pub failure_file_prefix: String,

    /// Timestamped status log, appended across runs
    pub status_log_file_name: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log file directory; defaults to `logs/` next to the executable
    pub directory: Option<PathBuf>,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            crawl: CrawlConfig::default(),
            buckets: default_buckets(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::API_ENDPOINT.to_string(),
            ids_param: defaults::API_IDS_PARAM.to_string(),
            fields: defaults::API_FIELDS.to_string(),
            extra_params: defaults::API_EXTRA_PARAMS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: format!("profile-census/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_user_id: defaults::MAX_USER_ID,
            concurrency: defaults::CONCURRENCY,
            max_batch_key_len: defaults::MAX_BATCH_KEY_LEN,
            max_retry_attempts: defaults::MAX_RETRY_ATTEMPTS,
            target_city_id: defaults::TARGET_CITY_ID,
            region_city_min: defaults::REGION_CITY_MIN,
            region_city_max: defaults::REGION_CITY_MAX,
            inactivity_days: defaults::INACTIVITY_DAYS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(defaults::OUTPUT_DIRECTORY),
            combined_file_name: Some(defaults::COMBINED_FILE_NAME.to_string()),
            failure_file_prefix: defaults::FAILURE_FILE_PREFIX.to_string(),
            status_log_file_name: defaults::STATUS_LOG_FILE_NAME.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            directory: None,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl BucketConfig {
    pub fn range(&self) -> AgeRange {
        AgeRange::new(self.min_age, self.max_age)
    }
}

fn default_buckets() -> Vec<BucketConfig> {
    vec![
        BucketConfig {
            name: "children".to_string(),
            min_age: defaults::CHILD_MIN_AGE,
            max_age: defaults::CHILD_MAX_AGE,
            file_name: "children.csv".to_string(),
        },
        BucketConfig {
            name: "adults".to_string(),
            min_age: defaults::ADULT_MIN_AGE,
            max_age: defaults::ADULT_MAX_AGE,
            file_name: "adults.csv".to_string(),
        },
    ]
}

impl AppConfig {
    /// Checks every cross-field constraint the engine relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let crawl = &self.crawl;
        if crawl.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if crawl.max_user_id == 0 {
            return Err(ConfigError::ZeroMaxUserId);
        }
        if crawl.max_batch_key_len == 0 {
            return Err(ConfigError::ZeroBatchKeyLength);
        }
        if crawl.region_city_min > crawl.region_city_max {
            return Err(ConfigError::InvertedRegion {
                min: crawl.region_city_min,
                max: crawl.region_city_max,
            });
        }
        if crawl.inactivity_days < 0 {
            return Err(ConfigError::NegativeInactivity);
        }
        if crawl.inactivity_days > defaults::MAX_INACTIVITY_DAYS {
            return Err(ConfigError::InactivityTooLong {
                days: crawl.inactivity_days,
                max: defaults::MAX_INACTIVITY_DAYS,
            });
        }

        if self.buckets.is_empty() {
            return Err(ConfigError::NoBuckets);
        }
        let mut seen = std::collections::HashSet::new();
        for bucket in &self.buckets {
            if !bucket.range().is_valid() {
                return Err(ConfigError::InvertedBucket {
                    name: bucket.name.clone(),
                    min_age: bucket.min_age,
                    max_age: bucket.max_age,
                });
            }
            if !seen.insert(bucket.file_name.as_str()) {
                return Err(ConfigError::DuplicateFileName(bucket.file_name.clone()));
            }
        }
        if let Some(combined) = &self.output.combined_file_name {
            if seen.contains(combined.as_str()) {
                return Err(ConfigError::DuplicateFileName(combined.clone()));
            }
        }

        url::Url::parse(&self.api.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: self.api.endpoint.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    pub fn filter_criteria(&self) -> FilterCriteria {
        FilterCriteria {
            target_city_id: self.crawl.target_city_id,
            region_city_min: self.crawl.region_city_min,
            region_city_max: self.crawl.region_city_max,
            inactivity_days: self.crawl.inactivity_days,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            concurrency: self.crawl.concurrency,
            max_batch_key_len: self.crawl.max_batch_key_len,
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("profile-census");

        Ok(config_dir)
    }

    /// Manager for the per-user default config file
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self::with_path(config_dir.join(defaults::CONFIG_FILE_NAME)))
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                info!("Configuration file format outdated, attempting migration...");
                let migrated = self.migrate_config_format(&content).await.with_context(|| {
                    format!("Configuration {:?} is invalid: {}", self.config_path, parse_error)
                })?;
                info!("✅ Successfully migrated configuration");
                Ok(migrated)
            }
        }
    }

    /// Fills sections an older file lacks, keeping everything it does have
    async fn migrate_config_format(&self, content: &str) -> Result<AppConfig> {
        let mut json_value: serde_json::Value =
            serde_json::from_str(content).context("Configuration file contains invalid JSON")?;

        let Some(root) = json_value.as_object_mut() else {
            anyhow::bail!("Configuration root must be a JSON object");
        };

        let defaults = serde_json::to_value(AppConfig::default())
            .context("Failed to serialize default configuration")?;
        if let Some(default_root) = defaults.as_object() {
            for (section, default_value) in default_root {
                match root.get_mut(section) {
                    None => {
                        root.insert(section.clone(), default_value.clone());
                        info!("Added missing '{}' configuration section", section);
                    }
                    Some(existing) => fill_missing_fields(existing, default_value, section),
                }
            }
        }

        let migrated_config: AppConfig =
            serde_json::from_value(json_value).context("Failed to parse migrated configuration")?;

        let backup_path = self.config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
            warn!("⚠️ Failed to back up configuration before migration: {}", e);
        }
        self.save_config(&migrated_config)
            .await
            .context("Failed to save migrated configuration")?;

        Ok(migrated_config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Copies keys present in `default` but absent in `existing`, one level deep
fn fill_missing_fields(existing: &mut serde_json::Value, default: &serde_json::Value, section: &str) {
    let (Some(existing), Some(default)) = (existing.as_object_mut(), default.as_object()) else {
        return;
    };
    for (key, value) in default {
        if !existing.contains_key(key) {
            existing.insert(key.clone(), value.clone());
            info!("Added missing '{}.{}' setting", section, key);
        }
    }
}

/// Default configuration values
pub mod defaults {
    /// File name inside the user config directory
    pub const CONFIG_FILE_NAME: &str = "census_config.json";

    // API defaults
    pub const API_ENDPOINT: &str = "https://api.vk.com/method/users.get";
    pub const API_IDS_PARAM: &str = "user_ids";
    pub const API_FIELDS: &str = "city,last_seen,bdate";
    pub const API_EXTRA_PARAMS: &[(&str, &str)] = &[("v", "5.131"), ("lang", "en")];

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    // Crawl defaults
    /// Highest identifier covered by pass 1
    pub const MAX_USER_ID: u64 = 600_000_000;

    /// Concurrent in-flight batches
    pub const CONCURRENCY: usize = 32;

    /// Upper bound (exclusive) on the joined identifier key
    pub const MAX_BATCH_KEY_LEN: usize = 4000;

    /// Retry passes after pass 1
    pub const MAX_RETRY_ATTEMPTS: u32 = 3;

    pub const TARGET_CITY_ID: i64 = 2;
    pub const REGION_CITY_MIN: i64 = 100;
    pub const REGION_CITY_MAX: i64 = 199;

    /// Inactivity offset in days
    pub const INACTIVITY_DAYS: i64 = 30;
    /// About a century
    pub const MAX_INACTIVITY_DAYS: i64 = 36_500;

    // Bucket defaults
    pub const CHILD_MIN_AGE: u32 = 7;
    pub const CHILD_MAX_AGE: u32 = 17;
    pub const ADULT_MIN_AGE: u32 = 18;
    pub const ADULT_MAX_AGE: u32 = 60;

    // Output defaults
    pub const OUTPUT_DIRECTORY: &str = "output";
    pub const COMBINED_FILE_NAME: &str = "all.csv";
    pub const FAILURE_FILE_PREFIX: &str = "failed";
    pub const STATUS_LOG_FILE_NAME: &str = "status.log";

    // Log configuration defaults
    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = true;

    /// Default maximum log files to keep
    pub const LOG_MAX_FILES: u32 = 5;

    /// Default auto cleanup logs setting
    pub const LOG_AUTO_CLEANUP: bool = true;
}
