//! Infrastructure layer: configuration, logging, HTTP and output sinks
//!
//! Everything the crawling core treats as an external collaborator lives
//! here.

pub mod config; // Typed configuration and its manager
pub mod http_client; // reqwest-backed ProfileApi
pub mod logging; // Diagnostic logging
pub mod outputs; // Opens every sink of one run
pub mod sinks; // Lock-guarded output streams

pub use config::{AppConfig, ConfigError, ConfigManager};
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use outputs::OutputSet;
pub use sinks::{FailureSink, LineSink, SinkError, StatusLog, read_failure_list};
