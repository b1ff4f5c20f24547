use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub batch: BatchConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Batch behavior configuration
///
/// Read once at the start of every batch; later edits only affect the next run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Number of most-recent (highest-ID) records to process per batch
    #[serde(rename = "window-size")]
    pub window_size: usize,

    /// URL of the XML sitemap listing record pages
    #[serde(rename = "sitemap-url")]
    pub sitemap_url: String,

    /// Class-token selector for the primary fragment
    #[serde(rename = "primary-selector")]
    pub primary_selector: String,

    /// Class-token selector for the secondary fragment
    #[serde(rename = "secondary-selector")]
    pub secondary_selector: String,

    /// Retries after the first attempt (total attempts = max_retries + 1)
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Base delay between attempts (milliseconds), multiplied by the attempt index
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    /// Timeout for every individual fetch (milliseconds)
    #[serde(rename = "fetch-timeout-ms")]
    pub fetch_timeout_ms: u64,
}

impl BatchConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the harvester
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for operator contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
