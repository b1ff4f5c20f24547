//! Sitemap Harvester: a fail-fast listing ingester
//!
//! This crate discovers record pages from a listing site's sitemap, fetches
//! each page, extracts selector-addressed fragments, classifies the record and
//! persists it at most once per source identifier.

pub mod config;
pub mod crawler;
pub mod events;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Sitemap parse error: {message}")]
    SitemapParse { message: String },

    #[error("No content matched the configured selectors at {url}")]
    ContentNotFound { url: String },

    #[error("Extraction failed for {slug}: {detail}")]
    ExtractionFailed { slug: String, detail: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::ItemStatus,
        to: state::ItemStatus,
    },
}

/// Transport-level failures
///
/// Every variant is retryable inside the page extractor. The sitemap resolver
/// treats all of them as fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::{BatchConfig, Config};
pub use crawler::{Classification, ExtractionResult, Orchestrator, SourceReference};
pub use state::{BatchStatus, ItemStatus};
