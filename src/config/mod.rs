//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and provides the per-batch configuration snapshots the orchestrator
//! consumes.
//!
//! # Example
//!
//! ```no_run
//! use sitemap_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Sitemap: {}", config.batch.sitemap_url);
//! ```

mod parser;
mod provider;
mod types;
mod validation;

pub use types::{BatchConfig, Config, OutputConfig, UserAgentConfig};

pub use parser::{
    compute_config_hash, hash_config_content, load_config, load_config_with_hash, parse_config,
};
pub use provider::{ConfigProvider, ConfigSnapshot, FileConfigProvider, StaticConfigProvider};
pub use validation::validate_batch_config;
