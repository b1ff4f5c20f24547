//! Configuration providers consumed by the batch orchestrator
//!
//! A provider hands out an immutable [`ConfigSnapshot`]. The orchestrator asks
//! for one snapshot per batch, so edits made while a batch is running only
//! take effect on the next run.

use crate::config::parser::{hash_config_content, load_config_with_hash};
use crate::config::types::BatchConfig;
use crate::config::validation::validate_batch_config;
use crate::ConfigError;
use std::path::PathBuf;

/// Read-only batch configuration captured at run start
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub batch: BatchConfig,
    /// SHA-256 of the content the snapshot was built from
    pub hash: String,
}

/// Source of batch configuration snapshots
pub trait ConfigProvider: Send + Sync {
    fn batch_config(&self) -> Result<ConfigSnapshot, ConfigError>;
}

/// Re-reads and re-validates a TOML file on every request
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfigProvider {
    fn batch_config(&self) -> Result<ConfigSnapshot, ConfigError> {
        let (config, hash) = load_config_with_hash(&self.path)?;
        tracing::debug!("Loaded batch config from {} ({})", self.path.display(), hash);
        Ok(ConfigSnapshot {
            batch: config.batch,
            hash,
        })
    }
}

/// Always returns the same snapshot
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    snapshot: ConfigSnapshot,
}

impl StaticConfigProvider {
    /// Validates `batch` and fixes it as the provider's snapshot
    pub fn new(batch: BatchConfig) -> Result<Self, ConfigError> {
        validate_batch_config(&batch)?;
        let hash = hash_config_content(&toml::to_string(&batch)?);
        Ok(Self {
            snapshot: ConfigSnapshot { batch, hash },
        })
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn batch_config(&self) -> Result<ConfigSnapshot, ConfigError> {
        Ok(self.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn batch() -> BatchConfig {
        BatchConfig {
            window_size: 5,
            sitemap_url: "https://listings.example.com/sitemap.xml".to_string(),
            primary_selector: "table-responsive".to_string(),
            secondary_selector: "card-body".to_string(),
            max_retries: 2,
            base_delay_ms: 10,
            fetch_timeout_ms: 1000,
        }
    }

    fn write_config(file: &NamedTempFile, window_size: usize) {
        let content = format!(
            r#"
[batch]
window-size = {}
sitemap-url = "https://listings.example.com/sitemap.xml"
primary-selector = "table-responsive"
secondary-selector = "card-body"
max-retries = 2
base-delay-ms = 10
fetch-timeout-ms = 1000

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[output]
database-path = "./test.db"
"#,
            window_size
        );
        std::fs::write(file.path(), content).unwrap();
    }

    #[test]
    fn test_static_provider_returns_same_snapshot() {
        let provider = StaticConfigProvider::new(batch()).unwrap();
        let first = provider.batch_config().unwrap();
        let second = provider.batch_config().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.batch.window_size, 5);
        assert_eq!(first.hash.len(), 64);
    }

    #[test]
    fn test_static_provider_rejects_invalid_config() {
        let mut config = batch();
        config.window_size = 0;
        assert!(StaticConfigProvider::new(config).is_err());
    }

    #[test]
    fn test_file_provider_sees_updates_on_next_call() {
        let file = NamedTempFile::new().unwrap();
        write_config(&file, 5);
        let provider = FileConfigProvider::new(file.path());

        let before = provider.batch_config().unwrap();
        assert_eq!(before.batch.window_size, 5);

        write_config(&file, 7);
        let after = provider.batch_config().unwrap();
        assert_eq!(after.batch.window_size, 7);
        assert_ne!(before.hash, after.hash);
    }
}
