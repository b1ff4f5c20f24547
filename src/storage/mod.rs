//! Storage module for persisting harvest data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Batch and per-item log persistence
//! - Extracted records and their source-ID mappings
//! - Read queries for statistics

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::crawler::Classification;
use crate::state::{BatchStatus, ItemState, ItemStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Represents a batch in the database
#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub id: Uuid,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub config_hash: String,
    pub status: BatchStatus,
    pub summary: Option<String>,
}

/// Represents one item's log row
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub id: i64,
    pub batch_id: Uuid,
    pub source_id: i64,
    pub slug: String,
    pub url: String,
    pub status: ItemStatus,
    pub attempts: u32,
    pub error_detail: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// New values for a log row
#[derive(Debug, Clone, PartialEq)]
pub struct LogUpdate {
    pub status: ItemStatus,
    pub attempts: u32,
    pub error_detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&ItemState> for LogUpdate {
    fn from(item: &ItemState) -> Self {
        Self {
            status: item.status,
            attempts: item.attempts,
            error_detail: item.error_detail.clone(),
            started_at: item.started_at,
            completed_at: item.completed_at,
        }
    }
}

/// Represents a persisted record joined with its source mapping
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: i64,
    pub source_id: i64,
    pub slug: String,
    pub name: String,
    pub classification: Classification,
    pub fragment_primary: Option<String>,
    pub fragment_secondary: Option<String>,
    pub url: String,
    pub duration_ms: u64,
    pub attempts: u32,
    pub scraped_at: String,
}
