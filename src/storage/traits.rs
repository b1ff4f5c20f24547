//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::crawler::{Classification, ExtractionResult, SourceReference};
use crate::state::{BatchStatus, ItemStatus};
use crate::storage::{BatchRecord, LogRecord, LogUpdate, StoredRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(Uuid),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The orchestrator only writes through this trait. Implementations must be
/// `Send` so the orchestrator can run on a background task; the orchestrator
/// serializes access behind a mutex.
pub trait Storage {
    // ===== Batch Management =====

    /// Records the start of a batch
    fn create_batch(
        &mut self,
        batch_id: Uuid,
        config_hash: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Stores the terminal status and human-readable summary of a batch
    fn finish_batch(
        &mut self,
        batch_id: Uuid,
        status: BatchStatus,
        summary: &str,
    ) -> StorageResult<()>;

    /// Gets a batch by ID
    fn get_batch(&self, batch_id: Uuid) -> StorageResult<BatchRecord>;

    /// Gets the most recently started batch
    fn get_latest_batch(&self) -> StorageResult<Option<BatchRecord>>;

    // ===== Item Logs =====

    /// Registers an item as pending for a batch
    ///
    /// # Returns
    ///
    /// The ID of the new log row
    fn create_pending_log(
        &mut self,
        batch_id: Uuid,
        reference: &SourceReference,
    ) -> StorageResult<i64>;

    /// Updates status, attempts, error detail and timestamps of a log row
    fn update_log(&mut self, log_id: i64, update: &LogUpdate) -> StorageResult<()>;

    /// Gets all log rows of a batch in registration order
    fn get_logs(&self, batch_id: Uuid) -> StorageResult<Vec<LogRecord>>;

    /// Counts log rows of a batch by status
    fn count_logs_by_status(&self, batch_id: Uuid) -> StorageResult<HashMap<ItemStatus, u64>>;

    // ===== Records =====

    /// Checks whether a source ID has already been persisted by any batch
    fn record_exists(&self, source_id: i64) -> StorageResult<bool>;

    /// Stores a successful extraction
    ///
    /// # Returns
    ///
    /// The ID of the new record
    fn persist_record(&mut self, result: &ExtractionResult) -> StorageResult<i64>;

    /// Maps a source ID to a stored record
    ///
    /// Fails if the source ID is already mapped.
    fn persist_mapping(
        &mut self,
        record_id: i64,
        source_id: i64,
        slug: &str,
        url: &str,
    ) -> StorageResult<()>;

    /// Stores a successful extraction as one unit
    ///
    /// Writes the record, its source-ID mapping and the item's log row in a
    /// single transaction; on error none of them is kept.
    ///
    /// # Returns
    ///
    /// The ID of the new record
    fn persist_extraction(
        &mut self,
        result: &ExtractionResult,
        log_id: i64,
        update: &LogUpdate,
    ) -> StorageResult<i64>;

    /// Gets the record stored for a source ID
    fn get_record_by_source(&self, source_id: i64) -> StorageResult<Option<StoredRecord>>;

    // ===== Statistics =====

    /// Gets total record count
    fn count_records(&self) -> StorageResult<u64>;

    /// Counts records by classification
    fn count_records_by_classification(&self) -> StorageResult<HashMap<Classification, u64>>;
}
