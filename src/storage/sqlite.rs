//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::crawler::{Classification, ExtractionResult, SourceReference};
use crate::state::{BatchStatus, ItemStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{BatchRecord, LogRecord, LogUpdate, StoredRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

const BATCH_COLUMNS: &str = "id, started_at, completed_at, config_hash, status, summary";

const LOG_COLUMNS: &str = "id, batch_id, source_id, slug, url, status, attempts, error_detail,
     created_at, started_at, completed_at";

fn parse_uuid(value: String, column: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<BatchRecord> {
    Ok(BatchRecord {
        id: parse_uuid(row.get(0)?, 0)?,
        started_at: row.get(1)?,
        completed_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: BatchStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(BatchStatus::Failed),
        summary: row.get(5)?,
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<LogRecord> {
    Ok(LogRecord {
        id: row.get(0)?,
        batch_id: parse_uuid(row.get(1)?, 1)?,
        source_id: row.get(2)?,
        slug: row.get(3)?,
        url: row.get(4)?,
        status: ItemStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(ItemStatus::Failed),
        attempts: row.get(6)?,
        error_detail: row.get(7)?,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn to_rfc3339(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|v| v.to_rfc3339())
}

fn write_log(conn: &Connection, log_id: i64, update: &LogUpdate) -> StorageResult<()> {
    let updated = conn.execute(
        "UPDATE batch_logs SET status = ?1, attempts = ?2, error_detail = ?3,
         started_at = ?4, completed_at = ?5 WHERE id = ?6",
        params![
            update.status.to_db_string(),
            update.attempts,
            update.error_detail,
            to_rfc3339(update.started_at),
            to_rfc3339(update.completed_at),
            log_id
        ],
    )?;
    if updated == 0 {
        return Err(StorageError::Database(format!("Log row {} not found", log_id)));
    }
    Ok(())
}

fn insert_record(conn: &Connection, result: &ExtractionResult) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO records (name, classification, fragment_primary, fragment_secondary,
         source_url, duration_ms, attempts, scraped_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            result.name,
            result.classification.to_db_string(),
            result.fragment_primary,
            result.fragment_secondary,
            result.reference.url,
            result.duration_ms as i64,
            result.attempts,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_mapping(
    conn: &Connection,
    record_id: i64,
    source_id: i64,
    slug: &str,
    url: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO source_mappings (source_id, record_id, slug, url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![source_id, record_id, slug, url, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Batch Management =====

    fn create_batch(
        &mut self,
        batch_id: Uuid,
        config_hash: &str,
        started_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO batches (id, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                batch_id.to_string(),
                started_at.to_rfc3339(),
                config_hash,
                BatchStatus::Running.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn finish_batch(
        &mut self,
        batch_id: Uuid,
        status: BatchStatus,
        summary: &str,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE batches SET status = ?1, summary = ?2, completed_at = ?3 WHERE id = ?4",
            params![status.to_db_string(), summary, now, batch_id.to_string()],
        )?;
        if updated == 0 {
            return Err(StorageError::BatchNotFound(batch_id));
        }
        Ok(())
    }

    fn get_batch(&self, batch_id: Uuid) -> StorageResult<BatchRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM batches WHERE id = ?1", BATCH_COLUMNS),
                params![batch_id.to_string()],
                batch_from_row,
            )
            .optional()?
            .ok_or(StorageError::BatchNotFound(batch_id))
    }

    fn get_latest_batch(&self) -> StorageResult<Option<BatchRecord>> {
        let batch = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM batches ORDER BY started_at DESC, rowid DESC LIMIT 1",
                    BATCH_COLUMNS
                ),
                [],
                batch_from_row,
            )
            .optional()?;
        Ok(batch)
    }

    // ===== Item Logs =====

    fn create_pending_log(
        &mut self,
        batch_id: Uuid,
        reference: &SourceReference,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO batch_logs (batch_id, source_id, slug, url, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                batch_id.to_string(),
                reference.source_id,
                reference.slug,
                reference.url,
                ItemStatus::Pending.to_db_string(),
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_log(&mut self, log_id: i64, update: &LogUpdate) -> StorageResult<()> {
        write_log(&self.conn, log_id, update)
    }

    fn get_logs(&self, batch_id: Uuid) -> StorageResult<Vec<LogRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM batch_logs WHERE batch_id = ?1 ORDER BY id ASC",
            LOG_COLUMNS
        ))?;

        let logs = stmt
            .query_map(params![batch_id.to_string()], log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    fn count_logs_by_status(&self, batch_id: Uuid) -> StorageResult<HashMap<ItemStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM batch_logs WHERE batch_id = ?1 GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map(params![batch_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            if let Some(status) = ItemStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    // ===== Records =====

    fn record_exists(&self, source_id: i64) -> StorageResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM source_mappings WHERE source_id = ?1)",
            params![source_id],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    fn persist_record(&mut self, result: &ExtractionResult) -> StorageResult<i64> {
        Ok(insert_record(&self.conn, result)?)
    }

    fn persist_mapping(
        &mut self,
        record_id: i64,
        source_id: i64,
        slug: &str,
        url: &str,
    ) -> StorageResult<()> {
        Ok(insert_mapping(&self.conn, record_id, source_id, slug, url)?)
    }

    fn persist_extraction(
        &mut self,
        result: &ExtractionResult,
        log_id: i64,
        update: &LogUpdate,
    ) -> StorageResult<i64> {
        let reference = &result.reference;
        let tx = self.conn.transaction()?;
        let record_id = insert_record(&tx, result)?;
        insert_mapping(
            &tx,
            record_id,
            reference.source_id,
            &reference.slug,
            &reference.url,
        )?;
        write_log(&tx, log_id, update)?;
        tx.commit()?;
        Ok(record_id)
    }

    fn get_record_by_source(&self, source_id: i64) -> StorageResult<Option<StoredRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT r.id, m.source_id, m.slug, r.name, r.classification, r.fragment_primary,
                 r.fragment_secondary, r.source_url, r.duration_ms, r.attempts, r.scraped_at
                 FROM source_mappings m JOIN records r ON r.id = m.record_id
                 WHERE m.source_id = ?1",
                params![source_id],
                |row| {
                    Ok(StoredRecord {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        slug: row.get(2)?,
                        name: row.get(3)?,
                        classification: Classification::from_db_string(
                            &row.get::<_, String>(4)?,
                        )
                        .unwrap_or(Classification::TypeB),
                        fragment_primary: row.get(5)?,
                        fragment_secondary: row.get(6)?,
                        url: row.get(7)?,
                        duration_ms: row.get::<_, i64>(8)? as u64,
                        attempts: row.get(9)?,
                        scraped_at: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    // ===== Statistics =====

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_records_by_classification(&self) -> StorageResult<HashMap<Classification, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT classification, COUNT(*) FROM records GROUP BY classification")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (classification, count) = row?;
            if let Some(classification) = Classification::from_db_string(&classification) {
                counts.insert(classification, count as u64);
            }
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::ExtractionOutcome;

    fn reference(source_id: i64) -> SourceReference {
        SourceReference {
            source_id,
            slug: format!("record-{}", source_id),
            url: format!("https://listings.example.com/view/ipo/{}/record-{}/", source_id, source_id),
        }
    }

    fn extraction(source_id: i64, classification: Classification) -> ExtractionResult {
        ExtractionResult {
            reference: reference(source_id),
            name: format!("Record {}", source_id),
            fragment_primary: Some("<table>t</table>".to_string()),
            fragment_secondary: None,
            classification,
            duration_ms: 120,
            attempts: 1,
            outcome: ExtractionOutcome::Success,
            error_detail: None,
        }
    }

    fn completed() -> LogUpdate {
        LogUpdate {
            status: ItemStatus::Completed,
            attempts: 2,
            error_detail: None,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStorage::new_in_memory().is_ok());
    }

    #[test]
    fn test_batch_lifecycle() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let batch_id = Uuid::new_v4();

        storage.create_batch(batch_id, "hash", Utc::now()).unwrap();
        let batch = storage.get_batch(batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Running);
        assert!(batch.completed_at.is_none());

        storage
            .finish_batch(batch_id, BatchStatus::Completed, "Batch completed")
            .unwrap();
        let batch = storage.get_batch(batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.summary.as_deref(), Some("Batch completed"));
        assert!(batch.completed_at.is_some());

        let latest = storage.get_latest_batch().unwrap().unwrap();
        assert_eq!(latest.id, batch_id);
    }

    #[test]
    fn test_finish_unknown_batch() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.finish_batch(Uuid::new_v4(), BatchStatus::Failed, "x");
        assert!(matches!(result, Err(StorageError::BatchNotFound(_))));
    }

    #[test]
    fn test_get_latest_batch_empty() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_latest_batch().unwrap().is_none());
    }

    #[test]
    fn test_pending_log_then_update() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let batch_id = Uuid::new_v4();
        storage.create_batch(batch_id, "hash", Utc::now()).unwrap();

        let first = storage.create_pending_log(batch_id, &reference(1)).unwrap();
        let second = storage.create_pending_log(batch_id, &reference(2)).unwrap();

        storage
            .update_log(
                first,
                &LogUpdate {
                    status: ItemStatus::Failed,
                    attempts: 4,
                    error_detail: Some("HTTP 500".to_string()),
                    started_at: Some(Utc::now()),
                    completed_at: Some(Utc::now()),
                },
            )
            .unwrap();

        let logs = storage.get_logs(batch_id).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, first);
        assert_eq!(logs[0].status, ItemStatus::Failed);
        assert_eq!(logs[0].attempts, 4);
        assert_eq!(logs[0].error_detail.as_deref(), Some("HTTP 500"));
        assert_eq!(logs[1].id, second);
        assert_eq!(logs[1].status, ItemStatus::Pending);
        assert!(logs[1].started_at.is_none());

        let counts = storage.count_logs_by_status(batch_id).unwrap();
        assert_eq!(counts.get(&ItemStatus::Failed), Some(&1));
        assert_eq!(counts.get(&ItemStatus::Pending), Some(&1));
    }

    #[test]
    fn test_update_unknown_log() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let update = LogUpdate {
            status: ItemStatus::Completed,
            attempts: 1,
            error_detail: None,
            started_at: None,
            completed_at: None,
        };
        assert!(storage.update_log(999, &update).is_err());
    }

    #[test]
    fn test_persist_record_and_mapping() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(!storage.record_exists(10).unwrap());

        let result = extraction(10, Classification::TypeA);
        let record_id = storage.persist_record(&result).unwrap();
        storage
            .persist_mapping(record_id, 10, "record-10", &result.reference.url)
            .unwrap();

        assert!(storage.record_exists(10).unwrap());
        let stored = storage.get_record_by_source(10).unwrap().unwrap();
        assert_eq!(stored.id, record_id);
        assert_eq!(stored.name, "Record 10");
        assert_eq!(stored.classification, Classification::TypeA);
        assert_eq!(stored.duration_ms, 120);
        assert!(storage.get_record_by_source(11).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_mapping_rejected() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = extraction(10, Classification::TypeB);

        let first = storage.persist_record(&result).unwrap();
        storage.persist_mapping(first, 10, "record-10", "u").unwrap();

        let second = storage.persist_record(&result).unwrap();
        assert!(storage.persist_mapping(second, 10, "record-10", "u").is_err());
    }

    #[test]
    fn test_persist_extraction_writes_record_mapping_and_log() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let batch_id = Uuid::new_v4();
        storage.create_batch(batch_id, "hash", Utc::now()).unwrap();
        let log_id = storage.create_pending_log(batch_id, &reference(4)).unwrap();

        let record_id = storage
            .persist_extraction(&extraction(4, Classification::TypeB), log_id, &completed())
            .unwrap();

        let stored = storage.get_record_by_source(4).unwrap().unwrap();
        assert_eq!(stored.id, record_id);
        let logs = storage.get_logs(batch_id).unwrap();
        assert_eq!(logs[0].status, ItemStatus::Completed);
        assert_eq!(logs[0].attempts, 2);
    }

    #[test]
    fn test_persist_extraction_rolls_back_on_duplicate_mapping() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let batch_id = Uuid::new_v4();
        storage.create_batch(batch_id, "hash", Utc::now()).unwrap();
        let log_id = storage.create_pending_log(batch_id, &reference(4)).unwrap();
        let first = storage
            .persist_record(&extraction(4, Classification::TypeA))
            .unwrap();
        storage.persist_mapping(first, 4, "record-4", "u").unwrap();

        let result =
            storage.persist_extraction(&extraction(4, Classification::TypeB), log_id, &completed());

        assert!(result.is_err());
        assert_eq!(storage.count_records().unwrap(), 1);
        assert_eq!(storage.get_record_by_source(4).unwrap().unwrap().id, first);
        assert_eq!(storage.get_logs(batch_id).unwrap()[0].status, ItemStatus::Pending);
    }

    #[test]
    fn test_persist_extraction_rolls_back_on_missing_log() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        let result =
            storage.persist_extraction(&extraction(6, Classification::TypeA), 404, &completed());

        assert!(result.is_err());
        assert_eq!(storage.count_records().unwrap(), 0);
        assert!(!storage.record_exists(6).unwrap());
    }

    #[test]
    fn test_count_records_by_classification() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.persist_record(&extraction(1, Classification::TypeA)).unwrap();
        storage.persist_record(&extraction(2, Classification::TypeB)).unwrap();
        storage.persist_record(&extraction(3, Classification::TypeB)).unwrap();

        assert_eq!(storage.count_records().unwrap(), 3);
        let counts = storage.count_records_by_classification().unwrap();
        assert_eq!(counts.get(&Classification::TypeA), Some(&1));
        assert_eq!(counts.get(&Classification::TypeB), Some(&2));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            let record_id = storage
                .persist_record(&extraction(5, Classification::TypeA))
                .unwrap();
            storage.persist_mapping(record_id, 5, "record-5", "u").unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert!(storage.record_exists(5).unwrap());
    }
}
