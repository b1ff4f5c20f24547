//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::crawler::Classification;
use crate::state::ItemStatus;
use crate::storage::{BatchRecord, Storage};
use crate::HarvestError;
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Total number of stored records
    pub total_records: u64,

    /// Count of records by classification
    pub records_by_classification: HashMap<Classification, u64>,

    /// Most recently started batch, if any
    pub latest_batch: Option<BatchRecord>,

    /// Item log counts of the latest batch
    pub latest_batch_items: HashMap<ItemStatus, u64>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<HarvestStatistics, HarvestError> {
    let total_records = storage.count_records()?;
    let records_by_classification = storage.count_records_by_classification()?;

    let latest_batch = storage.get_latest_batch()?;
    let latest_batch_items = match &latest_batch {
        Some(batch) => storage.count_logs_by_status(batch.id)?,
        None => HashMap::new(),
    };

    Ok(HarvestStatistics {
        total_records,
        records_by_classification,
        latest_batch,
        latest_batch_items,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Records:");
    println!("  Total records: {}", stats.total_records);
    for classification in [Classification::TypeA, Classification::TypeB] {
        let count = stats
            .records_by_classification
            .get(&classification)
            .copied()
            .unwrap_or(0);
        let percentage = if stats.total_records > 0 {
            (count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", classification, count, percentage);
    }
    println!();

    let Some(batch) = &stats.latest_batch else {
        println!("No batches recorded yet.");
        return;
    };

    println!("Latest Batch:");
    println!("  ID: {}", batch.id);
    println!("  Status: {}", batch.status);
    println!("  Started: {}", batch.started_at);
    if let Some(completed_at) = &batch.completed_at {
        println!("  Finished: {}", completed_at);
    }
    if let Some(summary) = &batch.summary {
        println!("  Summary: {}", summary);
    }
    println!();

    println!("Items by Status:");
    for status in ItemStatus::all_states() {
        if let Some(count) = stats.latest_batch_items.get(&status) {
            println!("  {}: {}", status, count);
        }
    }
}
