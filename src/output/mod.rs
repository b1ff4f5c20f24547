//! Output module for reporting harvest results
//!
//! This module handles:
//! - Printing statistics from the harvest database
//! - Printing batch summaries and dry-run item lists

pub mod stats;

pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use crate::crawler::{BatchSummary, SourceReference};
use crate::state::ItemStatus;

/// Prints the items a batch would process
pub fn print_items(references: &[SourceReference]) {
    println!("{} items would be processed:", references.len());
    for reference in references {
        println!("  #{} {} {}", reference.source_id, reference.slug, reference.url);
    }
}

/// Prints a finished batch, including every item that did not complete
pub fn print_batch_summary(summary: &BatchSummary) {
    println!("{}", summary.message);
    if let Some(batch_id) = summary.batch_id {
        println!("Batch ID: {}", batch_id);
    }

    for item in &summary.run.items {
        match item.status {
            ItemStatus::Completed => {}
            ItemStatus::Failed => println!(
                "  {} {} (#{}): {}",
                item.status,
                item.reference.slug,
                item.reference.source_id,
                item.error_detail.as_deref().unwrap_or("")
            ),
            _ => println!(
                "  {} {} (#{})",
                item.status, item.reference.slug, item.reference.source_id
            ),
        }
    }
}
