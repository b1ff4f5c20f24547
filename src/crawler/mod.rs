//! Harvest pipeline: sitemap resolution, page extraction and batch orchestration
//!
//! This module contains the core harvesting logic, including:
//! - Transport abstraction and the reqwest-backed HTTP transport
//! - Sitemap parsing and windowed resolution of source references
//! - Record page parsing, classification and name derivation
//! - Page extraction with bounded linear-backoff retry
//! - The fail-fast batch orchestrator

mod coordinator;
mod extractor;
mod fetcher;
mod parser;
mod sitemap;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{BatchScope, BatchSummary, Orchestrator, RunOutcome, SharedStorage};
pub use extractor::{
    ExtractionOutcome, ExtractionResult, ExtractionSettings, PageExtractor, RetryPolicy,
};
pub use fetcher::{build_http_client, user_agent_string, FetchedPage, HttpTransport, Transport};
pub use parser::{
    classify, find_fragment, keyword_counts, parse_record_page, selector_tokens, slug_to_label,
    Classification, ParsedRecord,
};
pub use sitemap::{
    collect_references, parse_record_url, parse_sitemap, select_window, SitemapResolver,
    SourceReference,
};
