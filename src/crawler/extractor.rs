//! Page extraction with bounded retry
//!
//! One call to [`PageExtractor::extract`] produces exactly one
//! [`ExtractionResult`]. Individual attempt failures (transport errors,
//! non-2xx responses, pages where neither selector matched) are absorbed by
//! the retry loop; only the final outcome is returned.

use crate::config::BatchConfig;
use crate::crawler::fetcher::Transport;
use crate::crawler::parser::{parse_record_page, slug_to_label, Classification, ParsedRecord};
use crate::crawler::sitemap::SourceReference;
use crate::HarvestError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Whether an extraction produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Success,
    Failure,
}

/// Output of one fetch-and-extract call, after retries
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub reference: SourceReference,
    pub name: String,
    pub fragment_primary: Option<String>,
    pub fragment_secondary: Option<String>,
    pub classification: Classification,
    /// Wall time across all attempts, including backoff sleeps
    pub duration_ms: u64,
    pub attempts: u32,
    pub outcome: ExtractionOutcome,
    /// Error of the last attempt when `outcome` is `Failure`
    pub error_detail: Option<String>,
}

impl ExtractionResult {
    fn success(
        reference: &SourceReference,
        parsed: ParsedRecord,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            reference: reference.clone(),
            name: parsed.name,
            fragment_primary: parsed.fragment_primary,
            fragment_secondary: parsed.fragment_secondary,
            classification: parsed.classification,
            duration_ms: elapsed.as_millis() as u64,
            attempts,
            outcome: ExtractionOutcome::Success,
            error_detail: None,
        }
    }

    fn failure(reference: &SourceReference, attempts: u32, error: String, elapsed: Duration) -> Self {
        Self {
            reference: reference.clone(),
            name: slug_to_label(&reference.slug),
            fragment_primary: None,
            fragment_secondary: None,
            classification: Classification::TypeB,
            duration_ms: elapsed.as_millis() as u64,
            attempts,
            outcome: ExtractionOutcome::Failure,
            error_detail: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExtractionOutcome::Success
    }
}

/// Linear backoff: the wait before attempt `k` is `base_delay * k`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before the given zero-based attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Everything the extractor needs besides the reference itself
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub primary_selector: String,
    pub secondary_selector: String,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
}

impl From<&BatchConfig> for ExtractionSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            primary_selector: config.primary_selector.clone(),
            secondary_selector: config.secondary_selector.clone(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.base_delay(),
            },
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// Fetches and extracts record pages
#[derive(Clone)]
pub struct PageExtractor {
    transport: Arc<dyn Transport>,
}

impl PageExtractor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Extracts one record, retrying up to `settings.retry.max_retries` times
    ///
    /// Never fails: exhaustion is reported through `outcome` and
    /// `error_detail`.
    pub async fn extract(
        &self,
        reference: &SourceReference,
        settings: &ExtractionSettings,
    ) -> ExtractionResult {
        let started = Instant::now();
        let mut last_error = String::new();
        let mut attempts = 0;

        for attempt in 0..settings.retry.total_attempts() {
            if attempt > 0 {
                let delay = settings.retry.delay_before(attempt);
                tracing::debug!(
                    "Retrying {} in {:?} (attempt {}/{})",
                    reference.slug,
                    delay,
                    attempt + 1,
                    settings.retry.total_attempts()
                );
                tokio::time::sleep(delay).await;
            }

            attempts += 1;
            match self.attempt(reference, settings).await {
                Ok(parsed) => {
                    tracing::debug!(
                        "Extracted {} as {} ({}) after {} attempt(s)",
                        reference.slug,
                        parsed.name,
                        parsed.classification,
                        attempts
                    );
                    return ExtractionResult::success(reference, parsed, attempts, started.elapsed());
                }
                Err(e) => {
                    tracing::warn!("Attempt {} for {} failed: {}", attempts, reference.slug, e);
                    last_error = e.to_string();
                }
            }
        }

        ExtractionResult::failure(reference, attempts, last_error, started.elapsed())
    }

    async fn attempt(
        &self,
        reference: &SourceReference,
        settings: &ExtractionSettings,
    ) -> Result<ParsedRecord, HarvestError> {
        let page = self
            .transport
            .fetch(&reference.url, settings.fetch_timeout)
            .await?;

        let parsed = parse_record_page(
            &page.body,
            &settings.primary_selector,
            &settings.secondary_selector,
            &reference.slug,
        );

        if !parsed.has_content() {
            return Err(HarvestError::ContentNotFound {
                url: reference.url.clone(),
            });
        }

        Ok(parsed)
    }
}
