//! Sitemap resolution
//!
//! Fetches the listing site's XML sitemap and turns every `<url><loc>` whose
//! path looks like `.../view/<record>/<id>/<slug>` into a [`SourceReference`].
//! Locations with any other shape are not records and are dropped without a
//! log line.

use crate::crawler::fetcher::Transport;
use crate::HarvestError;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use url::Url;

/// One discoverable record, before it is scraped
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceReference {
    /// Site-assigned, monotonically increasing identifier
    pub source_id: i64,
    pub slug: String,
    pub url: String,
}

impl Ord for SourceReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.source_id
            .cmp(&other.source_id)
            .then_with(|| self.slug.cmp(&other.slug))
            .then_with(|| self.url.cmp(&other.url))
    }
}

impl PartialOrd for SourceReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn record_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:/[^/]+)*/view/[^/]+/(\d+)/([^/]+)/?$").expect("record path regex is valid")
    })
}

/// Parses a sitemap location into a source reference
///
/// Returns None unless the URL path ends in `/view/<record>/<id>/<slug>`
/// (an optional trailing slash is allowed) and `<id>` fits in an `i64`.
///
/// # Example
///
/// ```
/// use sitemap_harvester::crawler::parse_record_url;
///
/// let reference = parse_record_url("https://example.com/view/ipo/1842/acme-ltd/").unwrap();
/// assert_eq!(reference.source_id, 1842);
/// assert_eq!(reference.slug, "acme-ltd");
/// assert!(parse_record_url("https://example.com/about/").is_none());
/// ```
pub fn parse_record_url(location: &str) -> Option<SourceReference> {
    let location = location.trim();
    let url = Url::parse(location).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }

    let captures = record_path_pattern().captures(url.path())?;
    let source_id = captures.get(1)?.as_str().parse::<i64>().ok()?;
    let slug = captures.get(2)?.as_str().to_string();

    Some(SourceReference {
        source_id,
        slug,
        url: location.to_string(),
    })
}

/// Extracts every `<url><loc>` value from a sitemap document, in document order
///
/// The namespace prefix of element names is ignored. Malformed XML (mismatched
/// or unclosed tags, stray text outside the root, no root element at all) is a
/// [`HarvestError::SitemapParse`].
pub fn parse_sitemap(xml: &str) -> Result<Vec<String>, HarvestError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut saw_root = false;
    let mut current_loc: Option<String> = None;
    let mut locations = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = element.local_name().as_ref().to_vec();
                if open.is_empty() {
                    if saw_root {
                        return Err(parse_error("multiple root elements"));
                    }
                    saw_root = true;
                }
                if name == b"loc" && open.last().map(Vec::as_slice) == Some(b"url".as_slice()) {
                    current_loc = Some(String::new());
                }
                open.push(name);
            }
            Ok(Event::Empty(_)) => {
                if open.is_empty() {
                    if saw_root {
                        return Err(parse_error("multiple root elements"));
                    }
                    saw_root = true;
                }
            }
            Ok(Event::End(_)) => {
                let name = open
                    .pop()
                    .ok_or_else(|| parse_error("closing tag without matching opening tag"))?;
                if name == b"loc" {
                    if let Some(location) = current_loc.take() {
                        let location = location.trim();
                        if !location.is_empty() {
                            locations.push(location.to_string());
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if open.is_empty() {
                    return Err(parse_error("text outside the root element"));
                }
                if let Some(location) = current_loc.as_mut() {
                    let unescaped = text
                        .unescape()
                        .map_err(|e| parse_error(&e.to_string()))?;
                    location.push_str(&unescaped);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(location) = current_loc.as_mut() {
                    location.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(parse_error(&format!(
                    "{} (at byte {})",
                    e,
                    reader.buffer_position()
                )))
            }
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(parse_error(&format!(
            "unexpected end of document inside <{}>",
            String::from_utf8_lossy(unclosed)
        )));
    }
    if !saw_root {
        return Err(parse_error("document has no root element"));
    }

    Ok(locations)
}

fn parse_error(message: &str) -> HarvestError {
    HarvestError::SitemapParse {
        message: message.to_string(),
    }
}

/// Keeps the record-shaped locations, sorted ascending by source ID
///
/// Duplicate IDs are kept; the sort is stable so they stay in sitemap order.
pub fn collect_references(locations: &[String]) -> Vec<SourceReference> {
    let mut references: Vec<SourceReference> = locations
        .iter()
        .filter_map(|location| parse_record_url(location))
        .collect();
    references.sort_by_key(|reference| reference.source_id);
    references
}

/// Returns the last `window_size` references of an ascending sequence
pub fn select_window(mut references: Vec<SourceReference>, window_size: usize) -> Vec<SourceReference> {
    let start = references.len().saturating_sub(window_size);
    references.split_off(start)
}

/// Resolves a sitemap URL into the ordered set of records to process
///
/// Fetch and parse failures are returned as-is; there is no retry here.
#[derive(Clone)]
pub struct SitemapResolver {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl SitemapResolver {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Returns the `window_size` highest-ID records, ascending by ID
    ///
    /// If the sitemap holds fewer matching records, all of them are returned.
    /// An empty sitemap yields an empty vector.
    pub async fn resolve(
        &self,
        sitemap_url: &str,
        window_size: usize,
    ) -> Result<Vec<SourceReference>, HarvestError> {
        let references = self.resolve_all(sitemap_url).await?;
        Ok(select_window(references, window_size))
    }

    /// Returns every record with `min_id <= source_id <= max_id`, ascending
    pub async fn resolve_range(
        &self,
        sitemap_url: &str,
        min_id: i64,
        max_id: i64,
    ) -> Result<Vec<SourceReference>, HarvestError> {
        let references = self.resolve(sitemap_url, usize::MAX).await?;
        Ok(references
            .into_iter()
            .filter(|reference| (min_id..=max_id).contains(&reference.source_id))
            .collect())
    }

    async fn resolve_all(&self, sitemap_url: &str) -> Result<Vec<SourceReference>, HarvestError> {
        tracing::debug!("Fetching sitemap: {}", sitemap_url);
        let page = self.transport.fetch(sitemap_url, self.timeout).await?;
        let locations = parse_sitemap(&page.body)?;
        let references = collect_references(&locations);
        tracing::info!(
            "Sitemap {} listed {} locations, {} records",
            sitemap_url,
            locations.len(),
            references.len()
        );
        Ok(references)
    }
}
