//! HTML parsing for record pages
//!
//! This module handles everything the extractor does with a fetched body:
//! - Locating fragments by class-token selector
//! - Classifying the record by keyword frequency
//! - Deriving a display name from the title, first heading or URL slug

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

/// Record category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// "SME" listing
    TypeA,
    /// "Mainboard" listing
    TypeB,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TypeA => "SME",
            Self::TypeB => "Mainboard",
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::TypeA => "sme",
            Self::TypeB => "mainboard",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "sme" => Some(Self::TypeA),
            "mainboard" => Some(Self::TypeB),
            _ => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Extracted information from a record page
#[derive(Debug, Clone)]
pub struct ParsedRecord {
    pub fragment_primary: Option<String>,
    pub fragment_secondary: Option<String>,
    pub classification: Classification,
    pub name: String,
}

impl ParsedRecord {
    pub fn has_content(&self) -> bool {
        self.fragment_primary.is_some() || self.fragment_secondary.is_some()
    }
}

/// Parses a record page body
///
/// Fragments are looked up independently; classification and naming always
/// run, so the caller decides whether missing fragments are an error.
///
/// # Example
///
/// ```
/// use sitemap_harvester::crawler::{parse_record_page, Classification};
///
/// let html = r#"<html><head><title>Acme IPO | Listings</title></head>
///     <body><div class="card-body">SME issue</div></body></html>"#;
/// let parsed = parse_record_page(html, "table-responsive", "card-body", "acme-ltd");
/// assert_eq!(parsed.name, "Acme");
/// assert!(parsed.fragment_secondary.is_some());
/// assert_eq!(parsed.classification, Classification::TypeA);
/// ```
pub fn parse_record_page(
    html: &str,
    primary_selector: &str,
    secondary_selector: &str,
    slug: &str,
) -> ParsedRecord {
    let document = Html::parse_document(html);

    let fragment_primary = find_fragment(&document, primary_selector);
    let fragment_secondary = find_fragment(&document, secondary_selector);

    let mut corpus = String::from(html);
    for fragment in [&fragment_primary, &fragment_secondary].into_iter().flatten() {
        corpus.push(' ');
        corpus.push_str(fragment);
    }
    let classification = classify(&corpus);

    let name = extract_title_name(&document)
        .or_else(|| extract_heading(&document))
        .unwrap_or_else(|| slug_to_label(slug));

    ParsedRecord {
        fragment_primary,
        fragment_secondary,
        classification,
        name,
    }
}

/// Splits a class selector into its tokens
///
/// Tokens are whitespace-separated; a leading `.` is tolerated so both
/// `"card body"` and `".card .body"` name the same classes.
pub fn selector_tokens(selector: &str) -> Vec<String> {
    selector
        .split_whitespace()
        .map(|token| token.trim_start_matches('.'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Finds the outer HTML of the first element matching a class selector
///
/// First looks, in document order, for an element carrying every token. If
/// none exists, tries each token on its own in selector order and returns the
/// first element carrying it.
pub fn find_fragment(document: &Html, selector: &str) -> Option<String> {
    let tokens = selector_tokens(selector);
    if tokens.is_empty() {
        return None;
    }

    let elements: Vec<ElementRef> = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect();

    let carries_all = elements.iter().find(|element| {
        let classes: HashSet<&str> = element.value().classes().collect();
        tokens.iter().all(|token| classes.contains(token.as_str()))
    });
    if let Some(element) = carries_all {
        return Some(element.html());
    }

    tokens.iter().find_map(|token| {
        elements
            .iter()
            .find(|element| element.value().classes().any(|class| class == token.as_str()))
            .map(|element| element.html())
    })
}

fn sme_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bsme\b").expect("sme regex is valid"))
}

fn mainboard_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bmainboard\b").expect("mainboard regex is valid"))
}

/// Counts case-insensitive whole-word occurrences of "sme" and "mainboard"
pub fn keyword_counts(text: &str) -> (usize, usize) {
    (
        sme_pattern().find_iter(text).count(),
        mainboard_pattern().find_iter(text).count(),
    )
}

/// Classifies text by keyword frequency
///
/// `TypeA` only when "sme" occurs strictly more often than "mainboard" and at
/// least once. Ties, including zero/zero, are `TypeB`.
pub fn classify(text: &str) -> Classification {
    let (sme, mainboard) = keyword_counts(text);
    if sme > mainboard && sme > 0 {
        Classification::TypeA
    } else {
        Classification::TypeB
    }
}

/// Name from the `<title>`: first non-empty segment around "IPO", "|" or "-"
fn extract_title_name(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title: String = document.select(&selector).next()?.text().collect();

    title
        .split("IPO")
        .flat_map(|part| part.split('|'))
        .flat_map(|part| part.split('-'))
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Text of the first heading element, in document order
fn extract_heading(document: &Html) -> Option<String> {
    let selector = Selector::parse("h1, h2, h3, h4, h5, h6").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| {
            element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
}

const ACRONYM_REPLACEMENTS: &[(&str, &str)] = &[
    ("LTD", "Ltd"),
    ("LIMITED", "Limited"),
    ("PVT", "Pvt"),
    ("CO", "Co"),
    ("CORP", "Corp"),
    ("INC", "Inc"),
    ("LLP", "LLP"),
];

/// Converts a URL slug to a readable label
///
/// Hyphens become spaces and words are upper-cased, except for a fixed list
/// of company suffixes that keep their conventional spelling.
///
/// ```
/// use sitemap_harvester::crawler::slug_to_label;
///
/// assert_eq!(slug_to_label("acme-infra-ltd"), "ACME INFRA Ltd");
/// ```
pub fn slug_to_label(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let upper = word.to_uppercase();
            ACRONYM_REPLACEMENTS
                .iter()
                .find(|(from, _)| *from == upper)
                .map(|(_, to)| to.to_string())
                .unwrap_or(upper)
        })
        .collect::<Vec<_>>()
        .join(" ")
}
